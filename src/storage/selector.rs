//! Selector evaluation for the in-memory engine.
//!
//! Supports the subset of the Mango selector language the ledger core emits plus
//! the common comparison operators:
//! implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`,
//! `$exists`, and the combinators `$and`, `$or`, `$nor`. Nested objects without
//! operators select sub-fields; dotted field names do the same.
//!
//! Selectors are compiled once into a [`Condition`] tree so that matching cannot
//! fail halfway through a scan.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Nor(Vec<Condition>),
    Field { path: Vec<String>, test: FieldTest },
}

#[derive(Debug, Clone, PartialEq)]
enum FieldTest {
    Eq(Value),
    Ne(Value),
    Cmp(Ordering, bool, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

/// A compiled selector query: criteria plus optional `fields` projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSelector {
    condition: Condition,
    fields: Option<Vec<String>>,
}

impl ParsedSelector {
    pub fn parse(text: &str) -> StoreResult<Self> {
        let malformed = |reason: String| StoreError::MalformedSelector { selector: text.to_string(), reason };
        let root: Value = serde_json::from_str(text).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
        let Value::Object(root) = root else {
            return Err(malformed("query must be a JSON object".into()));
        };
        let Some(Value::Object(criteria)) = root.get("selector") else {
            return Err(malformed("missing \"selector\" object".into()));
        };
        let condition = compile_object(criteria, &[]).map_err(malformed)?;
        let fields = match root.get("fields") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => out.push(s.to_string()),
                        None => return Err(malformed("\"fields\" entries must be strings".into())),
                    }
                }
                Some(out)
            }
            Some(_) => return Err(malformed("\"fields\" must be an array".into())),
        };
        Ok(Self { condition, fields })
    }

    pub fn matches(&self, doc: &Value) -> bool { eval(&self.condition, doc) }

    /// Apply the `fields` projection. Documents pass through untouched without one.
    pub fn project(&self, doc: Value) -> Value {
        let Some(fields) = &self.fields else { return doc };
        let Value::Object(map) = doc else { return doc };
        let mut out = Map::new();
        for f in fields {
            if let Some(v) = map.get(f) { out.insert(f.clone(), v.clone()); }
        }
        Value::Object(out)
    }

    pub fn has_projection(&self) -> bool { self.fields.is_some() }
}

fn compile_object(criteria: &Map<String, Value>, prefix: &[String]) -> Result<Condition, String> {
    let mut parts = Vec::with_capacity(criteria.len());
    for (name, value) in criteria {
        match name.as_str() {
            "$and" => parts.push(Condition::And(compile_list(name, value, prefix)?)),
            "$or" => parts.push(Condition::Or(compile_list(name, value, prefix)?)),
            "$nor" => parts.push(Condition::Nor(compile_list(name, value, prefix)?)),
            op if op.starts_with('$') => {
                if prefix.is_empty() {
                    return Err(format!("operator {op} is not valid at the top level"));
                }
                parts.push(Condition::Field { path: prefix.to_vec(), test: compile_operator(op, value)? });
            }
            field => {
                let mut path = prefix.to_vec();
                path.extend(field.split('.').map(str::to_string));
                parts.push(compile_field(path, value)?);
            }
        }
    }
    Ok(if parts.len() == 1 { parts.remove(0) } else { Condition::And(parts) })
}

fn compile_list(op: &str, value: &Value, prefix: &[String]) -> Result<Vec<Condition>, String> {
    let Value::Array(items) = value else { return Err(format!("{op} expects an array")) };
    items
        .iter()
        .map(|item| match item {
            Value::Object(m) => compile_object(m, prefix),
            _ => Err(format!("{op} entries must be objects")),
        })
        .collect()
}

fn compile_field(path: Vec<String>, value: &Value) -> Result<Condition, String> {
    match value {
        Value::Object(m) if !m.is_empty() => {
            let ops = m.keys().filter(|k| k.starts_with('$')).count();
            if ops == 0 {
                // sub-field selector
                compile_object(m, &path)
            } else if ops == m.len() {
                let mut tests = Vec::with_capacity(m.len());
                for (op, arg) in m {
                    tests.push(Condition::Field { path: path.clone(), test: compile_operator(op, arg)? });
                }
                Ok(if tests.len() == 1 { tests.remove(0) } else { Condition::And(tests) })
            } else {
                Err(format!("field '{}' mixes operators and sub-fields", path.join(".")))
            }
        }
        other => Ok(Condition::Field { path, test: FieldTest::Eq(other.clone()) }),
    }
}

fn compile_operator(op: &str, arg: &Value) -> Result<FieldTest, String> {
    let list = |arg: &Value| match arg {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(format!("{op} expects an array")),
    };
    Ok(match op {
        "$eq" => FieldTest::Eq(arg.clone()),
        "$ne" => FieldTest::Ne(arg.clone()),
        "$gt" => FieldTest::Cmp(Ordering::Greater, false, arg.clone()),
        "$gte" => FieldTest::Cmp(Ordering::Greater, true, arg.clone()),
        "$lt" => FieldTest::Cmp(Ordering::Less, false, arg.clone()),
        "$lte" => FieldTest::Cmp(Ordering::Less, true, arg.clone()),
        "$in" => FieldTest::In(list(arg)?),
        "$nin" => FieldTest::Nin(list(arg)?),
        "$exists" => match arg {
            Value::Bool(b) => FieldTest::Exists(*b),
            _ => return Err("$exists expects a boolean".into()),
        },
        other => return Err(format!("unsupported operator {other}")),
    })
}

fn lookup<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut cur = doc;
    for seg in path {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

fn eval(cond: &Condition, doc: &Value) -> bool {
    match cond {
        Condition::And(parts) => parts.iter().all(|c| eval(c, doc)),
        Condition::Or(parts) => parts.iter().any(|c| eval(c, doc)),
        Condition::Nor(parts) => !parts.iter().any(|c| eval(c, doc)),
        Condition::Field { path, test } => {
            let v = lookup(doc, path);
            match test {
                FieldTest::Eq(want) => v.is_some_and(|v| values_equal(v, want)),
                FieldTest::Ne(want) => !v.is_some_and(|v| values_equal(v, want)),
                FieldTest::Cmp(ord, or_equal, want) => v
                    .and_then(|v| compare(v, want))
                    .is_some_and(|o| o == *ord || (*or_equal && o == Ordering::Equal)),
                FieldTest::In(set) => v.is_some_and(|v| set.iter().any(|w| values_equal(v, w))),
                FieldTest::Nin(set) => !v.is_some_and(|v| set.iter().any(|w| values_equal(v, w))),
                FieldTest::Exists(want) => v.is_some() == *want,
            }
        }
    }
}

// Numbers compare by value so that 1 and 1.0 are equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
