//! Selector builder.
//!
//! Selectors are assembled as a typed JSON value and serialized once, so field
//! values are always escaped by serde_json and never spliced into query text.
//! Field order is preserved (`serde_json` with `preserve_order`).

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    criteria: Map<String, Value>,
    fields: Option<Vec<String>>,
}

impl Selector {
    pub fn new() -> Self { Self::default() }

    /// Shorthand for `Selector::new().eq("doctype", doctype)`.
    pub fn for_doctype(doctype: &str) -> Self { Self::new().eq("doctype", doctype) }

    /// Add an equality criterion. Repeating a field replaces its value in place.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.insert(field.into(), value.into());
        self
    }

    /// Build a conjunctive selector from `"field,value"` pairs, in order.
    ///
    /// Everything after the first comma is the value, so values may contain commas.
    pub fn from_pairs<I, S>(pairs: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sel = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let Some((field, value)) = pair.split_once(',') else {
                return Err(AppError::invalid(format!("expected 'field,value' pair, got '{pair}'")));
            };
            let field = field.trim();
            if field.is_empty() {
                return Err(AppError::invalid(format!("empty field name in pair '{pair}'")));
            }
            sel = sel.eq(field, value);
        }
        Ok(sel)
    }

    /// Match documents whose `field` equals any of `values`: `{"$or":[{field:v1},{field:v2},...]}`.
    pub fn any_of<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let alternatives = values
            .into_iter()
            .map(|v| {
                let mut m = Map::new();
                m.insert(field.to_string(), v.into());
                Value::Object(m)
            })
            .collect();
        self.criteria.insert("$or".to_string(), Value::Array(alternatives));
        self
    }

    /// Restrict returned documents to the listed fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool { self.criteria.is_empty() }

    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert("selector".to_string(), Value::Object(self.criteria.clone()));
        if let Some(fields) = &self.fields {
            root.insert("fields".to_string(), Value::Array(fields.iter().cloned().map(Value::String).collect()));
        }
        Value::Object(root)
    }

    /// Wire form consumed by `StateStore::get_query_result`.
    pub fn to_json_string(&self) -> String { self.to_value().to_string() }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_value()) }
}
