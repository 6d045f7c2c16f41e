//!
//! skillbill document repository
//! -----------------------------
//! Typed CRUD and filtering over a [`StateStore`], parameterized by the entity's
//! `doctype`. The repository holds no state of its own: every operation receives
//! the store handle, so one `Repository<T>` value can serve any invocation.
//!
//! Scans close their result sequence on every path. Sequences are dropped before
//! returning, including on `?` propagation and early exit from [`Repository::for_each`].

use std::marker::PhantomData;
use std::ops::ControlFlow;

use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::Document;
use crate::query::Selector;
use crate::storage::{KeyValue, ResultsIterator, StateStore};

pub struct Repository<T: Document> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Default for Repository<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Document> Clone for Repository<T> {
    fn clone(&self) -> Self { Self::new() }
}

impl<T: Document> Copy for Repository<T> {}

impl<T: Document> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("doctype", &T::DOCTYPE).finish()
    }
}

impl<T: Document> Repository<T> {
    pub const fn new() -> Self { Self { _marker: PhantomData } }

    pub fn doctype(&self) -> &'static str { T::DOCTYPE }

    /// Every document of this repository's doctype, in backend order.
    pub fn get_all(&self, store: &dyn StateStore) -> AppResult<Vec<T>> {
        let selector = Selector::for_doctype(T::DOCTYPE).to_json_string();
        debug!(target: "skillbill::repository", doctype = T::DOCTYPE, %selector, "get_all");
        let results = store
            .get_query_result(&selector)
            .map_err(|e| AppError::storage("get_all", format!("{e}; selector: {selector}")))?;
        let mut out = Vec::new();
        for item in results {
            let kv = item.map_err(|e| AppError::storage("get_all", format!("{e}; selector: {selector}")))?;
            out.push(decode::<T>(&kv.key, &kv.value)?);
        }
        Ok(out)
    }

    /// Run a caller-supplied selector and decode each match.
    pub fn get_by_query(&self, store: &dyn StateStore, selector: &str) -> AppResult<Vec<T>> {
        self.query_records(store, selector)?
            .into_iter()
            .map(|(key, doc)| serde_json::from_value(doc).map_err(|e| AppError::decode(key, e)))
            .collect()
    }

    /// Raw `(key, document)` pairs for a selector; used for projections that do not
    /// decode into `T`.
    pub fn query_records(&self, store: &dyn StateStore, selector: &str) -> AppResult<Vec<(String, Value)>> {
        debug!(target: "skillbill::repository", doctype = T::DOCTYPE, selector, "query");
        let results = store.get_query_result(selector).map_err(|e| AppError::query(selector, e))?;
        let mut out = Vec::new();
        for item in results {
            let kv = item.map_err(|e| AppError::query(selector, e))?;
            let doc: Value = serde_json::from_slice(&kv.value).map_err(|e| AppError::decode(&kv.key, e))?;
            out.push((kv.key, doc));
        }
        Ok(out)
    }

    pub fn get_by_key(&self, store: &dyn StateStore, key: &str) -> AppResult<T> {
        self.load(store, key).map(|(doc, _)| doc)
    }

    /// Upsert; the last write wins.
    pub fn save(&self, store: &dyn StateStore, key: &str, doc: &T) -> AppResult<()> {
        if key.is_empty() {
            return Err(AppError::invalid("key must not be empty"));
        }
        if doc.doctype() != T::DOCTYPE {
            return Err(AppError::invalid(format!(
                "document doctype '{}' does not match repository doctype '{}'",
                doc.doctype(),
                T::DOCTYPE
            )));
        }
        if doc.key() != key {
            return Err(AppError::invalid(format!("document key '{}' does not match '{key}'", doc.key())));
        }
        let bytes = encode(doc)?;
        debug!(target: "skillbill::repository", doctype = T::DOCTYPE, key, "save");
        store.put_state(key, &bytes).map_err(|e| AppError::storage("put_state", e))
    }

    /// Remove an existing document. A missing key is an error, never a silent no-op.
    /// Remove the document at `key`. Only the stored doctype is checked, so a
    /// record whose fields no longer decode can still be removed.
    pub fn delete(&self, store: &dyn StateStore, key: &str) -> AppResult<()> {
        self.load_raw(store, key)?;
        debug!(target: "skillbill::repository", doctype = T::DOCTYPE, key, "delete");
        store.del_state(key).map_err(|e| AppError::storage("del_state", e))
    }

    pub fn first_or_default<P>(&self, store: &dyn StateStore, predicate: P) -> AppResult<Option<T>>
    where
        P: Fn(&T) -> bool,
    {
        Ok(self.get_all(store)?.into_iter().find(|d| predicate(d)))
    }

    pub fn any<P>(&self, store: &dyn StateStore, predicate: P) -> AppResult<bool>
    where
        P: Fn(&T) -> bool,
    {
        Ok(self.get_all(store)?.iter().any(predicate))
    }

    pub fn count<P>(&self, store: &dyn StateStore, predicate: P) -> AppResult<usize>
    where
        P: Fn(&T) -> bool,
    {
        Ok(self.get_all(store)?.iter().filter(|d| predicate(d)).count())
    }

    /// Decode documents one at a time and hand them to `visitor` until it breaks.
    /// Returns how many documents were visited.
    pub fn for_each<F>(&self, store: &dyn StateStore, mut visitor: F) -> AppResult<usize>
    where
        F: FnMut(T) -> ControlFlow<()>,
    {
        let selector = Selector::for_doctype(T::DOCTYPE).to_json_string();
        let results = store
            .get_query_result(&selector)
            .map_err(|e| AppError::storage("for_each", format!("{e}; selector: {selector}")))?;
        let mut visited = 0usize;
        for item in results {
            let kv = item.map_err(|e| AppError::storage("for_each", e))?;
            visited += 1;
            if visitor(decode::<T>(&kv.key, &kv.value)?).is_break() {
                break;
            }
        }
        Ok(visited)
    }

    /// Typed listing of `start <= key < end` (empty `end` is unbounded). Entries of
    /// other doctypes, and non-JSON values, are skipped.
    pub fn get_by_range(&self, store: &dyn StateStore, start: &str, end: &str) -> AppResult<Vec<T>> {
        debug!(target: "skillbill::repository", doctype = T::DOCTYPE, start, end, "range");
        let results = store.get_state_by_range(start, end).map_err(|e| AppError::storage("get_state_by_range", e))?;
        collect_range(results)
    }

    /// Read-modify-write. The write only lands if the stored bytes are unchanged
    /// since the read; otherwise the update fails with `Conflict`.
    pub fn update<F>(&self, store: &dyn StateStore, key: &str, mutate: F) -> AppResult<T>
    where
        F: FnOnce(&mut T) -> AppResult<()>,
    {
        let (mut doc, original) = self.load(store, key)?;
        mutate(&mut doc)?;
        if doc.key() != key {
            return Err(AppError::invalid(format!("update must not change the key of '{key}'")));
        }
        if doc.doctype() != T::DOCTYPE {
            return Err(AppError::invalid(format!("update must not change the doctype of '{key}'")));
        }
        let bytes = encode(&doc)?;
        let written = store
            .compare_and_put(key, Some(&original), &bytes)
            .map_err(|e| AppError::storage("compare_and_put", e))?;
        if !written {
            return Err(AppError::conflict(format!("{} '{key}' was modified concurrently", T::DOCTYPE)));
        }
        debug!(target: "skillbill::repository", doctype = T::DOCTYPE, key, "update");
        Ok(doc)
    }

    /// Fetch and decode one document together with the raw bytes it was read from.
    fn load(&self, store: &dyn StateStore, key: &str) -> AppResult<(T, Vec<u8>)> {
        let (value, bytes) = self.load_raw(store, key)?;
        let doc = serde_json::from_value(value).map_err(|e| AppError::decode(key, e))?;
        Ok((doc, bytes))
    }

    fn load_raw(&self, store: &dyn StateStore, key: &str) -> AppResult<(Value, Vec<u8>)> {
        if key.is_empty() {
            return Err(AppError::invalid("key must not be empty"));
        }
        let missing = || AppError::not_found(format!("{} '{key}'", T::DOCTYPE));
        let bytes = store
            .get_state(key)
            .map_err(|e| AppError::storage("get_state", e))?
            .filter(|b| !b.is_empty())
            .ok_or_else(missing)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| AppError::decode(key, e))?;
        if value.get("doctype").and_then(Value::as_str) != Some(T::DOCTYPE) {
            return Err(missing());
        }
        Ok((value, bytes))
    }
}

fn decode<T: Document>(key: &str, bytes: &[u8]) -> AppResult<T> {
    serde_json::from_slice(bytes).map_err(|e| AppError::decode(key, e))
}

fn encode<T: Document>(doc: &T) -> AppResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|e| AppError::invalid(format!("cannot encode {}: {e}", T::DOCTYPE)))
}

fn collect_range<T: Document>(results: ResultsIterator) -> AppResult<Vec<T>> {
    let mut out = Vec::new();
    for item in results {
        let KeyValue { key, value } = item.map_err(|e| AppError::storage("get_state_by_range", e))?;
        let Ok(doc) = serde_json::from_slice::<Value>(&value) else { continue };
        if doc.get("doctype").and_then(Value::as_str) != Some(T::DOCTYPE) {
            continue;
        }
        out.push(serde_json::from_value(doc).map_err(|e| AppError::decode(key, e))?);
    }
    Ok(out)
}
