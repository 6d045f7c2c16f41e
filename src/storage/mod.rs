//!
//! skillbill storage module
//! ------------------------
//! This module defines the contract the ledger core consumes from its storage
//! engine, plus an in-memory engine implementing it. The contract is a plain
//! key/value store over opaque bytes with two scan primitives:
//!
//! - a selector query (`{"selector": {...}, "fields": [...]}`) evaluated by the
//!   engine, returning matching `(key, value)` pairs in a stable order;
//! - a key range scan over `[start, end)`.
//!
//! Both scans hand back a [`ResultsIterator`], which must be released on every
//! exit path. Release happens on drop, so early returns and `?` propagation in
//! callers close the sequence without extra bookkeeping.
//!
//! Documents themselves are flat JSON objects; the engine does not interpret
//! them except when evaluating selectors.

use thiserror::Error;

pub mod kv;
mod selector;

pub use kv::{MemoryStore, PersistenceSettings, StoreSettings};
pub use selector::ParsedSelector;

/// Failure reported by a storage engine. The repository adds operation context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),

    /// The selector text could not be parsed or uses an unsupported operator.
    #[error("malformed selector: {reason}")]
    MalformedSelector { selector: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single stored entry returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// Key/value-plus-query engine consumed by the document repository.
///
/// Implementations must be usable behind `&dyn StateStore`; the repository never
/// holds on to a handle between calls.
pub trait StateStore: Send + Sync {
    /// Get the value for a key. `None` if the key does not exist.
    fn get_state(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    fn put_state(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a key. Deleting an absent key is not an error at this layer.
    fn del_state(&self, key: &str) -> StoreResult<()>;

    /// Evaluate a selector and return the matching entries.
    fn get_query_result(&self, selector: &str) -> StoreResult<ResultsIterator>;

    /// Entries with `start <= key < end`, ordered by key. An empty `end` means unbounded.
    fn get_state_by_range(&self, start: &str, end: &str) -> StoreResult<ResultsIterator>;

    /// Atomically replace `key` only when its current value equals `expected`
    /// (`None` meaning "absent"). Returns false when the current value differs.
    fn compare_and_put(&self, key: &str, expected: Option<&[u8]>, value: &[u8]) -> StoreResult<bool>;
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// Closable sequence of scan results.
///
/// Dropping the iterator closes it; [`ResultsIterator::close`] does the same
/// explicitly. The close hook runs exactly once.
pub struct ResultsIterator {
    inner: std::vec::IntoIter<StoreResult<KeyValue>>,
    on_close: Option<CloseHook>,
}

impl ResultsIterator {
    pub fn new(items: Vec<KeyValue>) -> Self {
        Self { inner: items.into_iter().map(Ok).collect::<Vec<_>>().into_iter(), on_close: None }
    }

    /// Build an iterator whose items may individually fail, mirroring engines that
    /// report errors mid-scan.
    pub fn from_results(items: Vec<StoreResult<KeyValue>>) -> Self {
        Self { inner: items.into_iter(), on_close: None }
    }

    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn close(mut self) { self.release(); }

    fn release(&mut self) {
        if let Some(hook) = self.on_close.take() { hook(); }
    }
}

impl Iterator for ResultsIterator {
    type Item = StoreResult<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> { self.inner.next() }

    fn size_hint(&self) -> (usize, Option<usize>) { self.inner.size_hint() }
}

impl Drop for ResultsIterator {
    fn drop(&mut self) { self.release(); }
}

impl std::fmt::Debug for ResultsIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsIterator")
            .field("remaining", &self.inner.len())
            .field("open", &self.on_close.is_some())
            .finish()
    }
}
