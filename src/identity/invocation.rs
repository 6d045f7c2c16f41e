use once_cell::sync::OnceCell;

use super::{CallerCertificate, SerializedIdentity};
use crate::error::AppResult;
use crate::storage::{ResultsIterator, StateStore, StoreResult};

#[derive(Debug)]
struct Creator {
    mspid: String,
    certificate: CallerCertificate,
}

/// Context of one ledger invocation: the state handle plus the creator bytes of
/// the submitting identity.
///
/// The creator is decoded at most once per invocation. The invocation is itself a
/// [`StateStore`], so the repository and services can be handed `&invocation`.
pub struct Invocation<'a> {
    store: &'a dyn StateStore,
    creator: Vec<u8>,
    resolved: OnceCell<Creator>,
}

impl<'a> Invocation<'a> {
    pub fn new(store: &'a dyn StateStore, creator: impl Into<Vec<u8>>) -> Self {
        Self { store, creator: creator.into(), resolved: OnceCell::new() }
    }

    /// Build the creator bytes from an organization id and a PEM certificate.
    pub fn with_certificate(store: &'a dyn StateStore, mspid: &str, pem: impl Into<Vec<u8>>) -> Self {
        let id = SerializedIdentity::new(mspid, pem);
        Self::new(store, prost::Message::encode_to_vec(&id))
    }

    /// Raw serialized identity of the caller.
    pub fn creator(&self) -> &[u8] { &self.creator }

    pub fn store(&self) -> &'a dyn StateStore { self.store }

    pub fn certificate(&self) -> AppResult<&CallerCertificate> {
        Ok(&self.resolve()?.certificate)
    }

    pub fn mspid(&self) -> AppResult<&str> {
        Ok(&self.resolve()?.mspid)
    }

    fn resolve(&self) -> AppResult<&Creator> {
        self.resolved.get_or_try_init(|| {
            let id = SerializedIdentity::decode_creator(&self.creator)?;
            let certificate = CallerCertificate::from_pem(&id.id_bytes)?;
            Ok(Creator { mspid: id.mspid, certificate })
        })
    }
}

impl std::fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("creator_len", &self.creator.len())
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

impl StateStore for Invocation<'_> {
    fn get_state(&self, key: &str) -> StoreResult<Option<Vec<u8>>> { self.store.get_state(key) }

    fn put_state(&self, key: &str, value: &[u8]) -> StoreResult<()> { self.store.put_state(key, value) }

    fn del_state(&self, key: &str) -> StoreResult<()> { self.store.del_state(key) }

    fn get_query_result(&self, selector: &str) -> StoreResult<ResultsIterator> { self.store.get_query_result(selector) }

    fn get_state_by_range(&self, start: &str, end: &str) -> StoreResult<ResultsIterator> {
        self.store.get_state_by_range(start, end)
    }

    fn compare_and_put(&self, key: &str, expected: Option<&[u8]>, value: &[u8]) -> StoreResult<bool> {
        self.store.compare_and_put(key, expected, value)
    }
}
