//! skillbill ledger core: a typed document repository over a key/value-plus-selector
//! state store, and certificate-based authentication and feature authorization on top.

pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod query;
pub mod repository;
pub mod security;
pub mod storage;

pub use error::{AppError, AppResult};
pub use identity::{Invocation, Principal};
pub use models::{AccessLevel, Document, Feature, FeatureGrant, Role, RoleFeature, User};
pub use query::Selector;
pub use repository::Repository;
pub use security::{CredentialValidator, PermissionEvaluator};
pub use storage::{MemoryStore, StateStore};
