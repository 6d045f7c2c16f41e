//! Authentication and authorization for ledger callers.
//!
//! [`CredentialValidator`] checks a caller's certificate and password against the
//! stored user record. [`PermissionEvaluator`] resolves role to feature grants and
//! manages roles, features and grants. Both are plain values; the state handle (or
//! the [`Invocation`](crate::identity::Invocation)) is passed to every call.

mod credentials;
pub mod password;
mod permissions;
pub mod seed;

pub use credentials::CredentialValidator;
pub use permissions::{PermissionEvaluator, GRANT_FIELDS};
pub use seed::seed_defaults;
