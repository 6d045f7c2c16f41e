//! Unified application error model.
//! One enum is shared by the repository, the identity resolver and the security layer.
//! Each variant carries a stable code so callers at the invocation boundary can match
//! on something other than the human-readable message.

use serde::Serialize;
use thiserror::Error;

use crate::storage::StoreError;

/// Stable, machine-readable error codes. Messages may be reworded; codes never change.
pub mod error_code {
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const QUERY_ERROR: &str = "QUERY_ERROR";
    pub const IDENTITY_ERROR: &str = "IDENTITY_ERROR";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Empty key, malformed argument, or a value outside its domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate unique field, or a concurrent write detected by compare-and-put.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error during {op}: {message}")]
    Storage { op: &'static str, message: String },

    /// A stored document could not be decoded into its typed shape.
    #[error("cannot decode document '{key}': {message}")]
    Decode { key: String, message: String },

    #[error("query failed: {message}; selector: {selector}")]
    Query { selector: String, message: String },

    #[error("identity error: {0}")]
    Identity(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    /// A local facility failed (entropy source, hasher); the caller's input was fine.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Boundary rendering of an error: `{"code": "NOT_FOUND", "message": "..."}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self { AppError::InvalidArgument(msg.into()) }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AppError::NotFound(msg.into()) }
    pub fn conflict<S: Into<String>>(msg: S) -> Self { AppError::Conflict(msg.into()) }
    pub fn identity<S: Into<String>>(msg: S) -> Self { AppError::Identity(msg.into()) }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AppError::Internal(msg.into()) }

    pub fn storage(op: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Storage { op, message: err.to_string() }
    }

    pub fn decode(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AppError::Decode { key: key.into(), message: err.to_string() }
    }

    pub fn query(selector: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AppError::Query { selector: selector.into(), message: err.to_string() }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) => error_code::INVALID_ARGUMENT,
            AppError::NotFound(_) => error_code::NOT_FOUND,
            AppError::Conflict(_) => error_code::CONFLICT,
            AppError::Storage { .. } => error_code::STORAGE_ERROR,
            AppError::Decode { .. } => error_code::DECODE_ERROR,
            AppError::Query { .. } => error_code::QUERY_ERROR,
            AppError::Identity(_) => error_code::IDENTITY_ERROR,
            AppError::Authentication(_) => error_code::UNAUTHENTICATED,
            AppError::Authorization(_) => error_code::PERMISSION_DENIED,
            AppError::Internal(_) => error_code::INTERNAL_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, AppError::NotFound(_)) }

    /// Collapse a lower-level failure into an authentication failure.
    /// Decode and internal failures pass through so they are not mistaken for bad credentials.
    pub fn into_authentication(self) -> Self {
        match self {
            e @ (AppError::Authentication(_) | AppError::Decode { .. } | AppError::Internal(_)) => e,
            other => AppError::Authentication(other.to_string()),
        }
    }

    /// Same as [`AppError::into_authentication`] for the authorization path.
    pub fn into_authorization(self) -> Self {
        match self {
            e @ (AppError::Authorization(_) | AppError::Decode { .. } | AppError::Internal(_)) => e,
            other => AppError::Authorization(other.to_string()),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { code: self.code_str(), message: self.to_string() }
    }

    pub fn to_response_json(&self) -> String {
        serde_json::to_string(&self.body()).unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", self.code_str()))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MalformedSelector { selector, reason } => AppError::Query { selector, message: reason },
            StoreError::Backend(message) => AppError::Storage { op: "store", message },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
