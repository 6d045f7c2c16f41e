//! Caller identity for ledger invocations.
//! The creator bytes of an invocation carry the caller's X.509 certificate; this
//! module turns them into a common name and a public key.

mod certificate;
mod invocation;
mod principal;

pub use certificate::{CallerCertificate, SerializedIdentity};
pub use invocation::Invocation;
pub use principal::Principal;

use crate::error::AppResult;

/// The certificate of the identity that submitted the invocation.
pub fn creator_certificate(inv: &Invocation<'_>) -> AppResult<CallerCertificate> {
    inv.certificate().cloned()
}

/// Subject common name of the caller's certificate.
pub fn current_user_name(inv: &Invocation<'_>) -> AppResult<String> {
    Ok(inv.certificate()?.common_name().to_string())
}

/// DER SubjectPublicKeyInfo of the caller's certificate.
pub fn public_key(inv: &Invocation<'_>) -> AppResult<Vec<u8>> {
    Ok(inv.certificate()?.public_key().to_vec())
}
