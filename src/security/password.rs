use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

use crate::error::{AppError, AppResult};

/// Hash a password into a PHC string (Argon2id, default parameters, random 16-byte salt).
pub fn hash_password(password: &str) -> AppResult<String> {
    if password.is_empty() {
        return Err(AppError::invalid("password must not be empty"));
    }
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| hashing_failed("generate salt", e))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| hashing_failed("encode salt", e))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| hashing_failed("hash password", e))?
        .to_string();
    Ok(phc)
}

fn hashing_failed(stage: &str, err: impl std::fmt::Display) -> AppError {
    AppError::internal(format!("cannot {stage}: {err}"))
}

/// False for a wrong password and for a stored hash that is not a PHC string.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let h = hash_password("s3cret").unwrap();
        assert!(h.starts_with("$argon2"));
        assert!(verify_password(&h, "s3cret"));
        assert!(!verify_password(&h, "S3cret"));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("", "x"));
        assert!(!verify_password("plaintext", "plaintext"));
    }

    #[test]
    fn empty_password_rejected() {
        assert!(matches!(hash_password(""), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn hasher_failures_are_internal() {
        let err = hashing_failed("generate salt", "entropy source unavailable");
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.code_str(), "INTERNAL_ERROR");
        assert!(err.to_string().contains("cannot generate salt"));
    }
}
