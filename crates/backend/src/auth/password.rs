//! Password hashing and verification with Argon2id.
//!
//! [`hash_password`] salts each call with fresh OS randomness and returns a
//! PHC-format string (`$argon2id$v=19$m=19456,t=2,p=1$...`) which carries the
//! salt and parameters. [`verify_password`] parses that string back.
//!
//! Both are CPU-bound; async callers run them on the blocking pool.

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to hash password: {0}")]
pub struct PasswordError(String);

/// Hash a password using Argon2id. Returns a PHC-format string.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored PHC hash. A malformed hash never matches.
pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Spend the cost of one verification without a real hash, so a lookup
/// miss takes as long as a wrong password.
pub fn verify_against_dummy(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let dummy = DUMMY_HASH.get_or_init(|| hash_password("dummy-password-never-matches").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(hash, password);
    }
}
