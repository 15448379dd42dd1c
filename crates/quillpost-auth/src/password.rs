//! Password hashing and verification.
//!
//! Hashes are Argon2id PHC strings with a random salt from `OsRng` and the
//! default cost parameters. Both operations are CPU-bound, so the async
//! wrappers move them onto the blocking pool.

use std::sync::OnceLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AuthError;

/// Hash a password for storage.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Hashes on the blocking pool.
pub(crate) async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::internal(format!("Hashing task failed: {e}")))?
        .map_err(|e| AuthError::internal(format!("Failed to hash password: {e}")))
}

/// Verifies on the blocking pool.
///
/// With `hash = None` the password is checked against a throwaway hash so
/// that a missing account costs the same as a wrong password.
pub(crate) async fn verify_password_blocking(
    password: String,
    hash: Option<String>,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            let decoy = decoy_hash()?;
            verify_password(&password, decoy).map(|_| false)
        }
    })
    .await
    .map_err(|e| AuthError::internal(format!("Verification task failed: {e}")))?
    .map_err(|e| AuthError::internal(format!("Failed to verify password: {e}")))
}

fn decoy_hash() -> Result<&'static str, argon2::password_hash::Error> {
    static DECOY: OnceLock<String> = OnceLock::new();
    if let Some(hash) = DECOY.get() {
        return Ok(hash);
    }
    let hash = hash_password("quillpost-decoy-password")?;
    Ok(DECOY.get_or_init(|| hash))
}
