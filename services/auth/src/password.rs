//! Password hashing and verification using argon2
//!
//! Both operations are CPU-bound; the async wrappers run them on the
//! blocking thread pool.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};

use crate::error::{AuthError, AuthResult};

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored hash
///
/// A hash that cannot be parsed counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

/// Verified against when no user matched, so that path costs a full argon2 run
///
/// Carries the same algorithm and parameters as [`hash_password`] output;
/// no password hashes to it.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$7WRG4R/PGh5tbG2weWLhog$wrcQonRzVMeCe5CLEI8j5/K7Yt18R3D/tMSfb+HC26k";

pub async fn hash_password_async(password: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hashing(format!("Hashing task failed: {}", e)))?
}

/// Verify `password` against `hash`, or against a dummy hash when `hash`
/// is `None` so that unknown accounts cost as much as wrong passwords.
pub async fn verify_password_async(password: String, hash: Option<String>) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            verify_password(&password, DUMMY_HASH);
            false
        }
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("Verification task failed: {}", e)))
}
