//! Password hashing and verification using Argon2
//!
//! Only administrators have passwords; patients sign in by email.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::TrackerError;

/// Minimum length accepted for an admin password
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password using Argon2id
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_password(password: &str) -> Result<String, TrackerError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(TrackerError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TrackerError::Auth(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, TrackerError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| TrackerError::Auth(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Login check against a user's stored hash, which may be absent.
///
/// A missing or unparseable hash is a failed login rather than an error, so
/// the caller answers every bad login the same way.
pub fn verify_stored_password(password: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(hash) => verify_password(password, hash).unwrap_or(false),
        None => false,
    }
}
