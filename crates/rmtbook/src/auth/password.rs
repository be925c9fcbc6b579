//! Password hashing.
//!
//! Hashes are Argon2id PHC strings (`$argon2id$v=19$...`) with the
//! library's default cost parameters. Hashing and verification are slow on
//! purpose; async callers run them on the blocking pool.

use std::sync::LazyLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{Error, Result};

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Longest accepted password.
pub const MAX_PASSWORD_LEN: usize = 256;

/// Hash verified against when an email is unknown, so sign-in takes the
/// same time whether or not the account exists.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| encode("not-a-password").ok());

/// Check a candidate password against the length rules.
///
/// # Errors
///
/// Returns a validation error if the password is too short or too long.
pub fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate and hash a password with a fresh salt.
///
/// # Errors
///
/// Returns a validation error if the password breaks the length rules, and
/// an internal error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    validate_password(password)?;
    encode(password)
}

/// Check a password against a stored hash.
///
/// Malformed stored values never verify.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Burn the same work as a real verification.
pub fn verify_dummy(password: &str) {
    match DUMMY_HASH.as_deref() {
        Some(dummy) => {
            let _ = verify_password(password, dummy);
        }
        None => {
            let _ = encode(password);
        }
    }
}

fn encode(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|e| Error::internal(format!("password salt: {e}")))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::internal(format!("password hashing: {e}")))?;
    Ok(hash.to_string())
}
