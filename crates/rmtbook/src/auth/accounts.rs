//! Account registration and sign-in.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::password::{hash_password, verify_dummy, verify_password};
use crate::error::{Error, Result};
use crate::model::{
    is_valid_email, is_valid_phone, new_id, normalize_email, require_text, Role, User,
};
use crate::storage::Storage;

/// Details for a new account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    /// Sign-in email; normalized before storing.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Optional contact number.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Clean an optional phone number; blank means none.
///
/// # Errors
///
/// Returns a validation error if a non-blank number is malformed.
pub fn optional_phone(phone: Option<&str>) -> Result<Option<String>> {
    match phone.map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) if is_valid_phone(p) => Ok(Some(p.to_string())),
        Some(_) => Err(Error::validation("phone is not a valid number")),
    }
}

impl NewAccount {
    /// Validate the details and hash the password into a user record.
    ///
    /// Hashing is slow; nothing here touches storage, so async callers can
    /// run it on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input.
    pub fn into_user(self, role: Role, now: DateTime<Utc>) -> Result<User> {
        let email = normalize_email(&self.email);
        if !is_valid_email(&email) {
            return Err(Error::validation("email is not a valid address"));
        }
        Ok(User {
            id: new_id(),
            email,
            password_hash: hash_password(&self.password)?,
            role,
            first_name: require_text("first_name", &self.first_name)?,
            last_name: require_text("last_name", &self.last_name)?,
            phone: optional_phone(self.phone.as_deref())?,
            created_at: now,
        })
    }
}

/// Store a prepared user.
///
/// There is one practitioner, so a second RMT account is refused.
///
/// # Errors
///
/// Returns a conflict if the email is taken or an RMT already exists.
pub fn create_account(storage: &Storage, user: &User) -> Result<()> {
    storage.in_transaction(|storage| {
        if user.role == Role::Rmt && storage.get_rmt()?.is_some() {
            return Err(Error::conflict("an RMT account already exists"));
        }
        storage.insert_user(user)
    })?;
    info!(user = %user.id, role = %user.role, "Account created");
    Ok(())
}

/// Create an account with `role`.
///
/// # Errors
///
/// Returns a validation error for bad input and a conflict if the email is
/// taken or an RMT already exists.
pub fn register(
    storage: &Storage,
    account: NewAccount,
    role: Role,
    now: DateTime<Utc>,
) -> Result<User> {
    let user = account.into_user(role, now)?;
    create_account(storage, &user)?;
    Ok(user)
}

/// Check a password against the account looked up for an email.
///
/// The lookup should use [`normalize_email`]. A missing account costs the
/// same work as a wrong password.
///
/// # Errors
///
/// Returns [`Error::InvalidCredentials`] if there is no account or the
/// password is wrong.
pub fn check_credentials(user: Option<User>, password: &str) -> Result<User> {
    let Some(user) = user else {
        verify_dummy(password);
        return Err(Error::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash) {
        return Err(Error::InvalidCredentials);
    }
    Ok(user)
}
