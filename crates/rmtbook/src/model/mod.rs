//! Core record types for rmtbook.
//!
//! These are plain data structures shared by storage, scheduling, and the
//! HTTP layer. Anything that needs the database or a clock lives elsewhere.

mod appointment;
mod email;
mod health_history;
mod message;
mod offering;
mod receipt;
mod user;

use std::sync::LazyLock;

use regex::Regex;

pub use appointment::{Appointment, AppointmentStatus};
pub use email::{Email, EmailKind};
pub use health_history::{renewal_due, HealthHistory, HealthHistoryInput, RENEWAL_PERIOD_DAYS};
pub use message::{Message, MessageInput};
pub use offering::{Location, LocationInput, Service, ServiceInput, WorkingHours};
pub use receipt::{format_receipt_number, Receipt};
pub use user::{normalize_email, Role, User, UserProfile};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ().-]{7,20}$").expect("phone pattern is valid"));

/// Generate a new record identifier.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Check that a string looks like an email address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Check that a string looks like a phone number.
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone.trim())
}

/// Trim a required text field, failing with `field is required` when empty.
///
/// # Errors
///
/// Returns a validation error if the value is blank.
pub fn require_text(field: &str, value: &str) -> crate::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::Error::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_unique() {
        assert_ne!(new_id(), new_id());
        assert_eq!(new_id().len(), 36);
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("patient@example.com"));
        assert!(is_valid_email("  rmt@clinic.ca "));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("two words@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn test_is_valid_phone() {
        assert!(is_valid_phone("(416) 555-0199"));
        assert!(is_valid_phone("+1 416 555 0199"));
        assert!(!is_valid_phone("call me"));
        assert!(!is_valid_phone("123"));
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("name", "  Jo ").unwrap(), "Jo");
        let err = require_text("name", "   ").unwrap_err();
        assert_eq!(err.to_string(), "name is required");
    }
}
