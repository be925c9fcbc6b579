//! Contact-form messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{is_valid_email, is_valid_phone, require_text};

/// Longest accepted message body.
const MAX_BODY_LEN: usize = 5_000;

/// A contact-form message in the RMT's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: String,
    /// Sender name.
    pub name: String,
    /// Sender email.
    pub email: String,
    /// Sender phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Message text.
    pub body: String,
    /// When the message arrived.
    pub created_at: DateTime<Utc>,
    /// Whether the RMT has read it.
    pub read: bool,
}

/// A contact-form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInput {
    /// Sender name.
    pub name: String,
    /// Sender email.
    pub email: String,
    /// Sender phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Message text.
    pub body: String,
}

impl MessageInput {
    /// Validate the submission and stamp it as unread.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing or malformed fields.
    pub fn into_message(self, id: String, created_at: DateTime<Utc>) -> crate::Result<Message> {
        let name = require_text("name", &self.name)?;
        let body = require_text("body", &self.body)?;
        if body.len() > MAX_BODY_LEN {
            return Err(crate::Error::validation(format!(
                "body must be at most {MAX_BODY_LEN} characters"
            )));
        }
        if !is_valid_email(&self.email) {
            return Err(crate::Error::validation("email is not a valid address"));
        }
        let phone = match self.phone.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(p) if is_valid_phone(p) => Some(p.to_string()),
            Some(_) => return Err(crate::Error::validation("phone is not a valid number")),
        };
        let subject = match self.subject.trim() {
            "" => "(no subject)".to_string(),
            s => s.to_string(),
        };

        Ok(Message {
            id,
            name,
            email: self.email.trim().to_string(),
            phone,
            subject,
            body,
            created_at,
            read: false,
        })
    }
}
