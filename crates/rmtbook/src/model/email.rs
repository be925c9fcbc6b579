//! Outgoing email records.

use serde::{Deserialize, Serialize};

/// Why an email is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    /// A patient asked for an appointment (sent to the RMT and the patient).
    BookingRequested,
    /// The RMT confirmed an appointment.
    BookingConfirmed,
    /// A patient moved an appointment to a new time.
    Rescheduled,
    /// An appointment was cancelled.
    Cancelled,
    /// An upcoming booked appointment.
    Reminder,
    /// A receipt was issued for a completed appointment.
    Receipt,
}

impl std::fmt::Display for EmailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BookingRequested => "booking_requested",
            Self::BookingConfirmed => "booking_confirmed",
            Self::Rescheduled => "rescheduled",
            Self::Cancelled => "cancelled",
            Self::Reminder => "reminder",
            Self::Receipt => "receipt",
        };
        f.write_str(name)
    }
}

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// What triggered it.
    pub kind: EmailKind,
}
