//! Receipts issued for completed appointments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Proof of payment for a completed appointment.
///
/// Receipts copy the names and amounts they print so later edits to the
/// service or the patient's profile do not change issued receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Unique identifier.
    pub id: String,
    /// Human-facing sequential number, e.g. `R-000042`.
    pub receipt_number: String,
    /// Appointment the receipt is for.
    pub appointment_id: String,
    /// Patient billed.
    pub patient_id: String,
    /// Patient name at the time of issue.
    pub patient_name: String,
    /// Service name at the time of issue.
    pub service_name: String,
    /// Treatment length.
    pub duration_minutes: u32,
    /// Amount charged, in cents.
    pub price_cents: i64,
    /// Treatment date in practice local time.
    pub appointment_date: NaiveDate,
    /// When the receipt was issued.
    pub issued_at: DateTime<Utc>,
    /// Practitioner name.
    pub rmt_name: String,
    /// Practitioner registration number.
    pub rmt_registration_number: String,
}

impl Receipt {
    /// The amount formatted as dollars, e.g. `$120.00`.
    #[must_use]
    pub fn amount_display(&self) -> String {
        format!("${}.{:02}", self.price_cents / 100, self.price_cents % 100)
    }
}

/// Format a receipt sequence number.
#[must_use]
pub fn format_receipt_number(sequence: i64) -> String {
    format!("R-{sequence:06}")
}
