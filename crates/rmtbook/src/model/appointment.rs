//! Appointments and their status machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Asked for by a patient, waiting for the RMT to confirm.
    Requested,
    /// Confirmed by the RMT.
    Booked,
    /// The patient is picking a new time; the old slot stays held.
    Rescheduling,
    /// Treatment happened; a receipt exists.
    Completed,
    /// Cancelled by either side.
    Cancelled,
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "booked" => Ok(Self::Booked),
            "rescheduling" => Ok(Self::Rescheduling),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::Error::validation(format!(
                "unknown appointment status: {other}"
            ))),
        }
    }
}

impl AppointmentStatus {
    /// Database and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Booked => "booked",
            Self::Rescheduling => "rescheduling",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether an appointment in this state occupies its time slot.
    #[must_use]
    pub fn blocks_slot(self) -> bool {
        matches!(self, Self::Requested | Self::Booked | Self::Rescheduling)
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use AppointmentStatus::{Booked, Cancelled, Completed, Requested, Rescheduling};

        matches!(
            (self, next),
            (Requested, Booked | Cancelled | Rescheduling)
                | (Booked, Rescheduling | Completed | Cancelled)
                | (Rescheduling, Requested | Booked | Cancelled)
        )
    }

    /// Fail with `InvalidTransition` unless `next` is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn ensure_transition(self, next: Self) -> crate::Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(crate::Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// A treatment booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Unique identifier.
    pub id: String,
    /// Patient the appointment belongs to.
    pub patient_id: String,
    /// Where the treatment takes place.
    pub location_id: String,
    /// What treatment is booked.
    pub service_id: String,
    /// Start of the treatment.
    pub starts_at: DateTime<Utc>,
    /// Length of the treatment.
    pub duration_minutes: u32,
    /// Current lifecycle state.
    pub status: AppointmentStatus,
    /// State to return to if a rescheduling attempt is abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<AppointmentStatus>,
    /// When the current rescheduling attempt began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescheduling_started_at: Option<DateTime<Utc>>,
    /// When the reminder email went out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_sent_at: Option<DateTime<Utc>>,
    /// Free-form notes from the patient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// End of the treatment.
    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Whether this appointment, widened by `buffer` on both sides,
    /// intersects the half-open interval `[start, end)`.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>, buffer: Duration) -> bool {
        let blocked_from = self.starts_at - buffer;
        let blocked_until = self.ends_at() + buffer;
        start < blocked_until && blocked_from < end
    }
}
