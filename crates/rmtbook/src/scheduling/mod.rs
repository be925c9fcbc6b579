//! Appointment scheduling.
//!
//! - [`availability`] computes open slots from working hours and existing bookings.
//! - [`booking`] moves appointments through their lifecycle.
//! - [`maintenance`] holds the periodic jobs' logic.

pub mod availability;
pub mod booking;
pub mod maintenance;

pub use availability::{check_range, Availability, SlotRules, MAX_QUERY_DAYS};
pub use booking::{AppointmentRequest, BookingOutcome, CompletionOutcome, Scheduler};
pub use maintenance::{reset_stale_rescheduling, send_due_reminders, ReminderSummary};
