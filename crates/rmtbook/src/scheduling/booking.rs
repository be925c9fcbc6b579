//! Appointment lifecycle operations.
//!
//! Every operation validates against current storage, applies its change
//! inside one transaction, and hands back the emails the caller should
//! dispatch once the change is committed.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::availability::{add_checked, check_range, sub_checked, Availability, SlotRules};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    format_receipt_number, new_id, renewal_due, Appointment, AppointmentStatus, Email, Location,
    Receipt, Role, Service, User,
};
use crate::notify::{AppointmentContext, Composer};
use crate::storage::Storage;

/// Longest accepted appointment note.
const MAX_NOTES_LEN: usize = 1_000;

/// A patient's booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    /// Service to book.
    pub service_id: String,
    /// Location to book at.
    pub location_id: String,
    /// Desired start time.
    pub starts_at: DateTime<Utc>,
    /// Optional notes for the RMT.
    #[serde(default)]
    pub notes: Option<String>,
}

/// The result of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingOutcome {
    /// The appointment as stored after the change.
    pub appointment: Appointment,
    /// Emails to dispatch.
    pub emails: Vec<Email>,
}

/// The result of completing an appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// The completed appointment.
    pub appointment: Appointment,
    /// The receipt issued for it.
    pub receipt: Receipt,
    /// Emails to dispatch.
    pub emails: Vec<Email>,
}

/// Appointment operations over one storage handle.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler.
    #[must_use]
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// Slot rules from configuration.
    #[must_use]
    pub fn rules(&self) -> SlotRules {
        SlotRules::from_config(&self.config.scheduling)
    }

    /// Open slots for a service at a location over an inclusive local date range.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is invalid or outside the bookable
    /// days, the service or location does not exist, or storage fails.
    pub fn available_slots(
        &self,
        service_id: &str,
        location_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        check_range(from, to)?;
        let rules = self.rules();
        rules.check_bookable_dates(from, to, now)?;
        let service = self.service(service_id)?;
        let location = self.location(location_id)?;
        let (start, end) = rules.day_bounds(from, to)?;
        let blocking = self.storage.list_blocking_between(
            sub_checked(start, rules.buffer)?,
            add_checked(end, rules.buffer)?,
            None,
        )?;

        Ok(Availability::new(rules, &location, &service, &blocking).open_slots(from, to, now))
    }

    /// A patient asks for an appointment.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the slot is not bookable or the
    /// patient's health history is missing or out of date, and a conflict
    /// if the slot was taken.
    pub fn request_appointment(
        &self,
        patient_id: &str,
        request: AppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome> {
        self.storage.in_transaction(|storage| {
            let patient = self.patient(patient_id)?;
            let service = self.service(&request.service_id)?;
            let location = self.location(&request.location_id)?;
            let notes = clean_notes(request.notes)?;

            if self.config.scheduling.require_current_health_history {
                let latest = storage.latest_health_history(patient_id)?;
                if renewal_due(latest.as_ref(), now) {
                    return Err(Error::validation(
                        "a current health history is required before booking",
                    ));
                }
            }

            let duration = Duration::minutes(i64::from(service.duration_minutes));
            let blocking = self.blocking_around(request.starts_at, duration, None)?;
            Availability::new(self.rules(), &location, &service, &blocking)
                .check_slot(request.starts_at, now)?;

            let appointment = Appointment {
                id: new_id(),
                patient_id: patient.id.clone(),
                location_id: location.id.clone(),
                service_id: service.id.clone(),
                starts_at: request.starts_at,
                duration_minutes: service.duration_minutes,
                status: AppointmentStatus::Requested,
                previous_status: None,
                rescheduling_started_at: None,
                reminder_sent_at: None,
                notes,
                created_at: now,
                updated_at: now,
            };
            storage.insert_appointment(&appointment)?;
            info!(appointment = %appointment.id, patient = %patient.id, "Appointment requested");

            let emails = self
                .composer()?
                .booking_requested(context(&appointment, &patient, &service, &location));
            Ok(BookingOutcome {
                appointment,
                emails,
            })
        })
    }

    /// The RMT confirms a requested appointment.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointment does not exist or is not requested.
    pub fn confirm_appointment(&self, id: &str, now: DateTime<Utc>) -> Result<BookingOutcome> {
        self.storage.in_transaction(|storage| {
            let mut appointment = self.appointment(id)?;
            require_status(&appointment, AppointmentStatus::Requested, AppointmentStatus::Booked)?;

            appointment.status = AppointmentStatus::Booked;
            appointment.updated_at = now;
            storage.update_appointment(&appointment)?;
            info!(appointment = %appointment.id, "Appointment confirmed");

            let (patient, service, location) = self.parts(&appointment)?;
            let email = self
                .composer()?
                .booking_confirmed(context(&appointment, &patient, &service, &location));
            Ok(BookingOutcome {
                appointment,
                emails: vec![email],
            })
        })
    }

    /// A patient starts picking a new time. The old slot stays held.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointment is not the patient's, has already
    /// started, or cannot be rescheduled from its current status.
    pub fn begin_rescheduling(
        &self,
        patient_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome> {
        self.storage.in_transaction(|storage| {
            let mut appointment = self.own_appointment(patient_id, id)?;
            appointment
                .status
                .ensure_transition(AppointmentStatus::Rescheduling)?;
            if appointment.starts_at <= now {
                return Err(Error::validation("appointment has already started"));
            }

            appointment.previous_status = Some(appointment.status);
            appointment.status = AppointmentStatus::Rescheduling;
            appointment.rescheduling_started_at = Some(now);
            appointment.updated_at = now;
            storage.update_appointment(&appointment)?;
            info!(appointment = %appointment.id, "Rescheduling started");

            Ok(BookingOutcome {
                appointment,
                emails: Vec::new(),
            })
        })
    }

    /// A patient picks the new time. The appointment goes back to
    /// `requested` for the RMT to confirm.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointment is not the patient's, is not
    /// being rescheduled, or the new slot is not bookable.
    pub fn complete_rescheduling(
        &self,
        patient_id: &str,
        id: &str,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome> {
        self.storage.in_transaction(|storage| {
            let mut appointment = self.own_appointment(patient_id, id)?;
            require_status(
                &appointment,
                AppointmentStatus::Rescheduling,
                AppointmentStatus::Requested,
            )?;

            let (patient, service, location) = self.parts(&appointment)?;
            let duration = Duration::minutes(i64::from(appointment.duration_minutes));
            let blocking = self.blocking_around(new_start, duration, Some(&appointment.id))?;
            // The new slot keeps the length it was booked with
            let booked = Service {
                duration_minutes: appointment.duration_minutes,
                ..service.clone()
            };
            Availability::new(self.rules(), &location, &booked, &blocking)
                .excluding(&appointment.id)
                .check_slot(new_start, now)?;

            let old_start = appointment.starts_at;
            appointment.starts_at = new_start;
            appointment.status = AppointmentStatus::Requested;
            appointment.previous_status = None;
            appointment.rescheduling_started_at = None;
            appointment.reminder_sent_at = None;
            appointment.updated_at = now;
            storage.update_appointment(&appointment)?;
            info!(appointment = %appointment.id, from = %old_start, to = %new_start, "Appointment rescheduled");

            let emails = self.composer()?.rescheduled(
                context(&appointment, &patient, &service, &location),
                old_start,
            );
            Ok(BookingOutcome {
                appointment,
                emails,
            })
        })
    }

    /// A patient gives up on rescheduling; the appointment returns to
    /// where it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointment is not the patient's or is not
    /// being rescheduled.
    pub fn abandon_rescheduling(
        &self,
        patient_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome> {
        self.storage.in_transaction(|storage| {
            let mut appointment = self.own_appointment(patient_id, id)?;
            let restored = restore_from_rescheduling(&mut appointment, now)?;
            storage.update_appointment(&appointment)?;
            info!(appointment = %appointment.id, status = %restored, "Rescheduling abandoned");

            Ok(BookingOutcome {
                appointment,
                emails: Vec::new(),
            })
        })
    }

    /// Cancel an appointment. Patients may cancel their own upcoming
    /// appointments; the RMT may cancel any open one.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointment is not visible to the actor, is
    /// already terminal, or (for patients) has already started.
    pub fn cancel_appointment(
        &self,
        actor_id: &str,
        role: Role,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome> {
        self.storage.in_transaction(|storage| {
            let mut appointment = match role {
                Role::Patient => self.own_appointment(actor_id, id)?,
                Role::Rmt => self.appointment(id)?,
            };
            appointment
                .status
                .ensure_transition(AppointmentStatus::Cancelled)?;
            if role == Role::Patient && appointment.starts_at <= now {
                return Err(Error::validation("appointment has already started"));
            }

            appointment.status = AppointmentStatus::Cancelled;
            appointment.previous_status = None;
            appointment.rescheduling_started_at = None;
            appointment.updated_at = now;
            storage.update_appointment(&appointment)?;
            info!(appointment = %appointment.id, by = %role, "Appointment cancelled");

            let (patient, service, location) = self.parts(&appointment)?;
            let emails = self.composer()?.cancelled(
                context(&appointment, &patient, &service, &location),
                role == Role::Rmt,
            );
            Ok(BookingOutcome {
                appointment,
                emails,
            })
        })
    }

    /// The RMT marks a booked appointment as done and issues its receipt.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointment is not booked or has not started yet.
    pub fn complete_appointment(&self, id: &str, now: DateTime<Utc>) -> Result<CompletionOutcome> {
        self.storage.in_transaction(|storage| {
            let mut appointment = self.appointment(id)?;
            appointment
                .status
                .ensure_transition(AppointmentStatus::Completed)?;
            if appointment.starts_at > now {
                return Err(Error::validation(
                    "cannot complete an appointment before it starts",
                ));
            }

            let (patient, service, _) = self.parts(&appointment)?;
            let sequence = storage.next_receipt_sequence()?;
            let receipt = Receipt {
                id: new_id(),
                receipt_number: format_receipt_number(sequence),
                appointment_id: appointment.id.clone(),
                patient_id: patient.id.clone(),
                patient_name: patient.full_name(),
                service_name: service.name.clone(),
                duration_minutes: appointment.duration_minutes,
                price_cents: service.price_cents,
                appointment_date: appointment
                    .starts_at
                    .with_timezone(&self.config.scheduling.local_offset())
                    .date_naive(),
                issued_at: now,
                rmt_name: self.rmt_name()?,
                rmt_registration_number: self.config.practice.rmt_registration_number.clone(),
            };

            appointment.status = AppointmentStatus::Completed;
            appointment.updated_at = now;
            storage.update_appointment(&appointment)?;
            storage.insert_receipt(&receipt, sequence)?;
            info!(
                appointment = %appointment.id,
                receipt = %receipt.receipt_number,
                "Appointment completed"
            );

            let email = self.composer()?.receipt(&patient, &receipt);
            Ok(CompletionOutcome {
                appointment,
                receipt,
                emails: vec![email],
            })
        })
    }

    /// Composer for practice emails, falling back to the RMT account's
    /// address when none is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn composer(&self) -> Result<Composer> {
        let rmt = if self.config.practice.rmt_email.is_empty() {
            self.storage.get_rmt()?
        } else {
            None
        };
        Ok(Composer::new(
            self.config.practice.clone(),
            self.config.scheduling.local_offset(),
        )
        .with_fallback_rmt_address(rmt.as_ref().map(|u| u.email.as_str())))
    }

    /// Patient, service, and location an appointment refers to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if any of them is missing.
    pub fn parts(&self, appointment: &Appointment) -> Result<(User, Service, Location)> {
        let patient = self
            .storage
            .get_user(&appointment.patient_id)?
            .ok_or_else(|| Error::not_found("user", appointment.patient_id.clone()))?;
        let service = self.service(&appointment.service_id)?;
        let location = self.location(&appointment.location_id)?;
        Ok((patient, service, location))
    }

    fn blocking_around(
        &self,
        start: DateTime<Utc>,
        duration: Duration,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Appointment>> {
        let buffer = self.config.scheduling.buffer();
        let from = sub_checked(start, buffer)?;
        let to = add_checked(add_checked(start, duration)?, buffer)?;
        self.storage.list_blocking_between(from, to, exclude_id)
    }

    fn rmt_name(&self) -> Result<String> {
        if !self.config.practice.rmt_name.is_empty() {
            return Ok(self.config.practice.rmt_name.clone());
        }
        Ok(self
            .storage
            .get_rmt()?
            .map(|rmt| rmt.full_name())
            .unwrap_or_default())
    }

    fn patient(&self, id: &str) -> Result<User> {
        let user = self
            .storage
            .get_user(id)?
            .ok_or_else(|| Error::not_found("user", id))?;
        if user.role != Role::Patient {
            return Err(Error::forbidden("only patients can book appointments"));
        }
        Ok(user)
    }

    fn service(&self, id: &str) -> Result<Service> {
        self.storage
            .get_service(id)?
            .ok_or_else(|| Error::not_found("service", id))
    }

    fn location(&self, id: &str) -> Result<Location> {
        self.storage
            .get_location(id)?
            .ok_or_else(|| Error::not_found("location", id))
    }

    fn appointment(&self, id: &str) -> Result<Appointment> {
        self.storage
            .get_appointment(id)?
            .ok_or_else(|| Error::not_found("appointment", id))
    }

    /// Another patient's appointment is reported as missing.
    fn own_appointment(&self, patient_id: &str, id: &str) -> Result<Appointment> {
        let appointment = self.appointment(id)?;
        if appointment.patient_id != patient_id {
            return Err(Error::not_found("appointment", id));
        }
        Ok(appointment)
    }
}

/// Put a rescheduling appointment back in the state it was in before,
/// returning that state.
///
/// # Errors
///
/// Returns [`Error::InvalidTransition`] if the appointment is not rescheduling.
pub fn restore_from_rescheduling(
    appointment: &mut Appointment,
    now: DateTime<Utc>,
) -> Result<AppointmentStatus> {
    let restored = appointment
        .previous_status
        .filter(|s| matches!(s, AppointmentStatus::Requested | AppointmentStatus::Booked))
        .unwrap_or(AppointmentStatus::Booked);
    require_status(appointment, AppointmentStatus::Rescheduling, restored)?;

    appointment.status = restored;
    appointment.previous_status = None;
    appointment.rescheduling_started_at = None;
    appointment.updated_at = now;
    Ok(restored)
}

/// Require the exact current status for a transition.
fn require_status(
    appointment: &Appointment,
    expected: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<()> {
    if appointment.status != expected || !expected.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            from: appointment.status.to_string(),
            to: next.to_string(),
        });
    }
    Ok(())
}

fn clean_notes(notes: Option<String>) -> Result<Option<String>> {
    let notes = notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(Error::validation(format!(
            "notes must be at most {MAX_NOTES_LEN} characters"
        )));
    }
    Ok(notes)
}

fn context<'c>(
    appointment: &'c Appointment,
    patient: &'c User,
    service: &'c Service,
    location: &'c Location,
) -> AppointmentContext<'c> {
    AppointmentContext {
        appointment,
        patient,
        service,
        location,
    }
}
