//! Outgoing email.
//!
//! Delivery itself is someone else's job: a [`Mailer`] hands an [`Email`]
//! to whatever transport is configured. This module composes the messages
//! the practice sends and dispatches batches of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, warn};

use crate::config::PracticeConfig;
use crate::error::{Error, Result};
use crate::model::{Appointment, Email, EmailKind, Location, Receipt, Service, User};

/// Sends emails.
#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    /// Deliver one email.
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Mailer that writes each email to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        info!(
            to = %email.to,
            kind = %email.kind,
            subject = %email.subject,
            "Email queued for delivery"
        );
        Ok(())
    }
}

/// Mailer that keeps every email in memory.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Emails of one kind sent so far.
    #[must_use]
    pub fn sent_of_kind(&self, kind: EmailKind) -> Vec<Email> {
        self.sent().into_iter().filter(|e| e.kind == kind).collect()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::internal(format!(
                "mail transport unavailable for {}",
                email.to
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }
}

/// Send a batch of emails, logging individual failures.
///
/// Returns how many were delivered.
pub async fn dispatch(mailer: &dyn Mailer, emails: &[Email]) -> usize {
    let mut delivered = 0;
    for email in emails {
        match mailer.send(email).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(to = %email.to, kind = %email.kind, error = %e, "Failed to send email"),
        }
    }
    delivered
}

/// Everything an appointment email talks about.
#[derive(Debug, Clone, Copy)]
pub struct AppointmentContext<'a> {
    /// The appointment.
    pub appointment: &'a Appointment,
    /// Its patient.
    pub patient: &'a User,
    /// The booked service.
    pub service: &'a Service,
    /// Where it takes place.
    pub location: &'a Location,
}

/// Writes the practice's emails.
#[derive(Debug, Clone)]
pub struct Composer {
    practice: PracticeConfig,
    offset: FixedOffset,
}

impl Composer {
    /// Create a composer for the practice, rendering times at `offset`.
    #[must_use]
    pub fn new(practice: PracticeConfig, offset: FixedOffset) -> Self {
        Self { practice, offset }
    }

    /// Address RMT notifications go to, if one is known.
    #[must_use]
    pub fn rmt_address(&self) -> Option<&str> {
        Some(self.practice.rmt_email.as_str()).filter(|a| !a.is_empty())
    }

    /// Use `address` for RMT notifications when none is configured.
    #[must_use]
    pub fn with_fallback_rmt_address(mut self, address: Option<&str>) -> Self {
        if self.practice.rmt_email.is_empty() {
            if let Some(address) = address {
                self.practice.rmt_email = address.to_string();
            }
        }
        self
    }

    /// Acknowledgement to the patient plus a heads-up to the RMT.
    #[must_use]
    pub fn booking_requested(&self, ctx: AppointmentContext<'_>) -> Vec<Email> {
        let mut emails = vec![self.to_patient(
            ctx,
            EmailKind::BookingRequested,
            "Appointment request received",
            &format!(
                "We received your request for {} on {}.\n\
                 You will get another email once it is confirmed.",
                ctx.service.name,
                self.when(ctx.appointment.starts_at)
            ),
        )];
        emails.extend(self.to_rmt(
            EmailKind::BookingRequested,
            &format!("New appointment request from {}", ctx.patient.full_name()),
            &self.summary(ctx),
        ));
        emails
    }

    /// Confirmation to the patient.
    #[must_use]
    pub fn booking_confirmed(&self, ctx: AppointmentContext<'_>) -> Email {
        self.to_patient(
            ctx,
            EmailKind::BookingConfirmed,
            "Your appointment is confirmed",
            &format!(
                "Your {} is booked for {} at {} ({}).",
                ctx.service.name,
                self.when(ctx.appointment.starts_at),
                ctx.location.name,
                ctx.location.address
            ),
        )
    }

    /// Notice of a new time, to both sides.
    #[must_use]
    pub fn rescheduled(&self, ctx: AppointmentContext<'_>, old_start: DateTime<Utc>) -> Vec<Email> {
        let moved = format!(
            "moved from {} to {}",
            self.when(old_start),
            self.when(ctx.appointment.starts_at)
        );
        let mut emails = vec![self.to_patient(
            ctx,
            EmailKind::Rescheduled,
            "Appointment rescheduled",
            &format!(
                "Your {} was {moved}. The new time is awaiting confirmation.",
                ctx.service.name
            ),
        )];
        emails.extend(self.to_rmt(
            EmailKind::Rescheduled,
            &format!("{} rescheduled", ctx.patient.full_name()),
            &format!("{}\n{moved}", self.summary(ctx)),
        ));
        emails
    }

    /// Cancellation notice to whichever side did not cancel.
    #[must_use]
    pub fn cancelled(&self, ctx: AppointmentContext<'_>, by_rmt: bool) -> Vec<Email> {
        if by_rmt {
            vec![self.to_patient(
                ctx,
                EmailKind::Cancelled,
                "Appointment cancelled",
                &format!(
                    "Your {} on {} has been cancelled by {}.\nPlease contact us to rebook.",
                    ctx.service.name,
                    self.when(ctx.appointment.starts_at),
                    self.practice.business_name
                ),
            )]
        } else {
            self.to_rmt(
                EmailKind::Cancelled,
                &format!("{} cancelled", ctx.patient.full_name()),
                &self.summary(ctx),
            )
            .into_iter()
            .collect()
        }
    }

    /// Reminder of an upcoming appointment.
    #[must_use]
    pub fn reminder(&self, ctx: AppointmentContext<'_>) -> Email {
        self.to_patient(
            ctx,
            EmailKind::Reminder,
            "Appointment reminder",
            &format!(
                "This is a reminder of your {} on {} at {} ({}).",
                ctx.service.name,
                self.when(ctx.appointment.starts_at),
                ctx.location.name,
                ctx.location.address
            ),
        )
    }

    /// The receipt, sent to the patient.
    #[must_use]
    pub fn receipt(&self, patient: &User, receipt: &Receipt) -> Email {
        Email {
            to: patient.email.clone(),
            subject: format!("Receipt {} from {}", receipt.receipt_number, self.practice.business_name),
            body: format!(
                "Receipt {}\nDate of treatment: {}\nService: {} ({} minutes)\nAmount: {}\n\
                 Provided by {}, RMT (registration {})\n{}",
                receipt.receipt_number,
                receipt.appointment_date.format("%B %-d, %Y"),
                receipt.service_name,
                receipt.duration_minutes,
                receipt.amount_display(),
                receipt.rmt_name,
                receipt.rmt_registration_number,
                self.practice.address
            ),
            kind: EmailKind::Receipt,
        }
    }

    fn to_patient(
        &self,
        ctx: AppointmentContext<'_>,
        kind: EmailKind,
        subject: &str,
        text: &str,
    ) -> Email {
        Email {
            to: ctx.patient.email.clone(),
            subject: format!("{subject} - {}", self.practice.business_name),
            body: format!("Hi {},\n\n{text}\n\n{}", ctx.patient.first_name, self.signature()),
            kind,
        }
    }

    fn to_rmt(&self, kind: EmailKind, subject: &str, body: &str) -> Option<Email> {
        self.rmt_address().map(|to| Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            kind,
        })
    }

    fn summary(&self, ctx: AppointmentContext<'_>) -> String {
        format!(
            "Patient: {} <{}>\nService: {}\nWhen: {}\nWhere: {}\nStatus: {}",
            ctx.patient.full_name(),
            ctx.patient.email,
            ctx.service.name,
            self.when(ctx.appointment.starts_at),
            ctx.location.name,
            ctx.appointment.status
        )
    }

    fn signature(&self) -> String {
        if self.practice.rmt_name.is_empty() {
            self.practice.business_name.clone()
        } else {
            format!("{}\n{}", self.practice.rmt_name, self.practice.business_name)
        }
    }

    fn when(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .format("%A, %B %-d, %Y at %-I:%M %p")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{AppointmentStatus, Role};

    fn practice() -> PracticeConfig {
        PracticeConfig {
            business_name: "Harbour Massage".to_string(),
            rmt_name: "Alex Rivers".to_string(),
            rmt_registration_number: "M1234".to_string(),
            rmt_email: "alex@harbour.example".to_string(),
            address: "1 Main St".to_string(),
        }
    }

    fn composer() -> Composer {
        Composer::new(practice(), FixedOffset::west_opt(7 * 3600).unwrap())
    }

    fn patient() -> User {
        User {
            id: "p1".to_string(),
            email: "jo@example.com".to_string(),
            password_hash: String::new(),
            role: Role::Patient,
            first_name: "Jo".to_string(),
            last_name: "Smith".to_string(),
            phone: None,
            created_at: Utc::now(),
        }
    }

    fn appointment() -> Appointment {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap();
        Appointment {
            id: "a1".to_string(),
            patient_id: "p1".to_string(),
            location_id: "loc".to_string(),
            service_id: "svc".to_string(),
            starts_at: start,
            duration_minutes: 60,
            status: AppointmentStatus::Requested,
            previous_status: None,
            rescheduling_started_at: None,
            reminder_sent_at: None,
            notes: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn service() -> Service {
        Service {
            id: "svc".to_string(),
            name: "60 minute massage".to_string(),
            description: String::new(),
            duration_minutes: 60,
            price_cents: 12_000,
            active: true,
        }
    }

    fn location() -> Location {
        Location {
            id: "loc".to_string(),
            name: "Harbour Clinic".to_string(),
            address: "1 Main St".to_string(),
            hours: Vec::new(),
            active: true,
        }
    }

    #[test]
    fn test_booking_requested_goes_to_both_sides() {
        let (appt, patient, service, location) = (appointment(), patient(), service(), location());
        let ctx = AppointmentContext {
            appointment: &appt,
            patient: &patient,
            service: &service,
            location: &location,
        };
        let emails = composer().booking_requested(ctx);

        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].to, "jo@example.com");
        assert_eq!(emails[1].to, "alex@harbour.example");
        assert!(emails.iter().all(|e| e.kind == EmailKind::BookingRequested));
    }

    #[test]
    fn test_times_rendered_in_practice_zone() {
        let (appt, patient, service, location) = (appointment(), patient(), service(), location());
        let ctx = AppointmentContext {
            appointment: &appt,
            patient: &patient,
            service: &service,
            location: &location,
        };
        let email = composer().booking_confirmed(ctx);

        assert!(email.body.contains("Monday, March 10, 2025 at 10:00 AM"));
        assert!(email.body.starts_with("Hi Jo,"));
        assert!(email.subject.ends_with("Harbour Massage"));
    }

    #[test]
    fn test_no_rmt_address_skips_rmt_email() {
        let mut practice = practice();
        practice.rmt_email = String::new();
        let composer = Composer::new(practice, FixedOffset::east_opt(0).unwrap());
        assert!(composer.rmt_address().is_none());

        let (appt, patient, service, location) = (appointment(), patient(), service(), location());
        let ctx = AppointmentContext {
            appointment: &appt,
            patient: &patient,
            service: &service,
            location: &location,
        };
        assert!(composer.cancelled(ctx, false).is_empty());
        assert_eq!(composer.booking_requested(ctx).len(), 1);

        let composer = composer.with_fallback_rmt_address(Some("rmt@example.com"));
        assert_eq!(composer.rmt_address(), Some("rmt@example.com"));
    }

    #[test]
    fn test_cancel_by_rmt_notifies_patient() {
        let (appt, patient, service, location) = (appointment(), patient(), service(), location());
        let ctx = AppointmentContext {
            appointment: &appt,
            patient: &patient,
            service: &service,
            location: &location,
        };
        let emails = composer().cancelled(ctx, true);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].to, "jo@example.com");
    }

    #[tokio::test]
    async fn test_dispatch_counts_and_survives_failures() {
        let mailer = RecordingMailer::new();
        let email = Email {
            to: "jo@example.com".to_string(),
            subject: "Hi".to_string(),
            body: "Body".to_string(),
            kind: EmailKind::Reminder,
        };

        assert_eq!(dispatch(&mailer, &[email.clone(), email.clone()]).await, 2);
        assert_eq!(mailer.sent_of_kind(EmailKind::Reminder).len(), 2);

        mailer.set_failing(true);
        assert_eq!(dispatch(&mailer, &[email]).await, 0);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let email = Email {
            to: "jo@example.com".to_string(),
            subject: "Hi".to_string(),
            body: String::new(),
            kind: EmailKind::Receipt,
        };
        assert!(LogMailer.send(&email).await.is_ok());
    }
}
