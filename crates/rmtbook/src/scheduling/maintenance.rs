//! Periodic housekeeping: stale rescheduling resets and reminder emails.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::booking::{restore_from_rescheduling, Scheduler};
use crate::config::Config;
use crate::error::Result;
use crate::model::{Appointment, Email};
use crate::notify::{AppointmentContext, Mailer};
use crate::storage::Storage;

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderSummary {
    /// Appointments that needed a reminder.
    pub due: usize,
    /// Reminders delivered and recorded.
    pub sent: usize,
    /// Reminders the mailer rejected; retried on the next pass.
    pub failed: usize,
}

/// Put every appointment whose rescheduling attempt began more than
/// `stale_rescheduling_minutes` before `now` back in its previous status.
///
/// Returns the appointments that were reset.
///
/// # Errors
///
/// Returns an error if storage fails; no appointment is reset in that case.
pub fn reset_stale_rescheduling(
    storage: &Storage,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Vec<Appointment>> {
    let cutoff = now - config.scheduling.stale_rescheduling_after();

    storage.in_transaction(|storage| {
        let mut reset = Vec::new();
        for mut appointment in storage.list_stale_rescheduling(cutoff)? {
            let restored = restore_from_rescheduling(&mut appointment, now)?;
            storage.update_appointment(&appointment)?;
            info!(appointment = %appointment.id, status = %restored, "Reset stale rescheduling");
            reset.push(appointment);
        }
        Ok(reset)
    })
}

/// Email every booked appointment starting within
/// `(now, now + reminder_lead_hours]` that has not had a reminder yet.
///
/// A reminder is recorded only once the mailer accepts it, so failures are
/// retried on the next pass. The storage lock is not held while sending; an
/// appointment moved or cancelled meanwhile keeps no record of the reminder,
/// so its new time gets one of its own.
///
/// # Errors
///
/// Returns an error if storage fails.
pub async fn send_due_reminders(
    storage: &Mutex<Storage>,
    config: &Config,
    mailer: &dyn Mailer,
    now: DateTime<Utc>,
) -> Result<ReminderSummary> {
    let until = now + config.scheduling.reminder_lead();

    let pending: Vec<(Appointment, Email)> = {
        let storage = storage.lock().await;
        let scheduler = Scheduler::new(&storage, config);
        let composer = scheduler.composer()?;
        let mut pending = Vec::new();
        for appointment in storage.list_reminders_due(now, until)? {
            let (patient, service, location) = scheduler.parts(&appointment)?;
            let email = composer.reminder(AppointmentContext {
                appointment: &appointment,
                patient: &patient,
                service: &service,
                location: &location,
            });
            pending.push((appointment, email));
        }
        pending
    };

    let mut summary = ReminderSummary {
        due: pending.len(),
        ..ReminderSummary::default()
    };
    for (appointment, email) in pending {
        match mailer.send(&email).await {
            Ok(()) => {
                let recorded = storage.lock().await.mark_reminder_sent(
                    &appointment.id,
                    appointment.starts_at,
                    now,
                )?;
                if !recorded {
                    debug!(appointment = %appointment.id, "Appointment changed while reminding");
                }
                summary.sent += 1;
            }
            Err(e) => {
                warn!(appointment = %appointment.id, error = %e, "Reminder not sent");
                summary.failed += 1;
            }
        }
    }

    if summary.due > 0 {
        info!(
            due = summary.due,
            sent = summary.sent,
            failed = summary.failed,
            "Reminder pass finished"
        );
    }
    Ok(summary)
}
