//! Appointment queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, parse_opt_ts, parse_text, parse_ts, Storage};
use crate::error::{Error, Result};
use crate::model::{Appointment, AppointmentStatus};

const APPOINTMENT_COLUMNS: &str = "id, patient_id, location_id, service_id, starts_at, \
     duration_minutes, status, previous_status, rescheduling_started_at, reminder_sent_at, \
     notes, created_at, updated_at";

/// Statuses that hold a time slot, as an SQL list.
const BLOCKING_STATUSES: &str = "('requested', 'booked', 'rescheduling')";

impl Storage {
    /// Store a new appointment.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a referenced
    /// patient, location, or service does not exist.
    pub fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        self.conn.execute(
            "INSERT INTO appointments (id, patient_id, location_id, service_id, starts_at, ends_at,
                duration_minutes, status, previous_status, rescheduling_started_at,
                reminder_sent_at, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                appointment.id,
                appointment.patient_id,
                appointment.location_id,
                appointment.service_id,
                fmt_ts(appointment.starts_at),
                fmt_ts(appointment.ends_at()),
                appointment.duration_minutes,
                appointment.status.as_str(),
                appointment.previous_status.map(AppointmentStatus::as_str),
                appointment.rescheduling_started_at.map(fmt_ts),
                appointment.reminder_sent_at.map(fmt_ts),
                appointment.notes,
                fmt_ts(appointment.created_at),
                fmt_ts(appointment.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Write every mutable field of an existing appointment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no appointment has that ID.
    pub fn update_appointment(&self, appointment: &Appointment) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE appointments SET
                location_id = ?2, service_id = ?3, starts_at = ?4, ends_at = ?5,
                duration_minutes = ?6, status = ?7, previous_status = ?8,
                rescheduling_started_at = ?9, reminder_sent_at = ?10, notes = ?11,
                updated_at = ?12
             WHERE id = ?1",
            params![
                appointment.id,
                appointment.location_id,
                appointment.service_id,
                fmt_ts(appointment.starts_at),
                fmt_ts(appointment.ends_at()),
                appointment.duration_minutes,
                appointment.status.as_str(),
                appointment.previous_status.map(AppointmentStatus::as_str),
                appointment.rescheduling_started_at.map(fmt_ts),
                appointment.reminder_sent_at.map(fmt_ts),
                appointment.notes,
                fmt_ts(appointment.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("appointment", appointment.id.clone()));
        }
        Ok(())
    }

    /// Get an appointment by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_appointment(&self, id: &str) -> Result<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], row_to_appointment)
            .optional()?)
    }

    /// All appointments of one patient, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_appointments_for_patient(&self, patient_id: &str) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE patient_id = ?1
             ORDER BY starts_at DESC"
        );
        self.query_appointments(&sql, params![patient_id])
    }

    /// Appointments starting in `[from, to)`, oldest first, optionally of one status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_appointments_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE starts_at >= ?1 AND starts_at < ?2 AND (?3 IS NULL OR status = ?3)
             ORDER BY starts_at"
        );
        self.query_appointments(
            &sql,
            params![fmt_ts(from), fmt_ts(to), status.map(AppointmentStatus::as_str)],
        )
    }

    /// Slot-holding appointments whose time intersects `[from, to)`.
    ///
    /// `exclude_id` leaves one appointment out, so a rescheduling
    /// appointment does not block its own new time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_blocking_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_id: Option<&str>,
    ) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE status IN {BLOCKING_STATUSES}
               AND starts_at < ?2 AND ends_at > ?1
               AND (?3 IS NULL OR id != ?3)
             ORDER BY starts_at"
        );
        self.query_appointments(&sql, params![fmt_ts(from), fmt_ts(to), exclude_id])
    }

    /// Appointments left in rescheduling since before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_stale_rescheduling(&self, cutoff: DateTime<Utc>) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE status = 'rescheduling' AND rescheduling_started_at < ?1
             ORDER BY rescheduling_started_at"
        );
        self.query_appointments(&sql, params![fmt_ts(cutoff)])
    }

    /// Booked appointments in `(now, until]` that have not had a reminder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_reminders_due(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE status = 'booked' AND reminder_sent_at IS NULL
               AND starts_at > ?1 AND starts_at <= ?2
             ORDER BY starts_at"
        );
        self.query_appointments(&sql, params![fmt_ts(now), fmt_ts(until)])
    }

    /// Record that a reminder for the appointment starting at `starts_at`
    /// went out.
    ///
    /// Returns `false`, recording nothing, if the appointment is no longer
    /// booked at that time without a reminder. That happens when it was
    /// cancelled or moved while the email was being sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_reminder_sent(
        &self,
        id: &str,
        starts_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE appointments SET reminder_sent_at = ?3
             WHERE id = ?1 AND starts_at = ?2 AND status = 'booked'
               AND reminder_sent_at IS NULL",
            params![id, fmt_ts(starts_at), fmt_ts(sent_at)],
        )?;
        Ok(changed > 0)
    }

    fn query_appointments(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let appointments = stmt
            .query_map(params, row_to_appointment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(appointments)
    }
}

fn row_to_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let starts_at: String = row.get(4)?;
    let status: String = row.get(6)?;
    let previous_status: Option<String> = row.get(7)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        location_id: row.get(2)?,
        service_id: row.get(3)?,
        starts_at: parse_ts(4, &starts_at)?,
        duration_minutes: row.get(5)?,
        status: parse_text(6, &status)?,
        previous_status: previous_status
            .map(|s| parse_text(7, &s))
            .transpose()?,
        rescheduling_started_at: parse_opt_ts(8, row.get(8)?)?,
        reminder_sent_at: parse_opt_ts(9, row.get(9)?)?,
        notes: row.get(10)?,
        created_at: parse_ts(11, &created_at)?,
        updated_at: parse_ts(12, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{appointment, at, seeded};
    use crate::model::AppointmentStatus::{Booked, Cancelled, Completed, Requested, Rescheduling};

    #[test]
    fn test_insert_and_get() {
        let storage = seeded();
        let appt = appointment("a1", "p1", at(10, 10, 0), Requested);
        storage.insert_appointment(&appt).unwrap();

        assert_eq!(storage.get_appointment("a1").unwrap(), Some(appt));
        assert!(storage.get_appointment("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_unknown_patient() {
        let storage = seeded();
        let appt = appointment("a1", "ghost", at(10, 10, 0), Requested);
        assert!(storage.insert_appointment(&appt).is_err());
    }

    #[test]
    fn test_update_appointment() {
        let storage = seeded();
        let mut appt = appointment("a1", "p1", at(10, 10, 0), Booked);
        storage.insert_appointment(&appt).unwrap();

        appt.status = Rescheduling;
        appt.previous_status = Some(Booked);
        appt.rescheduling_started_at = Some(at(5, 8, 0));
        appt.updated_at = at(5, 8, 0);
        storage.update_appointment(&appt).unwrap();

        assert_eq!(storage.get_appointment("a1").unwrap(), Some(appt));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let storage = seeded();
        let appt = appointment("a1", "p1", at(10, 10, 0), Booked);
        assert!(storage.update_appointment(&appt).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_for_patient_newest_first() {
        let storage = seeded();
        storage
            .insert_appointment(&appointment("early", "p1", at(10, 10, 0), Completed))
            .unwrap();
        storage
            .insert_appointment(&appointment("late", "p1", at(12, 10, 0), Booked))
            .unwrap();

        let ids: Vec<_> = storage
            .list_appointments_for_patient("p1")
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["late", "early"]);
    }

    #[test]
    fn test_list_between_with_status_filter() {
        let storage = seeded();
        storage
            .insert_appointment(&appointment("a1", "p1", at(10, 10, 0), Booked))
            .unwrap();
        storage
            .insert_appointment(&appointment("a2", "p1", at(10, 14, 0), Cancelled))
            .unwrap();
        storage
            .insert_appointment(&appointment("a3", "p1", at(11, 10, 0), Booked))
            .unwrap();

        let day = storage
            .list_appointments_between(at(10, 0, 0), at(11, 0, 0), None)
            .unwrap();
        assert_eq!(day.len(), 2);

        let booked = storage
            .list_appointments_between(at(10, 0, 0), at(12, 0, 0), Some(Booked))
            .unwrap();
        let ids: Vec<_> = booked.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
    }

    #[test]
    fn test_blocking_between_ignores_inactive_and_excluded() {
        let storage = seeded();
        storage
            .insert_appointment(&appointment("held", "p1", at(10, 10, 0), Rescheduling))
            .unwrap();
        storage
            .insert_appointment(&appointment("gone", "p1", at(10, 10, 0), Cancelled))
            .unwrap();
        storage
            .insert_appointment(&appointment("done", "p1", at(10, 10, 0), Completed))
            .unwrap();

        let blocking = storage
            .list_blocking_between(at(10, 10, 30), at(10, 11, 30), None)
            .unwrap();
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].id, "held");

        assert!(storage
            .list_blocking_between(at(10, 10, 30), at(10, 11, 30), Some("held"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_blocking_between_is_half_open() {
        let storage = seeded();
        storage
            .insert_appointment(&appointment("a1", "p1", at(10, 10, 0), Booked))
            .unwrap();

        // 10:00-11:00 does not touch 11:00-12:00 or 9:00-10:00
        assert!(storage
            .list_blocking_between(at(10, 11, 0), at(10, 12, 0), None)
            .unwrap()
            .is_empty());
        assert!(storage
            .list_blocking_between(at(10, 9, 0), at(10, 10, 0), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_list_stale_rescheduling() {
        let storage = seeded();
        let mut old = appointment("old", "p1", at(10, 10, 0), Rescheduling);
        old.rescheduling_started_at = Some(at(5, 8, 0));
        let mut fresh = appointment("fresh", "p1", at(11, 10, 0), Rescheduling);
        fresh.rescheduling_started_at = Some(at(5, 9, 30));
        storage.insert_appointment(&old).unwrap();
        storage.insert_appointment(&fresh).unwrap();

        let stale = storage.list_stale_rescheduling(at(5, 9, 0)).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "old");
    }

    #[test]
    fn test_reminders_due_and_mark_sent() {
        let storage = seeded();
        storage
            .insert_appointment(&appointment("soon", "p1", at(11, 10, 0), Booked))
            .unwrap();
        storage
            .insert_appointment(&appointment("pending", "p1", at(11, 11, 0), Requested))
            .unwrap();
        storage
            .insert_appointment(&appointment("later", "p1", at(20, 10, 0), Booked))
            .unwrap();

        let now = at(10, 9, 0);
        let due = storage.list_reminders_due(now, at(12, 9, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "soon");

        assert!(storage
            .mark_reminder_sent("soon", at(11, 10, 0), now)
            .unwrap());
        assert!(storage
            .list_reminders_due(now, at(12, 9, 0))
            .unwrap()
            .is_empty());
        assert_eq!(
            storage.get_appointment("soon").unwrap().unwrap().reminder_sent_at,
            Some(now)
        );
        // Already recorded
        assert!(!storage
            .mark_reminder_sent("soon", at(11, 10, 0), at(10, 10, 0))
            .unwrap());
    }

    #[test]
    fn test_mark_reminder_sent_requires_unchanged_booking() {
        let storage = seeded();
        storage
            .insert_appointment(&appointment("moved", "p1", at(11, 14, 0), Booked))
            .unwrap();
        storage
            .insert_appointment(&appointment("cancelled", "p1", at(11, 10, 0), Cancelled))
            .unwrap();
        let now = at(10, 9, 0);

        // Reminded for 10:00, but the appointment now starts at 14:00
        assert!(!storage
            .mark_reminder_sent("moved", at(11, 10, 0), now)
            .unwrap());
        assert!(!storage
            .mark_reminder_sent("cancelled", at(11, 10, 0), now)
            .unwrap());
        assert!(!storage
            .mark_reminder_sent("missing", at(11, 10, 0), now)
            .unwrap());

        let moved = storage.get_appointment("moved").unwrap().unwrap();
        assert!(moved.reminder_sent_at.is_none());
        assert_eq!(storage.list_reminders_due(now, at(12, 9, 0)).unwrap().len(), 1);
    }
}
