//! Health history queries.

use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, parse_ts, Storage};
use crate::error::Result;
use crate::model::HealthHistory;

const HEALTH_HISTORY_COLUMNS: &str = "id, patient_id, conditions, medications, allergies, \
     surgeries, emergency_contact_name, emergency_contact_phone, consent_to_treatment, submitted_at";

impl Storage {
    /// Store a submitted intake form. Earlier submissions are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_health_history(&self, history: &HealthHistory) -> Result<()> {
        self.conn.execute(
            "INSERT INTO health_histories (id, patient_id, conditions, medications, allergies,
                surgeries, emergency_contact_name, emergency_contact_phone,
                consent_to_treatment, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                history.id,
                history.patient_id,
                history.conditions,
                history.medications,
                history.allergies,
                history.surgeries,
                history.emergency_contact_name,
                history.emergency_contact_phone,
                history.consent_to_treatment,
                fmt_ts(history.submitted_at),
            ],
        )?;
        Ok(())
    }

    /// The most recent intake form of a patient.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_health_history(&self, patient_id: &str) -> Result<Option<HealthHistory>> {
        let sql = format!(
            "SELECT {HEALTH_HISTORY_COLUMNS} FROM health_histories WHERE patient_id = ?1
             ORDER BY submitted_at DESC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, [patient_id], row_to_health_history)
            .optional()?)
    }

    /// Every intake form of a patient, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_health_histories(&self, patient_id: &str) -> Result<Vec<HealthHistory>> {
        let sql = format!(
            "SELECT {HEALTH_HISTORY_COLUMNS} FROM health_histories WHERE patient_id = ?1
             ORDER BY submitted_at DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let histories = stmt
            .query_map([patient_id], row_to_health_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(histories)
    }
}

fn row_to_health_history(row: &Row<'_>) -> rusqlite::Result<HealthHistory> {
    let submitted_at: String = row.get(9)?;

    Ok(HealthHistory {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        conditions: row.get(2)?,
        medications: row.get(3)?,
        allergies: row.get(4)?,
        surgeries: row.get(5)?,
        emergency_contact_name: row.get(6)?,
        emergency_contact_phone: row.get(7)?,
        consent_to_treatment: row.get(8)?,
        submitted_at: parse_ts(9, &submitted_at)?,
    })
}
