//! Receipt queries and numbering.

use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, is_constraint_violation, parse_date, parse_ts, Storage};
use crate::error::{Error, Result};
use crate::model::Receipt;

const RECEIPT_COLUMNS: &str = "id, receipt_number, appointment_id, patient_id, patient_name, \
     service_name, duration_minutes, price_cents, appointment_date, issued_at, rmt_name, \
     rmt_registration_number";

impl Storage {
    /// The sequence number the next receipt will carry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn next_receipt_sequence(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM receipts",
            [],
            |row| row.get(0),
        )?)
    }

    /// Store an issued receipt under the given sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the appointment already has a receipt
    /// or the sequence number is taken.
    pub fn insert_receipt(&self, receipt: &Receipt, sequence: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO receipts (id, sequence, receipt_number, appointment_id, patient_id,
                    patient_name, service_name, duration_minutes, price_cents, appointment_date,
                    issued_at, rmt_name, rmt_registration_number)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    receipt.id,
                    sequence,
                    receipt.receipt_number,
                    receipt.appointment_id,
                    receipt.patient_id,
                    receipt.patient_name,
                    receipt.service_name,
                    receipt.duration_minutes,
                    receipt.price_cents,
                    receipt.appointment_date.format("%Y-%m-%d").to_string(),
                    fmt_ts(receipt.issued_at),
                    receipt.rmt_name,
                    receipt.rmt_registration_number,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::conflict("a receipt already exists for this appointment")
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    /// Get a receipt by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_receipt(&self, id: &str) -> Result<Option<Receipt>> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_receipt).optional()?)
    }

    /// The receipt issued for an appointment, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_receipt_for_appointment(&self, appointment_id: &str) -> Result<Option<Receipt>> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE appointment_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [appointment_id], row_to_receipt)
            .optional()?)
    }

    /// Every receipt of a patient, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_receipts_for_patient(&self, patient_id: &str) -> Result<Vec<Receipt>> {
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE patient_id = ?1 ORDER BY sequence DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let receipts = stmt
            .query_map([patient_id], row_to_receipt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(receipts)
    }
}

fn row_to_receipt(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    let appointment_date: String = row.get(8)?;
    let issued_at: String = row.get(9)?;

    Ok(Receipt {
        id: row.get(0)?,
        receipt_number: row.get(1)?,
        appointment_id: row.get(2)?,
        patient_id: row.get(3)?,
        patient_name: row.get(4)?,
        service_name: row.get(5)?,
        duration_minutes: row.get(6)?,
        price_cents: row.get(7)?,
        appointment_date: parse_date(8, &appointment_date)?,
        issued_at: parse_ts(9, &issued_at)?,
        rmt_name: row.get(10)?,
        rmt_registration_number: row.get(11)?,
    })
}
