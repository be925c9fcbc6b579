//! `SQLite` schema definitions for rmtbook.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`YYYY-MM-DDTHH:MM:SSZ`) so that text comparison orders them correctly.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    phone TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the locations table.
///
/// Working hours are stored as a JSON array.
pub const CREATE_LOCATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS locations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    hours TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1
)
";

/// SQL statement to create the services table.
pub const CREATE_SERVICES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS services (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    duration_minutes INTEGER NOT NULL,
    price_cents INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
)
";

/// SQL statement to create the appointments table.
pub const CREATE_APPOINTMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES users(id),
    location_id TEXT NOT NULL REFERENCES locations(id),
    service_id TEXT NOT NULL REFERENCES services(id),
    starts_at TEXT NOT NULL,
    ends_at TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    status TEXT NOT NULL,
    previous_status TEXT,
    rescheduling_started_at TEXT,
    reminder_sent_at TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create an index on appointment start for range queries.
pub const CREATE_APPOINTMENTS_START_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_appointments_starts_at ON appointments(starts_at)
";

/// SQL statement to create an index on appointment status for the jobs.
pub const CREATE_APPOINTMENTS_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status)
";

/// SQL statement to create an index on appointment patient.
pub const CREATE_APPOINTMENTS_PATIENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id)
";

/// SQL statement to create the health histories table.
pub const CREATE_HEALTH_HISTORIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS health_histories (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES users(id),
    conditions TEXT NOT NULL,
    medications TEXT NOT NULL,
    allergies TEXT NOT NULL,
    surgeries TEXT NOT NULL,
    emergency_contact_name TEXT NOT NULL,
    emergency_contact_phone TEXT NOT NULL,
    consent_to_treatment INTEGER NOT NULL,
    submitted_at TEXT NOT NULL
)
";

/// SQL statement to create an index on health history patient.
pub const CREATE_HEALTH_HISTORIES_PATIENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_health_histories_patient
    ON health_histories(patient_id, submitted_at DESC)
";

/// SQL statement to create the receipts table.
///
/// `sequence` backs the human-facing receipt number.
pub const CREATE_RECEIPTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS receipts (
    id TEXT PRIMARY KEY,
    sequence INTEGER NOT NULL UNIQUE,
    receipt_number TEXT NOT NULL UNIQUE,
    appointment_id TEXT NOT NULL UNIQUE REFERENCES appointments(id),
    patient_id TEXT NOT NULL REFERENCES users(id),
    patient_name TEXT NOT NULL,
    service_name TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    price_cents INTEGER NOT NULL,
    appointment_date TEXT NOT NULL,
    issued_at TEXT NOT NULL,
    rmt_name TEXT NOT NULL,
    rmt_registration_number TEXT NOT NULL
)
";

/// SQL statement to create the messages table.
pub const CREATE_MESSAGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_LOCATIONS_TABLE,
    CREATE_SERVICES_TABLE,
    CREATE_APPOINTMENTS_TABLE,
    CREATE_APPOINTMENTS_START_INDEX,
    CREATE_APPOINTMENTS_STATUS_INDEX,
    CREATE_APPOINTMENTS_PATIENT_INDEX,
    CREATE_HEALTH_HISTORIES_TABLE,
    CREATE_HEALTH_HISTORIES_PATIENT_INDEX,
    CREATE_RECEIPTS_TABLE,
    CREATE_MESSAGES_TABLE,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_users_email_unique() {
        assert!(CREATE_USERS_TABLE.contains("email TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_one_receipt_per_appointment() {
        assert!(CREATE_RECEIPTS_TABLE.contains("appointment_id TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_appointments_track_rescheduling() {
        assert!(CREATE_APPOINTMENTS_TABLE.contains("previous_status TEXT"));
        assert!(CREATE_APPOINTMENTS_TABLE.contains("rescheduling_started_at TEXT"));
        assert!(CREATE_APPOINTMENTS_TABLE.contains("reminder_sent_at TEXT"));
    }
}
