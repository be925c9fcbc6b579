//! Patient health histories and their yearly renewal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{is_valid_phone, require_text};

/// Intake forms must be renewed this often.
pub const RENEWAL_PERIOD_DAYS: i64 = 365;

/// A patient's health-history intake form.
///
/// Submissions are append-only; the newest one is the patient's current record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthHistory {
    /// Unique identifier.
    pub id: String,
    /// Patient who submitted the form.
    pub patient_id: String,
    /// Current and past medical conditions.
    pub conditions: String,
    /// Current medications.
    pub medications: String,
    /// Known allergies.
    pub allergies: String,
    /// Past surgeries and injuries.
    pub surgeries: String,
    /// Emergency contact name.
    pub emergency_contact_name: String,
    /// Emergency contact phone number.
    pub emergency_contact_phone: String,
    /// Whether the patient consented to treatment.
    pub consent_to_treatment: bool,
    /// When the form was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl HealthHistory {
    /// Whether this record is older than the renewal period at `now`.
    #[must_use]
    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        now - self.submitted_at >= Duration::days(RENEWAL_PERIOD_DAYS)
    }
}

/// Whether a patient whose latest form is `latest` must fill one in again.
#[must_use]
pub fn renewal_due(latest: Option<&HealthHistory>, now: DateTime<Utc>) -> bool {
    latest.is_none_or(|h| h.needs_renewal(now))
}

/// The fields a patient submits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthHistoryInput {
    /// Current and past medical conditions.
    pub conditions: String,
    /// Current medications.
    pub medications: String,
    /// Known allergies.
    pub allergies: String,
    /// Past surgeries and injuries.
    pub surgeries: String,
    /// Emergency contact name.
    pub emergency_contact_name: String,
    /// Emergency contact phone number.
    pub emergency_contact_phone: String,
    /// Whether the patient consents to treatment.
    pub consent_to_treatment: bool,
}

impl HealthHistoryInput {
    /// Validate the submission and stamp it.
    ///
    /// # Errors
    ///
    /// Returns a validation error if consent is missing or the emergency
    /// contact is incomplete.
    pub fn into_record(
        self,
        id: String,
        patient_id: String,
        submitted_at: DateTime<Utc>,
    ) -> crate::Result<HealthHistory> {
        if !self.consent_to_treatment {
            return Err(crate::Error::validation(
                "consent to treatment is required",
            ));
        }
        let emergency_contact_name =
            require_text("emergency_contact_name", &self.emergency_contact_name)?;
        if !is_valid_phone(&self.emergency_contact_phone) {
            return Err(crate::Error::validation(
                "emergency_contact_phone is not a valid phone number",
            ));
        }

        Ok(HealthHistory {
            id,
            patient_id,
            conditions: self.conditions.trim().to_string(),
            medications: self.medications.trim().to_string(),
            allergies: self.allergies.trim().to_string(),
            surgeries: self.surgeries.trim().to_string(),
            emergency_contact_name,
            emergency_contact_phone: self.emergency_contact_phone.trim().to_string(),
            consent_to_treatment: true,
            submitted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> HealthHistoryInput {
        HealthHistoryInput {
            conditions: "lower back pain".to_string(),
            emergency_contact_name: "Sam".to_string(),
            emergency_contact_phone: "416-555-0100".to_string(),
            consent_to_treatment: true,
            ..HealthHistoryInput::default()
        }
    }

    #[test]
    fn test_into_record() {
        let now = Utc::now();
        let record = valid_input()
            .into_record("h1".to_string(), "p1".to_string(), now)
            .unwrap();
        assert_eq!(record.patient_id, "p1");
        assert_eq!(record.submitted_at, now);
        assert!(record.consent_to_treatment);
    }

    #[test]
    fn test_consent_required() {
        let mut input = valid_input();
        input.consent_to_treatment = false;
        let err = input
            .into_record("h1".to_string(), "p1".to_string(), Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("consent"));
    }

    #[test]
    fn test_emergency_phone_checked() {
        let mut input = valid_input();
        input.emergency_contact_phone = "nope".to_string();
        assert!(input
            .into_record("h1".to_string(), "p1".to_string(), Utc::now())
            .is_err());
    }

    #[test]
    fn test_needs_renewal_boundary() {
        let now = Utc::now();
        let mut record = valid_input()
            .into_record("h1".to_string(), "p1".to_string(), now)
            .unwrap();

        record.submitted_at = now - Duration::days(364);
        assert!(!record.needs_renewal(now));

        record.submitted_at = now - Duration::days(RENEWAL_PERIOD_DAYS);
        assert!(record.needs_renewal(now));
    }

    #[test]
    fn test_renewal_due_without_record() {
        assert!(renewal_due(None, Utc::now()));
    }

    #[test]
    fn test_renewal_due_with_fresh_record() {
        let now = Utc::now();
        let record = valid_input()
            .into_record("h1".to_string(), "p1".to_string(), now)
            .unwrap();
        assert!(!renewal_due(Some(&record), now));
    }
}
