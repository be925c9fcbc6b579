//! Locations, their working hours, and the services offered.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::require_text;

/// Opening hours of a location on one weekday, in practice local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Day of the week.
    pub weekday: Weekday,
    /// First bookable minute.
    pub opens: NaiveTime,
    /// No treatment may run past this time.
    pub closes: NaiveTime,
}

/// A place where treatments are offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// Weekly opening hours. A weekday may appear more than once (split shifts).
    pub hours: Vec<WorkingHours>,
    /// Inactive locations are hidden from booking.
    pub active: bool,
}

impl Location {
    /// Opening windows for the given weekday.
    pub fn hours_on(&self, weekday: Weekday) -> impl Iterator<Item = &WorkingHours> {
        self.hours.iter().filter(move |h| h.weekday == weekday)
    }
}

/// Fields supplied when creating or editing a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInput {
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// Weekly opening hours.
    #[serde(default)]
    pub hours: Vec<WorkingHours>,
    /// Whether the location can be booked.
    #[serde(default = "default_active")]
    pub active: bool,
}

impl LocationInput {
    /// Validate and turn the input into a location with the given id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields or inverted opening hours.
    pub fn into_location(self, id: String) -> crate::Result<Location> {
        let name = require_text("name", &self.name)?;
        let address = require_text("address", &self.address)?;
        for window in &self.hours {
            if window.opens >= window.closes {
                return Err(crate::Error::validation(format!(
                    "opening hours on {} must close after they open",
                    window.weekday
                )));
            }
        }
        Ok(Location {
            id,
            name,
            address,
            hours: self.hours,
            active: self.active,
        })
    }
}

/// A bookable treatment type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Unique identifier.
    pub id: String,
    /// Display name, e.g. "60 minute massage".
    pub name: String,
    /// Longer description.
    pub description: String,
    /// Treatment length.
    pub duration_minutes: u32,
    /// Price in cents.
    pub price_cents: i64,
    /// Inactive services are hidden from booking.
    pub active: bool,
}

/// Fields supplied when creating or editing a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInput {
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Treatment length.
    pub duration_minutes: u32,
    /// Price in cents.
    pub price_cents: i64,
    /// Whether the service can be booked.
    #[serde(default = "default_active")]
    pub active: bool,
}

impl ServiceInput {
    /// Validate and turn the input into a service with the given id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name, zero duration, or negative price.
    pub fn into_service(self, id: String) -> crate::Result<Service> {
        let name = require_text("name", &self.name)?;
        if self.duration_minutes == 0 || self.duration_minutes > 8 * 60 {
            return Err(crate::Error::validation(
                "duration_minutes must be between 1 and 480",
            ));
        }
        if self.price_cents < 0 {
            return Err(crate::Error::validation("price_cents cannot be negative"));
        }
        Ok(Service {
            id,
            name,
            description: self.description.trim().to_string(),
            duration_minutes: self.duration_minutes,
            price_cents: self.price_cents,
            active: self.active,
        })
    }
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(weekday: Weekday, opens: u32, closes: u32) -> WorkingHours {
        WorkingHours {
            weekday,
            opens: NaiveTime::from_hms_opt(opens, 0, 0).unwrap(),
            closes: NaiveTime::from_hms_opt(closes, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_location_input_valid() {
        let input = LocationInput {
            name: " Downtown ".to_string(),
            address: "1 Main St".to_string(),
            hours: vec![hours(Weekday::Mon, 9, 17)],
            active: true,
        };
        let location = input.into_location("l1".to_string()).unwrap();
        assert_eq!(location.name, "Downtown");
        assert_eq!(location.hours.len(), 1);
    }

    #[test]
    fn test_location_input_inverted_hours() {
        let input = LocationInput {
            name: "Downtown".to_string(),
            address: "1 Main St".to_string(),
            hours: vec![hours(Weekday::Tue, 17, 9)],
            active: true,
        };
        let err = input.into_location("l1".to_string()).unwrap_err();
        assert!(err.to_string().contains("Tue"));
    }

    #[test]
    fn test_hours_on_split_shift() {
        let location = Location {
            id: "l1".to_string(),
            name: "Clinic".to_string(),
            address: "1 Main St".to_string(),
            hours: vec![
                hours(Weekday::Wed, 9, 12),
                hours(Weekday::Wed, 13, 18),
                hours(Weekday::Thu, 9, 17),
            ],
            active: true,
        };
        assert_eq!(location.hours_on(Weekday::Wed).count(), 2);
        assert_eq!(location.hours_on(Weekday::Sun).count(), 0);
    }

    #[test]
    fn test_service_input_validation() {
        let mut input = ServiceInput {
            name: "Massage".to_string(),
            description: String::new(),
            duration_minutes: 60,
            price_cents: 12_000,
            active: true,
        };
        assert!(input.clone().into_service("s1".to_string()).is_ok());

        input.duration_minutes = 0;
        assert!(input.clone().into_service("s1".to_string()).is_err());

        input.duration_minutes = 60;
        input.price_cents = -1;
        assert!(input.into_service("s1".to_string()).is_err());
    }

    #[test]
    fn test_location_input_active_defaults_true() {
        let input: LocationInput =
            serde_json::from_str(r#"{"name":"A","address":"B"}"#).unwrap();
        assert!(input.active);
        assert!(input.hours.is_empty());
    }

    #[test]
    fn test_working_hours_json_shape() {
        let json = serde_json::to_string(&hours(Weekday::Fri, 9, 17)).unwrap();
        assert_eq!(
            json,
            r#"{"weekday":"Fri","opens":"09:00:00","closes":"17:00:00"}"#
        );
    }
}
