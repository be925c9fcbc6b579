//! Location and service queries.

use rusqlite::{params, OptionalExtension, Row};

use super::{conversion_error, Storage};
use crate::error::Result;
use crate::model::{Location, Service, WorkingHours};

const LOCATION_COLUMNS: &str = "id, name, address, hours, active";
const SERVICE_COLUMNS: &str = "id, name, description, duration_minutes, price_cents, active";

impl Storage {
    /// Insert a location or replace the one with the same ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_location(&self, location: &Location) -> Result<()> {
        let hours = serde_json::to_string(&location.hours)?;
        self.conn.execute(
            "INSERT INTO locations (id, name, address, hours, active)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                hours = excluded.hours,
                active = excluded.active",
            params![
                location.id,
                location.name,
                location.address,
                hours,
                location.active
            ],
        )?;
        Ok(())
    }

    /// Get a location by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_location(&self, id: &str) -> Result<Option<Location>> {
        let sql = format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_location).optional()?)
    }

    /// List locations by name, optionally only the active ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_locations(&self, active_only: bool) -> Result<Vec<Location>> {
        let sql = format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE ?1 = 0 OR active = 1 ORDER BY name"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let locations = stmt
            .query_map([active_only], row_to_location)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    /// Stop offering a location for new bookings. Returns false if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn deactivate_location(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE locations SET active = 0 WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Insert a service or replace the one with the same ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_service(&self, service: &Service) -> Result<()> {
        self.conn.execute(
            "INSERT INTO services (id, name, description, duration_minutes, price_cents, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                duration_minutes = excluded.duration_minutes,
                price_cents = excluded.price_cents,
                active = excluded.active",
            params![
                service.id,
                service.name,
                service.description,
                service.duration_minutes,
                service.price_cents,
                service.active
            ],
        )?;
        Ok(())
    }

    /// Get a service by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_service(&self, id: &str) -> Result<Option<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_service).optional()?)
    }

    /// List services by duration then name, optionally only the active ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_services(&self, active_only: bool) -> Result<Vec<Service>> {
        let sql = format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE ?1 = 0 OR active = 1
             ORDER BY duration_minutes, name"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let services = stmt
            .query_map([active_only], row_to_service)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(services)
    }

    /// Stop offering a service for new bookings. Returns false if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn deactivate_service(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE services SET active = 0 WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }
}

fn row_to_location(row: &Row<'_>) -> rusqlite::Result<Location> {
    let hours: String = row.get(3)?;
    let hours: Vec<WorkingHours> =
        serde_json::from_str(&hours).map_err(|e| conversion_error(3, e))?;

    Ok(Location {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        hours,
        active: row.get(4)?,
    })
}

fn row_to_service(row: &Row<'_>) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        duration_minutes: row.get(3)?,
        price_cents: row.get(4)?,
        active: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{location, service, storage};

    #[test]
    fn test_location_round_trip_keeps_hours() {
        let storage = storage();
        let clinic = location();
        storage.upsert_location(&clinic).unwrap();

        let loaded = storage.get_location("loc").unwrap().unwrap();
        assert_eq!(loaded, clinic);
        assert_eq!(loaded.hours.len(), 5);
    }

    #[test]
    fn test_upsert_location_updates() {
        let storage = storage();
        let mut clinic = location();
        storage.upsert_location(&clinic).unwrap();

        clinic.name = "Downtown".to_string();
        clinic.active = false;
        storage.upsert_location(&clinic).unwrap();

        assert_eq!(storage.list_locations(false).unwrap().len(), 1);
        assert!(storage.list_locations(true).unwrap().is_empty());
        assert_eq!(
            storage.get_location("loc").unwrap().unwrap().name,
            "Downtown"
        );
    }

    #[test]
    fn test_services_filter_inactive() {
        let storage = storage();
        let massage = service();
        let mut retired = service();
        retired.id = "old".to_string();
        retired.active = false;
        storage.upsert_service(&massage).unwrap();
        storage.upsert_service(&retired).unwrap();

        assert_eq!(storage.list_services(false).unwrap().len(), 2);
        let active = storage.list_services(true).unwrap();
        assert_eq!(active, vec![massage]);
        assert!(storage.get_service("missing").unwrap().is_none());
    }

    #[test]
    fn test_deactivate_offerings() {
        let storage = storage();
        storage.upsert_location(&location()).unwrap();
        storage.upsert_service(&service()).unwrap();

        assert!(storage.deactivate_location("loc").unwrap());
        assert!(storage.deactivate_service("svc").unwrap());
        assert!(!storage.deactivate_service("missing").unwrap());

        assert!(!storage.get_location("loc").unwrap().unwrap().active);
        assert!(storage.list_services(true).unwrap().is_empty());
    }
}
