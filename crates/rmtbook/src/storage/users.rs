//! Account queries.

use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, is_constraint_violation, parse_text, parse_ts, Storage};
use crate::error::{Error, Result};
use crate::model::{Role, User};

const USER_COLUMNS: &str =
    "id, email, password_hash, role, first_name, last_name, phone, created_at";

impl Storage {
    /// Store a new account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the email is already registered.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (id, email, password_hash, role, first_name, last_name, phone, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id,
                    user.email,
                    user.password_hash,
                    user.role.to_string(),
                    user.first_name,
                    user.last_name,
                    user.phone,
                    fmt_ts(user.created_at),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::conflict("an account with this email already exists")
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_user).optional()?)
    }

    /// Get an account by its normalized email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        Ok(self.conn.query_row(&sql, [email], row_to_user).optional()?)
    }

    /// List patient accounts ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_patients(&self) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = 'patient'
             ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Update the editable profile fields of an account.
    ///
    /// Returns `false` if no account has that ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_profile(
        &self,
        id: &str,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE users SET first_name = ?2, last_name = ?3, phone = ?4 WHERE id = ?1",
            params![id, first_name, last_name, phone],
        )?;
        Ok(changed > 0)
    }

    /// Replace the password hash of an account.
    ///
    /// Returns `false` if no account has that ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1",
            params![id, password_hash],
        )?;
        Ok(changed > 0)
    }

    /// Count accounts with the given role.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_users(&self, role: Role) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?1",
            [role.to_string()],
            |row| row.get(0),
        )?)
    }

    /// The practitioner account, if one has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_rmt(&self) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = 'rmt' ORDER BY created_at LIMIT 1"
        );
        Ok(self.conn.query_row(&sql, [], row_to_user).optional()?)
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    let created_at: String = row.get(7)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: parse_text(3, &role)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        phone: row.get(6)?,
        created_at: parse_ts(7, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{storage, user};
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let storage = storage();
        let jo = user("jo", Role::Patient);
        storage.insert_user(&jo).unwrap();

        assert_eq!(storage.get_user("jo").unwrap(), Some(jo.clone()));
        assert_eq!(
            storage.get_user_by_email("jo@example.com").unwrap(),
            Some(jo)
        );
        assert!(storage.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let storage = storage();
        storage.insert_user(&user("jo", Role::Patient)).unwrap();

        let mut twin = user("other", Role::Patient);
        twin.email = "jo@example.com".to_string();
        let err = storage.insert_user(&twin).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_list_patients_excludes_rmt_and_sorts() {
        let storage = storage();
        let mut b = user("b", Role::Patient);
        b.last_name = "Brown".to_string();
        let mut a = user("a", Role::Patient);
        a.last_name = "adams".to_string();
        storage.insert_user(&b).unwrap();
        storage.insert_user(&a).unwrap();
        storage.insert_user(&user("rmt", Role::Rmt)).unwrap();

        let ids: Vec<_> = storage
            .list_patients()
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_update_profile_and_password() {
        let storage = storage();
        storage.insert_user(&user("jo", Role::Patient)).unwrap();

        assert!(storage
            .update_profile("jo", "Joanne", "Smith", Some("250-555-0100"))
            .unwrap());
        assert!(storage.update_password_hash("jo", "new-hash").unwrap());
        assert!(!storage.update_password_hash("nobody", "x").unwrap());

        let jo = storage.get_user("jo").unwrap().unwrap();
        assert_eq!(jo.full_name(), "Joanne Smith");
        assert_eq!(jo.phone.as_deref(), Some("250-555-0100"));
        assert_eq!(jo.password_hash, "new-hash");
    }

    #[test]
    fn test_count_and_get_rmt() {
        let storage = storage();
        assert!(storage.get_rmt().unwrap().is_none());

        storage.insert_user(&user("p", Role::Patient)).unwrap();
        storage.insert_user(&user("rmt", Role::Rmt)).unwrap();

        assert_eq!(storage.count_users(Role::Patient).unwrap(), 1);
        assert_eq!(storage.count_users(Role::Rmt).unwrap(), 1);
        assert_eq!(storage.get_rmt().unwrap().unwrap().id, "rmt");
    }
}
