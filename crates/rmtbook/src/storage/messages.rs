//! Contact message queries.

use rusqlite::{params, Row};

use super::{fmt_ts, parse_ts, Storage};
use crate::error::Result;
use crate::model::Message;

const MESSAGE_COLUMNS: &str = "id, name, email, phone, subject, body, created_at, read";

impl Storage {
    /// Store a contact-form message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages (id, name, email, phone, subject, body, created_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id,
                message.name,
                message.email,
                message.phone,
                message.subject,
                message.body,
                fmt_ts(message.created_at),
                message.read,
            ],
        )?;
        Ok(())
    }

    /// Inbox messages, newest first, limited to `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_messages(&self, unread_only: bool, limit: usize) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE ?1 = 0 OR read = 0
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params![unread_only, limit], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Mark a message as read. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_message_read(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE messages SET read = 1 WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Delete a message. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let created_at: String = row.get(6)?;

    Ok(Message {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        created_at: parse_ts(6, &created_at)?,
        read: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{at, storage};
    use super::*;

    fn message(id: &str, day: u32) -> Message {
        Message {
            id: id.to_string(),
            name: "Jo".to_string(),
            email: "jo@example.com".to_string(),
            phone: None,
            subject: "Hours".to_string(),
            body: "Are you open Saturdays?".to_string(),
            created_at: at(day, 12, 0),
            read: false,
        }
    }

    #[test]
    fn test_insert_and_list_newest_first() {
        let storage = storage();
        storage.insert_message(&message("m1", 1)).unwrap();
        storage.insert_message(&message("m2", 2)).unwrap();

        let ids: Vec<_> = storage
            .list_messages(false, 10)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m2", "m1"]);
        assert_eq!(storage.list_messages(false, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_read_filters_unread() {
        let storage = storage();
        storage.insert_message(&message("m1", 1)).unwrap();
        storage.insert_message(&message("m2", 2)).unwrap();

        assert!(storage.mark_message_read("m1").unwrap());
        assert!(!storage.mark_message_read("missing").unwrap());

        let unread = storage.list_messages(true, 10).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "m2");
        assert_eq!(storage.stats().unwrap().unread_messages, 1);
    }

    #[test]
    fn test_delete() {
        let storage = storage();
        storage.insert_message(&message("m1", 1)).unwrap();

        assert!(storage.delete_message("m1").unwrap());
        assert!(!storage.delete_message("m1").unwrap());
        assert!(storage.list_messages(false, 10).unwrap().is_empty());
    }
}
