//! CRUD operations for [`Chat`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use dropwatch_shared::ChatId;

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::Chat;

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert a chat or refresh its name, last-seen time and project tag.
    ///
    /// An upsert rather than `INSERT OR REPLACE`: replacing would delete the
    /// row and trip the foreign key held by `messages`.
    pub fn upsert_chat(
        &self,
        chat_id: &ChatId,
        name: &str,
        last_message_at: DateTime<Utc>,
        project_name: Option<&str>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (chat_id, name, last_message_at, project_name)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET
                 name = excluded.name,
                 last_message_at = excluded.last_message_at,
                 project_name = excluded.project_name",
            params![
                chat_id.as_str(),
                name,
                encode_ts(&last_message_at),
                project_name.filter(|p| !p.is_empty()),
            ],
        )?;

        tracing::debug!(chat = %chat_id, name, project = ?project_name, "stored chat");
        Ok(())
    }

    /// Create a placeholder row so that a message insert never fails on the
    /// foreign key. Existing rows are left alone.
    pub(crate) fn ensure_chat(&self, chat_id: &ChatId, seen_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO chats (chat_id, name, last_message_at, project_name)
             VALUES (?1, '', ?2, NULL)",
            params![chat_id.as_str(), encode_ts(&seen_at)],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat.
    pub fn get_chat(&self, chat_id: &ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT chat_id, name, last_message_at, project_name
                 FROM chats
                 WHERE chat_id = ?1",
                params![chat_id.as_str()],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Previously resolved display name, if one is stored.
    pub fn get_chat_name(&self, chat_id: &ChatId) -> Result<Option<String>> {
        let name: Option<String> = self
            .conn()
            .query_row(
                "SELECT name FROM chats WHERE chat_id = ?1",
                params![chat_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.filter(|n| !n.is_empty()))
    }

    /// List all chats, most recently active first.
    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT chat_id, name, last_message_at, project_name
             FROM chats
             ORDER BY last_message_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let chat_id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let last_str: String = row.get(2)?;
    let project_name: Option<String> = row.get(3)?;

    Ok(Chat {
        chat_id: ChatId(chat_id),
        name,
        last_message_at: decode_ts(2, &last_str)?,
        project_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("chats.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn upsert_updates_in_place() {
        let (db, _dir) = test_db();
        let chat = ChatId::new("1@g.us");
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        db.upsert_chat(&chat, "First", t1, Some("Velo Test")).unwrap();
        db.upsert_chat(&chat, "Renamed", t2, None).unwrap();

        let stored = db.get_chat(&chat).unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.last_message_at, t2);
        assert_eq!(stored.project_name, None);
        assert_eq!(db.list_chats().unwrap().len(), 1);
    }

    #[test]
    fn empty_name_is_not_cached() {
        let (db, _dir) = test_db();
        let chat = ChatId::new("2@g.us");
        db.ensure_chat(&chat, Utc::now()).unwrap();
        assert_eq!(db.get_chat_name(&chat).unwrap(), None);
        assert_eq!(
            db.get_chat_name(&ChatId::new("missing@g.us")).unwrap(),
            None
        );
    }

    #[test]
    fn list_orders_by_activity() {
        let (db, _dir) = test_db();
        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        db.upsert_chat(&ChatId::new("old@g.us"), "Old", old, None).unwrap();
        db.upsert_chat(&ChatId::new("new@g.us"), "New", new, None).unwrap();

        let names: Vec<String> = db.list_chats().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["New", "Old"]);
    }
}
