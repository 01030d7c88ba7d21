//! CRUD operations for [`StoredMessage`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use dropwatch_shared::{ChatId, MediaDescriptor, MediaKind};

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::StoredMessage;

const MESSAGE_COLUMNS: &str = "id, chat_id, sender, content, timestamp, from_me,
     media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length";

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Persist a message, replacing any earlier copy with the same
    /// `(id, chat_id)`.
    ///
    /// Returns `Ok(false)` without touching the database when the message has
    /// neither text nor media. A placeholder chat row is created first so
    /// messages from untracked chats are never rejected by the foreign key.
    pub fn store_message(&self, msg: &StoredMessage) -> Result<bool> {
        if !msg.is_storable() {
            return Ok(false);
        }

        self.ensure_chat(&msg.chat_id, msg.timestamp)?;

        let media = msg.media.as_ref();
        self.conn().execute(
            "INSERT INTO messages (id, chat_id, sender, content, timestamp, from_me,
                                   media_type, filename, url, media_key, file_sha256,
                                   file_enc_sha256, file_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id, chat_id) DO UPDATE SET
                 sender = excluded.sender,
                 content = excluded.content,
                 timestamp = excluded.timestamp,
                 from_me = excluded.from_me,
                 media_type = excluded.media_type,
                 filename = excluded.filename,
                 url = excluded.url,
                 media_key = excluded.media_key,
                 file_sha256 = excluded.file_sha256,
                 file_enc_sha256 = excluded.file_enc_sha256,
                 file_length = excluded.file_length",
            params![
                msg.id,
                msg.chat_id.as_str(),
                msg.sender,
                msg.content.as_deref().filter(|c| !c.is_empty()),
                encode_ts(&msg.timestamp),
                msg.from_me as i32,
                media.map(|m| m.kind.as_str()),
                media.map(|m| m.filename.as_str()),
                media.and_then(|m| m.url.as_deref()),
                media.and_then(|m| m.media_key.as_deref()),
                media.and_then(|m| m.file_sha256.as_deref()),
                media.and_then(|m| m.file_enc_sha256.as_deref()),
                media.and_then(|m| m.file_length).map(|n| n as i64),
            ],
        )?;

        tracing::debug!(
            message_id = %msg.id,
            chat = %msg.chat_id,
            media = media.map(|m| m.kind.as_str()),
            "stored message"
        );
        Ok(true)
    }

    /// Overwrite the media descriptor of an existing message, e.g. after a
    /// download learned fields the ingestion copy lacked.
    pub fn update_media_descriptor(
        &self,
        id: &str,
        chat_id: &ChatId,
        media: &MediaDescriptor,
    ) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE messages SET
                 media_type = ?3, filename = ?4, url = ?5, media_key = ?6,
                 file_sha256 = ?7, file_enc_sha256 = ?8, file_length = ?9
             WHERE id = ?1 AND chat_id = ?2",
            params![
                id,
                chat_id.as_str(),
                media.kind.as_str(),
                media.filename,
                media.url,
                media.media_key,
                media.file_sha256,
                media.file_enc_sha256,
                media.file_length.map(|n| n as i64),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Record that a completion message has been applied.
    ///
    /// Returns `Ok(false)` when it was already marked, so exactly one caller
    /// goes on to apply it. An unknown message is `NotFound`.
    pub fn mark_completion_handled(
        &self,
        id: &str,
        chat_id: &ChatId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE messages SET completion_handled_at = ?3
             WHERE id = ?1 AND chat_id = ?2 AND completion_handled_at IS NULL",
            params![id, chat_id.as_str(), encode_ts(&at)],
        )?;
        if changed == 1 {
            return Ok(true);
        }

        let exists: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM messages WHERE id = ?1 AND chat_id = ?2",
                params![id, chat_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound),
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Most recent messages of a chat, newest first.
    pub fn get_messages(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_id = ?1
             ORDER BY timestamp DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![chat_id.as_str(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Messages of a chat newer than `since`, newest first, capped at `limit`.
    pub fn get_messages_since(
        &self,
        chat_id: &ChatId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_id = ?1 AND timestamp > ?2
             ORDER BY timestamp DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![chat_id.as_str(), encode_ts(&since), limit],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Media descriptor of one message.
    ///
    /// `NotFound` when the message does not exist, `NotMedia` when it exists
    /// but carries no attachment.
    pub fn get_media_descriptor(&self, id: &str, chat_id: &ChatId) -> Result<MediaDescriptor> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND chat_id = ?2");
        let message = self
            .conn()
            .query_row(&sql, params![id, chat_id.as_str()], row_to_message)
            .optional()?
            .ok_or(StoreError::NotFound)?;

        message.media.ok_or(StoreError::NotMedia)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` (selected with `MESSAGE_COLUMNS`) to a
/// [`StoredMessage`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let id: String = row.get(0)?;
    let chat_id: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let content: Option<String> = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let from_me: i32 = row.get(5)?;
    let media_type: Option<String> = row.get(6)?;

    let media = match media_type {
        Some(raw) => {
            let kind: MediaKind = raw.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
                )
            })?;
            let filename: Option<String> = row.get(7)?;
            let file_length: Option<i64> = row.get(12)?;
            Some(MediaDescriptor {
                kind,
                filename: filename.unwrap_or_default(),
                url: row.get(8)?,
                media_key: row.get(9)?,
                file_sha256: row.get(10)?,
                file_enc_sha256: row.get(11)?,
                file_length: file_length.map(|n| n as u64),
            })
        }
        None => None,
    };

    Ok(StoredMessage {
        id,
        chat_id: ChatId(chat_id),
        sender,
        content,
        timestamp: decode_ts(4, &ts_str)?,
        from_me: from_me != 0,
        media,
    })
}
