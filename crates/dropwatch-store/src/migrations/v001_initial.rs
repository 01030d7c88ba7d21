//! v001 -- Initial schema creation.
//!
//! Creates the `chats` and `messages` tables that hold the raw chat history.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    chat_id         TEXT PRIMARY KEY NOT NULL,  -- protocol address, e.g. 1203...@g.us
    name            TEXT NOT NULL DEFAULT '',
    last_message_at TEXT NOT NULL,              -- RFC-3339, millisecond precision
    project_name    TEXT                        -- NULL for untracked chats
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT NOT NULL,
    chat_id         TEXT NOT NULL,              -- FK -> chats(chat_id)
    sender          TEXT NOT NULL,
    content         TEXT,                       -- NULL for media-only messages
    timestamp       TEXT NOT NULL,
    from_me         INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    media_type      TEXT,                       -- image | video | audio | document
    filename        TEXT,
    url             TEXT,
    media_key       BLOB,
    file_sha256     BLOB,
    file_enc_sha256 BLOB,
    file_length     INTEGER,

    PRIMARY KEY (id, chat_id),
    FOREIGN KEY (chat_id) REFERENCES chats(chat_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, timestamp DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
