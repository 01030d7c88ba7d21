use rusqlite::Connection;

// Set once a completion message has been applied to its reviews; survives
// restarts and re-stores of the same message.
const UP_SQL: &str = r#"
ALTER TABLE messages ADD COLUMN completion_handled_at TEXT;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
