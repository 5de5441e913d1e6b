//! v001 -- Initial schema creation.
//!
//! The cache is key-value shaped: singleton snapshots live in `kv`,
//! per-chat values in their own tables keyed by chat id.  Values are JSON.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Singleton snapshots: session token, current user, chat list,
-- publication feed.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL                -- JSON
);

-- ----------------------------------------------------------------
-- Per-chat message lists (newest first, as displayed)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_messages (
    chat_id  INTEGER PRIMARY KEY NOT NULL,
    messages TEXT NOT NULL             -- JSON array of Message
);

-- ----------------------------------------------------------------
-- Per-chat last-message summaries for the chat list screen
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS last_messages (
    chat_id INTEGER PRIMARY KEY NOT NULL,
    message TEXT NOT NULL              -- JSON Message
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
