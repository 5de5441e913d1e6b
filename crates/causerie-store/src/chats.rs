//! Chat list snapshot and per-chat last-message summaries.

use causerie_shared::types::{Chat, Message};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

const KEY_CHATS: &str = "chats";

impl Database {
    /// Replace the cached chat list wholesale.
    pub fn save_chats(&self, chats: &[Chat]) -> Result<()> {
        self.put_kv(KEY_CHATS, &serde_json::to_string(chats)?)
    }

    /// Last-known chat list; empty when nothing has been cached yet.
    pub fn get_chats(&self) -> Result<Vec<Chat>> {
        match self.get_kv(KEY_CHATS)? {
            Some(v) => Ok(serde_json::from_str(&v)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn save_last_message(&self, chat_id: i64, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO last_messages (chat_id, message) VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET message = excluded.message",
            params![chat_id, serde_json::to_string(message)?],
        )?;
        Ok(())
    }

    pub fn get_last_message(&self, chat_id: i64) -> Result<Option<Message>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT message FROM last_messages WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|v| serde_json::from_str(&v).map_err(Into::into))
            .transpose()
    }
}
