//! Per-chat message list cache.
//!
//! Lists are stored newest first, matching the display order the engine
//! keeps in memory.  [`Database::append_message`] deduplicates by message
//! id so replaying a realtime event after a snapshot write is harmless.

use causerie_shared::types::Message;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Replace the cached message list for a chat.
    pub fn save_messages(&self, chat_id: i64, messages: &[Message]) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chat_messages (chat_id, messages) VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET messages = excluded.messages",
            params![chat_id, serde_json::to_string(messages)?],
        )?;
        Ok(())
    }

    /// Cached messages for a chat, newest first; empty on a cache miss.
    pub fn get_messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT messages FROM chat_messages WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(v) => Ok(serde_json::from_str(&v)?),
            None => Ok(Vec::new()),
        }
    }

    /// Prepend one message to a chat's cached list.
    ///
    /// A message whose id is already present is left untouched.
    pub fn append_message(&self, chat_id: i64, message: &Message) -> Result<()> {
        let mut messages = self.get_messages(chat_id)?;
        if messages.iter().any(|m| m.id == message.id) {
            return Ok(());
        }
        messages.insert(0, message.clone());
        self.save_messages(chat_id, &messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::types::{ChatRef, MessageType, User};
    use chrono::Utc;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn message(id: i64, chat_id: i64) -> Message {
        Message {
            id,
            content_text: format!("message {id}"),
            timestamp: Utc::now(),
            message_type: MessageType::Text,
            media: None,
            sender: User {
                id: 1,
                username: "alice".into(),
                email: "alice@example.com".into(),
                first_name: "Alice".into(),
                last_name: "Doe".into(),
                phone_number: None,
                address: None,
                profile_picture_url: None,
            },
            chat: ChatRef { id: chat_id },
            read: false,
        }
    }

    #[test]
    fn save_replaces_whole_list() {
        let (_dir, db) = open();

        db.save_messages(7, &[message(1, 7), message(2, 7)]).unwrap();
        db.save_messages(7, &[message(3, 7)]).unwrap();

        let cached = db.get_messages(7).unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, 3);
    }

    #[test]
    fn append_prepends_and_deduplicates() {
        let (_dir, db) = open();

        db.save_messages(7, &[message(1, 7)]).unwrap();
        db.append_message(7, &message(2, 7)).unwrap();
        db.append_message(7, &message(2, 7)).unwrap();

        let cached = db.get_messages(7).unwrap();
        assert_eq!(cached.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn lists_are_isolated_per_chat() {
        let (_dir, db) = open();

        db.save_messages(1, &[message(10, 1)]).unwrap();
        db.save_messages(2, &[message(20, 2)]).unwrap();

        assert_eq!(db.get_messages(1).unwrap()[0].id, 10);
        assert_eq!(db.get_messages(2).unwrap()[0].id, 20);
        assert!(db.get_messages(3).unwrap().is_empty());
    }
}
