//! Session record: auth token and current user snapshot.

use causerie_shared::types::User;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

const KEY_SESSION_TOKEN: &str = "session_token";
const KEY_CURRENT_USER: &str = "current_user";

impl Database {
    pub fn save_session_token(&self, token: &str) -> Result<()> {
        self.put_kv(KEY_SESSION_TOKEN, &serde_json::to_string(token)?)
    }

    pub fn get_session_token(&self) -> Result<Option<String>> {
        self.get_kv(KEY_SESSION_TOKEN)?
            .map(|v| serde_json::from_str(&v).map_err(Into::into))
            .transpose()
    }

    pub fn clear_session_token(&self) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![KEY_SESSION_TOKEN])?;
        Ok(())
    }

    pub fn save_current_user(&self, user: &User) -> Result<()> {
        self.put_kv(KEY_CURRENT_USER, &serde_json::to_string(user)?)
    }

    pub fn get_current_user(&self) -> Result<Option<User>> {
        self.get_kv(KEY_CURRENT_USER)?
            .map(|v| serde_json::from_str(&v).map_err(Into::into))
            .transpose()
    }

    pub(crate) fn put_kv(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub(crate) fn get_kv(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}
