//! Domain model structs exchanged with the server and cached locally.
//!
//! Field names follow the server's camelCase JSON contract.  Unknown fields
//! are ignored on deserialization so the client keeps working when the
//! server grows its payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user account as returned by the directory and embedded in messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

impl User {
    /// "First Last" as shown in notifications.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation thread, 1:1 or group.
///
/// Invariant: a non-group chat has exactly two participants, and its display
/// name is always derived from the other participant, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: i64,
    pub chat_name: String,
    pub is_group_chat: bool,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
}

impl Chat {
    /// Display name: the stored name for groups, the other participant's
    /// full name for 1:1 chats.
    pub fn display_name(&self, current_user_id: i64) -> String {
        if self.is_group_chat {
            return self.chat_name.clone();
        }
        self.participants
            .iter()
            .map(|p| &p.user)
            .find(|u| u.id != current_user_id)
            .map(User::full_name)
            .unwrap_or_else(|| self.chat_name.clone())
    }
}

/// Membership of one user in a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i64,
    pub user: User,
    pub joined_at: DateTime<Utc>,
    pub is_notif_active: bool,
    pub is_admin: bool,
}

/// The chat a message belongs to, reduced to its identity.
///
/// Server message payloads embed the full chat object; the client only ever
/// needs the id, so the rest is dropped on deserialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRef {
    pub id: i64,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Content kind of a message.  Closed enumeration, matches the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Text,
    Image,
    Video,
    File,
    Audio,
}

/// Attachment metadata for media messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: i64,
    pub file_name: String,
    pub thumbnail_url: String,
    pub file_url: String,
    pub media_type: String,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}

/// A single chat message.
///
/// `id` is unique within its chat; ingesting the same id twice must be a
/// no-op everywhere (enforced structurally by the reconciliation engine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub content_text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    pub sender: User,
    pub chat: ChatRef,
    pub read: bool,
}

impl Message {
    pub fn chat_id(&self) -> i64 {
        self.chat.id
    }
}

// ---------------------------------------------------------------------------
// Publications
// ---------------------------------------------------------------------------

/// A post in the publication feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: User,
    pub likes_count: i64,
    pub comments_count: i64,
    pub is_liked: bool,
}

/// The publication a comment belongs to, reduced to its identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationRef {
    pub id: i64,
}

/// A comment on a publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: User,
    pub publication: PublicationRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, username: &str) -> User {
        User {
            id,
            username: username.into(),
            email: format!("{username}@example.com"),
            first_name: username.to_uppercase(),
            last_name: "Doe".into(),
            phone_number: None,
            address: None,
            profile_picture_url: None,
        }
    }

    fn participant(id: i64, username: &str) -> Participant {
        Participant {
            id,
            user: user(id, username),
            joined_at: Utc::now(),
            is_notif_active: true,
            is_admin: false,
        }
    }

    #[test]
    fn message_round_trips_server_field_names() {
        let json = r#"{
            "id": 42,
            "contentText": "salut",
            "timestamp": "2024-05-01T10:00:00Z",
            "type": "TEXT",
            "sender": {
                "id": 7,
                "username": "alice",
                "email": "alice@example.com",
                "firstName": "Alice",
                "lastName": "Doe"
            },
            "chat": { "id": 3, "chatName": "ignored", "isGroupChat": false },
            "read": false
        }"#;

        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, 42);
        assert_eq!(msg.chat_id(), 3);
        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.sender.username, "alice");
        assert!(!msg.read);

        let out = serde_json::to_value(&msg).unwrap();
        assert_eq!(out["contentText"], "salut");
        assert_eq!(out["type"], "TEXT");
    }

    #[test]
    fn private_chat_display_name_is_the_other_participant() {
        let chat = Chat {
            id: 1,
            chat_name: String::new(),
            is_group_chat: false,
            created_at: Utc::now(),
            participants: vec![participant(1, "alice"), participant(2, "bob")],
        };

        assert_eq!(chat.display_name(1), "BOB Doe");
        assert_eq!(chat.display_name(2), "ALICE Doe");
    }

    #[test]
    fn group_chat_display_name_is_stored() {
        let chat = Chat {
            id: 1,
            chat_name: "Projet".into(),
            is_group_chat: true,
            created_at: Utc::now(),
            participants: vec![participant(1, "alice"), participant(2, "bob")],
        };

        assert_eq!(chat.display_name(1), "Projet");
    }
}
