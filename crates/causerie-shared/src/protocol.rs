//! Wire payloads carried over the realtime broker channels.

use serde::{Deserialize, Serialize};

use crate::types::MessageType;

/// Outbound partial message published on `/app/chat.message`.
///
/// The server resolves the full [`crate::types::Message`] (id, timestamp,
/// chat association) and broadcasts it back on the chat topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstantMessage {
    pub content: String,
    /// Sender user id.
    pub sender: i64,
    /// Receiver user id (the other participant for 1:1, chat owner for groups).
    pub receiver: i64,
    pub message_type: MessageType,
}

/// Typing edge published on `/app/chat/{id}/typing` and broadcast on
/// `/topic/chat/{id}/typing`.  The producing client is responsible for
/// emitting both the `typing=true` and the `typing=false` edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingEvent {
    pub username: String,
    pub typing: bool,
}

/// Read receipt published on `/app/chat/{id}/read` and broadcast on
/// `/topic/chat/{id}/read`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadEvent {
    pub message_id: i64,
}

// ---------------------------------------------------------------------------
// Call signaling
// ---------------------------------------------------------------------------

/// Audio-only or audio+video call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

/// Discriminant of a [`CallSignal`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallSignalKind {
    Offer,
    Answer,
    Candidate,
    End,
}

/// One step of the offer/answer/ICE-candidate exchange.
///
/// `call_id` is client-generated for outbound calls and taken from the peer
/// for inbound ones.  `sdp` carries the offer or answer description,
/// `candidate` a serialized ICE candidate; both are opaque to this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallSignal {
    pub call_id: String,
    pub kind: CallSignalKind,
    pub caller_id: i64,
    pub receiver_id: i64,
    #[serde(rename = "type")]
    pub call_type: CallKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
}

impl CallSignal {
    pub fn end(call_id: &str, caller_id: i64, receiver_id: i64, call_type: CallKind) -> Self {
        Self {
            call_id: call_id.to_owned(),
            kind: CallSignalKind::End,
            caller_id,
            receiver_id,
            call_type,
            sdp: None,
            candidate: None,
        }
    }
}
