//! Typed events emitted by the engine for the UI layer.

use causerie_shared::protocol::CallKind;
use causerie_shared::types::{Comment, Message, Publication};

/// Realtime connection lifecycle as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// One state change worth rendering.  Broadcast on the engine's event
/// channel; slow consumers may observe lag, the engine state snapshot is
/// always authoritative.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConnectionChanged(ConnectionStatus),
    NewMessage {
        chat_id: i64,
        message: Message,
    },
    MessageRead {
        chat_id: i64,
        message_id: i64,
    },
    TypingChanged {
        chat_id: i64,
        /// Usernames currently typing, the current user excluded.
        users: Vec<String>,
    },
    PresenceChanged {
        online: Vec<String>,
    },
    NewPublication(Publication),
    PublicationUpdated(Publication),
    NewComment(Comment),
    IncomingCall {
        call_id: String,
        caller_id: i64,
        kind: CallKind,
    },
    CallEnded {
        call_id: String,
    },
}
