//! # causerie-shared
//!
//! Domain models, wire protocol payloads and topic addressing shared by all
//! Causerie crates.  Everything here mirrors the server's JSON contracts:
//! structs serialize with the server's camelCase field names so they can be
//! handed straight to `serde_json` at the transport boundary.

pub mod constants;
pub mod protocol;
pub mod topics;
pub mod types;

pub use protocol::{CallKind, CallSignal, CallSignalKind, InstantMessage, ReadEvent, TypingEvent};
pub use types::{Chat, ChatRef, Media, Message, MessageType, Participant, User};
