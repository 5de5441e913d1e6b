//! # causerie-media
//!
//! Call signaling coordinator: the state machine that drives one
//! audio/video call from ring to teardown.  The actual media engine (peer
//! connection, capture devices) and the signal transport are injected
//! behind traits, so this crate contains no platform code.

pub mod coordinator;
pub mod session;

mod error;

pub use coordinator::{CallCoordinator, CallState};
pub use error::CallError;
pub use session::{
    MediaProvider, MediaStream, PeerConnectionState, PeerSession, SessionParts, SignalSender,
};
