//! Seams between the coordinator and the platform media engine.

use async_trait::async_trait;

use causerie_shared::protocol::{CallKind, CallSignal};

use crate::error::CallError;

/// Peer connection and local capture for one call, acquired together.
pub struct SessionParts {
    pub peer: Box<dyn PeerSession>,
    pub local: Box<dyn MediaStream>,
}

/// Acquires media sessions.  Implemented by the platform layer.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Set up a peer connection (with ICE configuration) and open the local
    /// capture devices for the given call kind.
    async fn open_session(&self, kind: CallKind) -> Result<SessionParts, CallError>;
}

/// One peer connection's negotiation surface.
#[async_trait]
pub trait PeerSession: Send {
    async fn create_offer(&mut self) -> Result<String, CallError>;
    async fn create_answer(&mut self) -> Result<String, CallError>;
    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), CallError>;
    async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), CallError>;
    fn close(&mut self);
}

/// Local capture stream controls.
pub trait MediaStream: Send {
    fn set_audio_enabled(&mut self, enabled: bool);
    fn set_video_enabled(&mut self, enabled: bool);
    fn audio_enabled(&self) -> bool;
    fn video_enabled(&self) -> bool;
    fn switch_camera(&mut self);
    /// Stop every track and release the devices.
    fn stop(&mut self);
}

/// Outbound signal channel, implemented by the realtime transport.
pub trait SignalSender: Send + Sync {
    fn send_offer(&self, signal: &CallSignal);
    fn send_answer(&self, signal: &CallSignal);
    fn send_candidate(&self, signal: &CallSignal);
    fn send_end(&self, signal: &CallSignal);
}

/// Peer connection transport state as reported by the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// States from which the connection cannot recover.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PeerConnectionState::Disconnected
                | PeerConnectionState::Failed
                | PeerConnectionState::Closed
        )
    }
}
