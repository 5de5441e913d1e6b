use thiserror::Error;

/// Errors surfaced by the call coordinator and its media seams.
#[derive(Error, Debug)]
pub enum CallError {
    /// Capture devices or peer connection could not be acquired.
    #[error("Media error: {0}")]
    Media(String),

    /// SDP or ICE negotiation failed.
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// An operation that needs an active call found none.
    #[error("No active call")]
    NoActiveCall,

    /// A second call was started while one is in progress.
    #[error("A call is already in progress")]
    CallInProgress,
}
