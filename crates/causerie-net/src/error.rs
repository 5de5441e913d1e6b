use thiserror::Error;

/// Errors produced by the realtime transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Underlying websocket failure (dial, TLS, mid-session).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The broker rejected the handshake or sent an ERROR frame.
    #[error("Broker error: {0}")]
    Broker(String),

    /// A frame could not be parsed.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The connection closed before the handshake completed.
    #[error("Connection closed during handshake")]
    HandshakeClosed,
}

/// Errors produced by the bulk sync client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network-level failure.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("Server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}
