//! # causerie-net
//!
//! Network layer of the Causerie client: the realtime broker transport
//! (STOMP-style frames over a websocket, with heartbeats and bounded
//! fixed-interval reconnection) and the request/response bulk sync client.

pub mod api;
pub mod stomp;
pub mod transport;

mod error;

pub use api::{ApiClient, FileResponse, IceServer, Page, WebRtcConfig};
pub use error::{ApiError, TransportError};
pub use transport::{
    connect, ChatSubscription, TransportConfig, TransportEvent, TransportHandle,
};
