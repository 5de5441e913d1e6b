//! # causerie-client
//!
//! The client core: reconciliation engine, transport bridge, event channel
//! and the seams the platform shell plugs into (bulk sync, realtime,
//! notifications).  A UI layer drives this crate and renders its snapshots;
//! nothing in here touches a screen.

pub mod bridge;
pub mod engine;
pub mod events;
pub mod notify;
pub mod realtime;
pub mod reconcile;
pub mod sync;

use tracing_subscriber::{fmt, EnvFilter};

pub use bridge::spawn_bridge;
pub use engine::ChatEngine;
pub use events::{ClientEvent, ConnectionStatus};
pub use notify::{NoopNotifications, NotificationData, NotificationSink};
pub use realtime::{Realtime, TransportSignals};
pub use sync::BulkSync;

/// Initialize structured logging.  `RUST_LOG` wins when set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "causerie_client=debug,causerie_net=debug,causerie_store=info,causerie_media=info,warn",
        )
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
