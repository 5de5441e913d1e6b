/// Fixed delay between automatic reconnection attempts.
pub const RECONNECT_INTERVAL_SECS: u64 = 10;

/// Maximum number of automatic reconnection attempts before the transport
/// gives up and requires an explicit `connect` call.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// STOMP heart-beat interval, both directions, in milliseconds.
pub const HEARTBEAT_MILLIS: u64 = 4_000;

/// Number of missed heart-beat periods after which the broker connection is
/// considered dead.
pub const HEARTBEAT_GRACE_PERIODS: u32 = 3;

/// Default page size when fetching the chat list.
pub const CHAT_PAGE_SIZE: u32 = 20;

/// Default page size when fetching chat message history.
pub const MESSAGE_PAGE_SIZE: u32 = 50;

/// Default page size for the publication feed.
pub const PUBLICATION_PAGE_SIZE: u32 = 20;

/// Interval of the background per-chat message sync timer, in seconds.
pub const MESSAGE_SYNC_INTERVAL_SECS: u64 = 5;
