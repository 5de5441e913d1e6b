//! Notification sink seam.
//!
//! The engine decides *when* to notify; the platform layer decides *how*.

/// Deep-link payload attached to a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationData {
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub publication_id: Option<i64>,
    pub comment_id: Option<i64>,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str, data: NotificationData);
}

/// Sink that drops everything.  Used headless and in tests.
pub struct NoopNotifications;

impl NotificationSink for NoopNotifications {
    fn notify(&self, _title: &str, _body: &str, _data: NotificationData) {}
}
