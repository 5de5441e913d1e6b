//! Topic addressing for the realtime broker.
//!
//! Inbound subscriptions live under `/topic/...`, outbound publishes under
//! `/app/...`.  [`parse`] classifies an inbound destination so the bridge
//! can dispatch without string matching scattered through the codebase.

/// Global presence broadcast: full list of online usernames.
pub const USERS_ONLINE: &str = "/topic/users/online";

/// New publications in the feed.
pub const PUBLICATIONS: &str = "/topic/publications";

/// Like/comment-count updates to existing publications.
pub const PUBLICATION_UPDATES: &str = "/topic/publications/updates";

/// New comments.
pub const COMMENTS: &str = "/topic/comments";

/// Outbound message publish destination.
pub const SEND_MESSAGE: &str = "/app/chat.message";

/// Outbound call signaling destinations.
pub const SEND_CALL_OFFER: &str = "/app/call.offer";
pub const SEND_CALL_ANSWER: &str = "/app/call.answer";
pub const SEND_CALL_CANDIDATE: &str = "/app/call.candidate";
pub const SEND_CALL_END: &str = "/app/call.end";

pub fn chat_messages(chat_id: i64) -> String {
    format!("/topic/chat/{chat_id}")
}

pub fn chat_typing(chat_id: i64) -> String {
    format!("/topic/chat/{chat_id}/typing")
}

pub fn chat_read(chat_id: i64) -> String {
    format!("/topic/chat/{chat_id}/read")
}

/// Per-user inbound call signaling channel.
pub fn call_user(user_id: i64) -> String {
    format!("/topic/call/{user_id}")
}

pub fn send_typing(chat_id: i64) -> String {
    format!("/app/chat/{chat_id}/typing")
}

pub fn send_read(chat_id: i64) -> String {
    format!("/app/chat/{chat_id}/read")
}

/// Classified inbound destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    UsersOnline,
    Publications,
    PublicationUpdates,
    Comments,
    ChatMessages(i64),
    ChatTyping(i64),
    ChatRead(i64),
    Call(i64),
}

/// Classify an inbound destination, or `None` for unknown topics.
pub fn parse(topic: &str) -> Option<InboundTopic> {
    match topic {
        USERS_ONLINE => return Some(InboundTopic::UsersOnline),
        PUBLICATIONS => return Some(InboundTopic::Publications),
        PUBLICATION_UPDATES => return Some(InboundTopic::PublicationUpdates),
        COMMENTS => return Some(InboundTopic::Comments),
        _ => {}
    }

    if let Some(rest) = topic.strip_prefix("/topic/chat/") {
        return match rest.split_once('/') {
            None => rest.parse().ok().map(InboundTopic::ChatMessages),
            Some((id, "typing")) => id.parse().ok().map(InboundTopic::ChatTyping),
            Some((id, "read")) => id.parse().ok().map(InboundTopic::ChatRead),
            Some(_) => None,
        };
    }

    if let Some(id) = topic.strip_prefix("/topic/call/") {
        return id.parse().ok().map(InboundTopic::Call);
    }

    None
}
