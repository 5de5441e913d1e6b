//! Seams over the realtime transport.
//!
//! The engine talks to the broker through the [`Realtime`] trait so tests
//! can substitute a recording fake; [`TransportHandle`] is the production
//! implementation.

use std::sync::Arc;

use causerie_media::SignalSender;
use causerie_net::{ChatSubscription, TransportHandle};
use causerie_shared::protocol::{CallSignal, InstantMessage};

/// Broker operations the engine needs.
pub trait Realtime: Send + Sync {
    fn subscribe_to_chat(&self, chat_id: i64) -> ChatSubscription;
    fn send_message(&self, chat_id: i64, message: &InstantMessage);
    fn send_typing_status(&self, chat_id: i64, username: &str, is_typing: bool);
    fn mark_message_as_read(&self, chat_id: i64, message_id: i64);
    fn is_connected(&self) -> bool;
    fn disconnect(&self);
}

impl Realtime for TransportHandle {
    fn subscribe_to_chat(&self, chat_id: i64) -> ChatSubscription {
        TransportHandle::subscribe_to_chat(self, chat_id)
    }

    fn send_message(&self, chat_id: i64, message: &InstantMessage) {
        TransportHandle::send_message(self, chat_id, message)
    }

    fn send_typing_status(&self, chat_id: i64, username: &str, is_typing: bool) {
        TransportHandle::send_typing_status(self, chat_id, username, is_typing)
    }

    fn mark_message_as_read(&self, chat_id: i64, message_id: i64) {
        TransportHandle::mark_message_as_read(self, chat_id, message_id)
    }

    fn is_connected(&self) -> bool {
        TransportHandle::is_connected(self)
    }

    fn disconnect(&self) {
        TransportHandle::disconnect(self)
    }
}

/// Adapter carrying call signals over the transport.
pub struct TransportSignals(pub Arc<TransportHandle>);

impl SignalSender for TransportSignals {
    fn send_offer(&self, signal: &CallSignal) {
        self.0.send_call_offer(signal);
    }

    fn send_answer(&self, signal: &CallSignal) {
        self.0.send_call_answer(signal);
    }

    fn send_candidate(&self, signal: &CallSignal) {
        self.0.send_ice_candidate(signal);
    }

    fn send_end(&self, signal: &CallSignal) {
        self.0.send_call_end(signal);
    }
}
