//! Transport-to-engine bridge.
//!
//! One task drains the transport's event stream, classifies topics and
//! dispatches to engine mutations or the call coordinator.  Malformed
//! payloads are logged and dropped; the loop itself never fails.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use causerie_media::{CallCoordinator, CallState};
use causerie_net::TransportEvent;
use causerie_shared::protocol::{CallSignal, CallSignalKind, ReadEvent, TypingEvent};
use causerie_shared::topics::{self, InboundTopic};
use causerie_shared::types::{Comment, Message, Publication};

use crate::engine::ChatEngine;
use crate::events::{ClientEvent, ConnectionStatus};

/// Consume transport events until the channel closes.
pub fn spawn_bridge(
    engine: ChatEngine,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    coordinator: Arc<Mutex<CallCoordinator>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected { reconnect } => {
                    info!(reconnect, "realtime connected");
                    engine.set_connection(ConnectionStatus::Connected);
                    engine.resubscribe_all();
                }
                TransportEvent::Disconnected => {
                    engine.invalidate_subscriptions();
                    engine.set_connection(ConnectionStatus::Reconnecting);
                }
                TransportEvent::ReconnectFailed => {
                    engine.set_connection(ConnectionStatus::Disconnected);
                }
                TransportEvent::Message { topic, body } => {
                    dispatch(&engine, &coordinator, &topic, &body).await;
                }
            }
        }
        debug!("transport event channel closed, bridge stopping");
    })
}

async fn dispatch(
    engine: &ChatEngine,
    coordinator: &Mutex<CallCoordinator>,
    topic: &str,
    body: &str,
) {
    let Some(inbound) = topics::parse(topic) else {
        warn!(topic, "message on unknown topic, dropping");
        return;
    };

    match inbound {
        InboundTopic::UsersOnline => match serde_json::from_str::<Vec<String>>(body) {
            Ok(users) => engine.replace_online_users(users),
            Err(e) => warn!(topic, error = %e, "malformed presence payload"),
        },
        InboundTopic::ChatMessages(_) => match serde_json::from_str::<Message>(body) {
            Ok(message) => engine.ingest_realtime_message(message),
            Err(e) => warn!(topic, error = %e, "malformed message payload"),
        },
        InboundTopic::ChatTyping(chat_id) => match serde_json::from_str::<TypingEvent>(body) {
            Ok(event) => engine.set_typing_status(chat_id, &event.username, event.typing),
            Err(e) => warn!(topic, error = %e, "malformed typing payload"),
        },
        InboundTopic::ChatRead(chat_id) => match serde_json::from_str::<ReadEvent>(body) {
            Ok(event) => engine.apply_read_receipt(chat_id, event.message_id),
            Err(e) => warn!(topic, error = %e, "malformed read receipt"),
        },
        InboundTopic::Publications => match serde_json::from_str::<Publication>(body) {
            Ok(publication) => engine.add_publication(publication),
            Err(e) => warn!(topic, error = %e, "malformed publication payload"),
        },
        InboundTopic::PublicationUpdates => match serde_json::from_str::<Publication>(body) {
            Ok(publication) => engine.update_publication(publication),
            Err(e) => warn!(topic, error = %e, "malformed publication update"),
        },
        InboundTopic::Comments => match serde_json::from_str::<Comment>(body) {
            Ok(comment) => engine.apply_new_comment(comment),
            Err(e) => warn!(topic, error = %e, "malformed comment payload"),
        },
        InboundTopic::Call(_) => match serde_json::from_str::<CallSignal>(body) {
            Ok(signal) => handle_call_signal(engine, coordinator, signal).await,
            Err(e) => warn!(topic, error = %e, "malformed call signal"),
        },
    }
}

async fn handle_call_signal(
    engine: &ChatEngine,
    coordinator: &Mutex<CallCoordinator>,
    signal: CallSignal,
) {
    match signal.kind {
        CallSignalKind::Offer => {
            let call_id = signal.call_id.clone();
            let caller_id = signal.caller_id;
            let kind = signal.call_type;
            let mut coordinator = coordinator.lock().await;
            coordinator.handle_offer(signal);
            // Busy coordinators drop the offer; only ring the UI when it
            // actually took it.
            if coordinator.state() == CallState::IncomingRinging
                && coordinator.current_call_id() == Some(call_id.as_str())
            {
                engine.emit(ClientEvent::IncomingCall {
                    call_id,
                    caller_id,
                    kind,
                });
            }
        }
        CallSignalKind::Answer => {
            coordinator.lock().await.handle_answer(signal).await;
        }
        CallSignalKind::Candidate => {
            coordinator.lock().await.handle_candidate(signal).await;
        }
        CallSignalKind::End => {
            let call_id = signal.call_id.clone();
            coordinator.lock().await.handle_remote_end(&signal);
            engine.emit(ClientEvent::CallEnded { call_id });
        }
    }
}
