//! Realtime broker transport.
//!
//! One logical connection multiplexing topic subscriptions over a single
//! websocket, speaking the STOMP frames from [`crate::stomp`].  The socket
//! lives in a dedicated tokio task; external code talks to it through a
//! command channel and receives [`TransportEvent`]s on a notification
//! channel, keeping the networking layer fully asynchronous and decoupled.
//!
//! Reconnection is deliberately simple: a fixed interval between attempts
//! and a hard attempt cap, after which the transport gives up for good and
//! the caller must call [`connect`] again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use causerie_shared::constants::{
    HEARTBEAT_GRACE_PERIODS, HEARTBEAT_MILLIS, MAX_RECONNECT_ATTEMPTS, RECONNECT_INTERVAL_SECS,
};
use causerie_shared::protocol::{CallSignal, InstantMessage, ReadEvent, TypingEvent};
use causerie_shared::topics;

use crate::error::TransportError;
use crate::stomp::{Command, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for [`connect`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Broker websocket URL, e.g. `ws://localhost:8080/ws`.
    pub ws_url: String,
    /// Local user id, used for the per-user call signaling topic.
    pub user_id: i64,
    /// Fixed delay between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Maximum automatic reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Heart-beat interval, both directions.
    pub heartbeat: Duration,
}

impl TransportConfig {
    pub fn new(ws_url: impl Into<String>, user_id: i64) -> Self {
        Self {
            ws_url: ws_url.into(),
            user_id,
            reconnect_interval: Duration::from_secs(RECONNECT_INTERVAL_SECS),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            heartbeat: Duration::from_millis(HEARTBEAT_MILLIS),
        }
    }
}

/// Notifications sent from the transport task to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection (re-)established and global topics are subscribed.
    /// Per-chat subscriptions do not survive a drop; on `reconnect: true`
    /// the engine must re-issue them.
    Connected { reconnect: bool },
    /// The connection dropped unexpectedly; reconnection attempts follow.
    Disconnected,
    /// All reconnection attempts were exhausted.  No further automatic
    /// attempts will be made.
    ReconnectFailed,
    /// A broker frame arrived on a subscribed topic.
    Message { topic: String, body: String },
}

/// Commands sent into the transport task.
#[derive(Debug)]
enum Cmd {
    Subscribe { id: String, topic: String },
    Unsubscribe { id: String },
    Send { destination: String, body: String },
    Disconnect,
}

/// Idempotent teardown handle for one chat's three subscriptions.
///
/// Dropping the handle unsubscribes; [`ChatSubscription::disarm`] turns it
/// into a no-op, which the engine uses to discard handles made stale by a
/// connection drop.
pub struct ChatSubscription {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl ChatSubscription {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A handle that tears nothing down, returned when the transport is not
    /// connected at subscribe time.
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    /// Tear the subscriptions down.  Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    /// Drop the teardown without running it.  Used after a connection drop,
    /// when the broker-side subscriptions no longer exist.
    pub fn disarm(&mut self) {
        self.teardown = None;
    }
}

impl Drop for ChatSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Handle to the running transport task.  Cheap to clone.
#[derive(Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    connected: Arc<AtomicBool>,
    next_sub: Arc<AtomicU64>,
}

impl TransportHandle {
    /// Point-in-time connection status.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Open the three per-chat subscriptions (messages, typing, read
    /// receipts) and return a single idempotent teardown handle.
    ///
    /// Must only be called while the connection is established; when it is
    /// not, a no-op handle is returned and a warning logged.
    pub fn subscribe_to_chat(&self, chat_id: i64) -> ChatSubscription {
        if !self.is_connected() {
            warn!(chat = chat_id, "cannot subscribe to chat: not connected");
            return ChatSubscription::noop();
        }

        let n = self.next_sub.fetch_add(1, Ordering::Relaxed);
        let subs = [
            (format!("chat-{chat_id}-messages-{n}"), topics::chat_messages(chat_id)),
            (format!("chat-{chat_id}-typing-{n}"), topics::chat_typing(chat_id)),
            (format!("chat-{chat_id}-read-{n}"), topics::chat_read(chat_id)),
        ];

        for (id, topic) in &subs {
            let _ = self.cmd_tx.send(Cmd::Subscribe {
                id: id.clone(),
                topic: topic.clone(),
            });
        }
        debug!(chat = chat_id, "subscribed to chat topics");

        let cmd_tx = self.cmd_tx.clone();
        let ids: Vec<String> = subs.into_iter().map(|(id, _)| id).collect();
        ChatSubscription::new(move || {
            for id in ids {
                let _ = cmd_tx.send(Cmd::Unsubscribe { id });
            }
        })
    }

    /// Publish an outbound chat message.  Fire-and-forget: silently no-ops
    /// (log only) when the connection is down.
    pub fn send_message(&self, chat_id: i64, message: &InstantMessage) {
        match serde_json::to_string(message) {
            Ok(body) => self.publish(topics::SEND_MESSAGE, body, chat_id),
            Err(e) => warn!(chat = chat_id, error = %e, "failed to encode message"),
        }
    }

    pub fn send_typing_status(&self, chat_id: i64, username: &str, is_typing: bool) {
        let event = TypingEvent {
            username: username.to_owned(),
            typing: is_typing,
        };
        match serde_json::to_string(&event) {
            Ok(body) => self.publish(&topics::send_typing(chat_id), body, chat_id),
            Err(e) => warn!(chat = chat_id, error = %e, "failed to encode typing event"),
        }
    }

    pub fn mark_message_as_read(&self, chat_id: i64, message_id: i64) {
        let event = ReadEvent { message_id };
        match serde_json::to_string(&event) {
            Ok(body) => self.publish(&topics::send_read(chat_id), body, chat_id),
            Err(e) => warn!(chat = chat_id, error = %e, "failed to encode read event"),
        }
    }

    pub fn send_call_offer(&self, signal: &CallSignal) {
        self.send_signal(topics::SEND_CALL_OFFER, signal);
    }

    pub fn send_call_answer(&self, signal: &CallSignal) {
        self.send_signal(topics::SEND_CALL_ANSWER, signal);
    }

    pub fn send_ice_candidate(&self, signal: &CallSignal) {
        self.send_signal(topics::SEND_CALL_CANDIDATE, signal);
    }

    pub fn send_call_end(&self, signal: &CallSignal) {
        self.send_signal(topics::SEND_CALL_END, signal);
    }

    /// Tear down the connection and halt any pending reconnect timers.
    /// Idempotent.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.cmd_tx.send(Cmd::Disconnect);
    }

    fn send_signal(&self, destination: &str, signal: &CallSignal) {
        match serde_json::to_string(signal) {
            Ok(body) => {
                if !self.is_connected() {
                    warn!(call = %signal.call_id, destination, "cannot send call signal: not connected");
                    return;
                }
                let _ = self.cmd_tx.send(Cmd::Send {
                    destination: destination.to_owned(),
                    body,
                });
            }
            Err(e) => warn!(call = %signal.call_id, error = %e, "failed to encode call signal"),
        }
    }

    fn publish(&self, destination: &str, body: String, chat_id: i64) {
        if !self.is_connected() {
            warn!(chat = chat_id, destination, "cannot publish: not connected");
            return;
        }
        let _ = self.cmd_tx.send(Cmd::Send {
            destination: destination.to_owned(),
            body,
        });
    }
}

/// Establish the broker connection, authenticate with the session token and
/// subscribe the global topics (presence, publications, publication updates,
/// comments, per-user call channel).
///
/// Resolves once the broker acknowledges the handshake.  On handshake
/// failure the error is returned and nothing retries: automatic reconnection
/// only covers drops *after* a successful connect.
pub async fn connect(
    config: TransportConfig,
    session_token: &str,
) -> Result<(TransportHandle, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
    let ws = open_session(&config, session_token).await?;

    info!(url = %config.ws_url, "transport connected");

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicBool::new(true));

    let _ = event_tx.send(TransportEvent::Connected { reconnect: false });

    let handle = TransportHandle {
        cmd_tx,
        connected: connected.clone(),
        next_sub: Arc::new(AtomicU64::new(0)),
    };

    let token = session_token.to_owned();
    tokio::spawn(run_transport(ws, config, token, cmd_rx, event_tx, connected));

    Ok((handle, event_rx))
}

/// How one connected session ended.
enum SessionEnd {
    /// Caller asked for a disconnect (or dropped every handle).
    Shutdown,
    /// The connection dropped unexpectedly.
    Lost,
}

async fn run_transport(
    mut ws: WsStream,
    config: TransportConfig,
    token: String,
    mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    'session: loop {
        match run_session(&mut ws, &config, &mut cmd_rx, &event_tx).await {
            SessionEnd::Shutdown => {
                connected.store(false, Ordering::Release);
                info!("transport shut down");
                return;
            }
            SessionEnd::Lost => {
                connected.store(false, Ordering::Release);
                let _ = event_tx.send(TransportEvent::Disconnected);
            }
        }

        // Fixed-interval reconnection with a hard attempt cap.
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if attempts > config.max_reconnect_attempts {
                warn!(
                    max = config.max_reconnect_attempts,
                    "max reconnection attempts reached, giving up"
                );
                let _ = event_tx.send(TransportEvent::ReconnectFailed);
                return;
            }

            info!(
                attempt = attempts,
                max = config.max_reconnect_attempts,
                "attempting to reconnect"
            );

            tokio::select! {
                _ = tokio::time::sleep(config.reconnect_interval) => {}
                shutdown = drain_until_disconnect(&mut cmd_rx) => {
                    if shutdown {
                        info!("reconnect cancelled by caller");
                        return;
                    }
                }
            }

            match open_session(&config, &token).await {
                Ok(new_ws) => {
                    ws = new_ws;
                    connected.store(true, Ordering::Release);
                    info!("transport reconnected");
                    let _ = event_tx.send(TransportEvent::Connected { reconnect: true });
                    continue 'session;
                }
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "reconnection attempt failed");
                }
            }
        }
    }
}

/// Pump one connected session until it ends.
async fn run_session(
    ws: &mut WsStream,
    config: &TransportConfig,
    cmd_rx: &mut mpsc::UnboundedReceiver<Cmd>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> SessionEnd {
    let mut heartbeat = tokio::time::interval(config.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let grace = config.heartbeat * HEARTBEAT_GRACE_PERIODS;
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Cmd::Subscribe { id, topic }) => {
                    let frame = Frame::new(Command::Subscribe)
                        .header("id", &id)
                        .header("destination", &topic);
                    if send_frame(ws, frame).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
                Some(Cmd::Unsubscribe { id }) => {
                    let frame = Frame::new(Command::Unsubscribe).header("id", &id);
                    if send_frame(ws, frame).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
                Some(Cmd::Send { destination, body }) => {
                    let frame = Frame::new(Command::Send)
                        .header("destination", &destination)
                        .header("content-type", "application/json")
                        .body(body);
                    if send_frame(ws, frame).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
                Some(Cmd::Disconnect) | None => {
                    let _ = send_frame(ws, Frame::new(Command::Disconnect)).await;
                    let _ = ws.close(None).await;
                    return SessionEnd::Shutdown;
                }
            },

            msg = ws.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    last_inbound = Instant::now();
                    match Frame::parse(&text) {
                        Ok(None) => {} // heart-beat
                        Ok(Some(frame)) => match frame.command {
                            Command::Message => {
                                let topic = frame.get("destination").unwrap_or("").to_owned();
                                let _ = event_tx.send(TransportEvent::Message {
                                    topic,
                                    body: frame.body,
                                });
                            }
                            Command::Error => {
                                warn!(
                                    message = frame.get("message").unwrap_or(""),
                                    "broker ERROR frame"
                                );
                                return SessionEnd::Lost;
                            }
                            other => debug!(command = %other, "ignoring broker frame"),
                        },
                        Err(e) => warn!(error = %e, "dropping malformed frame"),
                    }
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                    last_inbound = Instant::now();
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    warn!("websocket closed by broker");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket error");
                    return SessionEnd::Lost;
                }
            },

            _ = heartbeat.tick() => {
                if last_inbound.elapsed() > grace {
                    warn!("broker heart-beats missed, treating connection as dead");
                    return SessionEnd::Lost;
                }
                if ws.send(WsMessage::Text("\n".into())).await.is_err() {
                    return SessionEnd::Lost;
                }
            }
        }
    }
}

/// Swallow commands while disconnected; resolves `true` on a disconnect
/// request (or when every handle is gone).
async fn drain_until_disconnect(cmd_rx: &mut mpsc::UnboundedReceiver<Cmd>) -> bool {
    loop {
        match cmd_rx.recv().await {
            Some(Cmd::Disconnect) | None => return true,
            Some(other) => {
                debug!(cmd = ?other, "dropping command while disconnected");
            }
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: Frame) -> Result<(), TransportError> {
    ws.send(WsMessage::Text(frame.encode()))
        .await
        .map_err(|e| {
            warn!(error = %e, "failed to send frame");
            TransportError::WebSocket(e)
        })
}

/// Dial the broker, run the STOMP handshake and subscribe the global topics.
async fn open_session(
    config: &TransportConfig,
    token: &str,
) -> Result<WsStream, TransportError> {
    let (mut ws, _response) = connect_async(&config.ws_url).await?;

    let heartbeat_ms = config.heartbeat.as_millis();
    let connect_frame = Frame::new(Command::Connect)
        .header("accept-version", "1.2")
        .header("host", &host_of(&config.ws_url))
        .header("Authorization", &format!("Bearer {token}"))
        .header("heart-beat", &format!("{heartbeat_ms},{heartbeat_ms}"));
    ws.send(WsMessage::Text(connect_frame.encode())).await?;

    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => match Frame::parse(&text)? {
                None => continue,
                Some(frame) if frame.command == Command::Connected => break,
                Some(frame) if frame.command == Command::Error => {
                    let reason = frame
                        .get("message")
                        .map(str::to_owned)
                        .unwrap_or(frame.body);
                    return Err(TransportError::Broker(reason));
                }
                Some(frame) => {
                    debug!(command = %frame.command, "unexpected frame during handshake");
                }
            },
            Some(Ok(WsMessage::Close(_))) | None => return Err(TransportError::HandshakeClosed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }

    for (id, topic) in global_subscriptions(config.user_id) {
        let frame = Frame::new(Command::Subscribe)
            .header("id", &id)
            .header("destination", &topic);
        ws.send(WsMessage::Text(frame.encode())).await?;
    }

    Ok(ws)
}

/// The fixed set of topics subscribed on every (re)connect.
fn global_subscriptions(user_id: i64) -> Vec<(String, String)> {
    vec![
        ("sub-online".into(), topics::USERS_ONLINE.into()),
        ("sub-publications".into(), topics::PUBLICATIONS.into()),
        (
            "sub-publication-updates".into(),
            topics::PUBLICATION_UPDATES.into(),
        ),
        ("sub-comments".into(), topics::COMMENTS.into()),
        ("sub-call".into(), topics::call_user(user_id)),
    ]
}

/// Host portion of a ws:// or wss:// URL, for the STOMP `host` header.
fn host_of(ws_url: &str) -> String {
    let rest = ws_url
        .strip_prefix("wss://")
        .or_else(|| ws_url.strip_prefix("ws://"))
        .unwrap_or(ws_url);
    rest.split(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_owned()
}
