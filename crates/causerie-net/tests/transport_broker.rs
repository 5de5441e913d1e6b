//! Transport tests against an in-process fake broker.
//!
//! Each test binds a local listener, accepts the websocket, answers the
//! handshake by hand with raw frames and then asserts on what the transport
//! sends or emits.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use causerie_net::stomp::{Command, Frame};
use causerie_net::{connect, TransportConfig, TransportEvent};
use causerie_shared::protocol::InstantMessage;
use causerie_shared::types::MessageType;

const WAIT: Duration = Duration::from_secs(5);

fn test_config(url: &str) -> TransportConfig {
    let mut config = TransportConfig::new(url, 7);
    config.reconnect_interval = Duration::from_millis(50);
    config
}

async fn read_frame(ws: &mut WebSocketStream<TcpStream>) -> Frame {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let WsMessage::Text(text) = msg {
            if let Some(frame) = Frame::parse(&text).unwrap() {
                return frame;
            }
        }
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Accept a connection and run the broker side of the handshake, leaving the
/// five global SUBSCRIBE frames unread.
async fn accept_session(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("timed out waiting for a connection")
        .unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let frame = read_frame(&mut ws).await;
    assert_eq!(frame.command, Command::Connect);
    assert!(frame
        .get("Authorization")
        .expect("missing Authorization header")
        .starts_with("Bearer "));

    let connected = Frame::new(Command::Connected).header("version", "1.2");
    ws.send(WsMessage::Text(connected.encode())).await.unwrap();
    ws
}

/// Read and return the destinations of the global subscriptions.
async fn drain_global_subscriptions(ws: &mut WebSocketStream<TcpStream>) -> Vec<String> {
    let mut destinations = Vec::new();
    for _ in 0..5 {
        let frame = read_frame(ws).await;
        assert_eq!(frame.command, Command::Subscribe);
        destinations.push(frame.get("destination").unwrap().to_owned());
    }
    destinations
}

#[tokio::test]
async fn handshake_subscribes_global_topics() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let broker = async {
        let mut ws = accept_session(&listener).await;
        let destinations = drain_global_subscriptions(&mut ws).await;
        (ws, destinations)
    };
    let (client, (ws, destinations)) =
        tokio::join!(connect(test_config(&url), "token-1"), broker);
    let (handle, mut events) = client.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Connected { reconnect: false }
    );
    assert!(handle.is_connected());
    assert!(destinations.contains(&"/topic/users/online".to_owned()));
    assert!(destinations.contains(&"/topic/publications".to_owned()));
    assert!(destinations.contains(&"/topic/publications/updates".to_owned()));
    assert!(destinations.contains(&"/topic/comments".to_owned()));
    assert!(destinations.contains(&"/topic/call/7".to_owned()));

    drop(ws);
}

#[tokio::test]
async fn chat_subscription_opens_and_tears_down_three_topics() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let broker = async {
        let mut ws = accept_session(&listener).await;
        drain_global_subscriptions(&mut ws).await;
        ws
    };
    let (client, mut ws) = tokio::join!(connect(test_config(&url), "token-1"), broker);
    let (handle, _events) = client.unwrap();

    let mut sub = handle.subscribe_to_chat(3);

    let mut destinations = Vec::new();
    for _ in 0..3 {
        let frame = read_frame(&mut ws).await;
        assert_eq!(frame.command, Command::Subscribe);
        destinations.push(frame.get("destination").unwrap().to_owned());
    }
    assert!(destinations.contains(&"/topic/chat/3".to_owned()));
    assert!(destinations.contains(&"/topic/chat/3/typing".to_owned()));
    assert!(destinations.contains(&"/topic/chat/3/read".to_owned()));

    sub.unsubscribe();
    for _ in 0..3 {
        let frame = read_frame(&mut ws).await;
        assert_eq!(frame.command, Command::Unsubscribe);
    }
}

#[tokio::test]
async fn broker_messages_surface_as_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let broker = async {
        let mut ws = accept_session(&listener).await;
        drain_global_subscriptions(&mut ws).await;
        ws
    };
    let (client, mut ws) = tokio::join!(connect(test_config(&url), "token-1"), broker);
    let (_handle, mut events) = client.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Connected { reconnect: false }
    );

    let message = Frame::new(Command::Message)
        .header("destination", "/topic/chat/3")
        .header("subscription", "chat-3-messages-0")
        .body(r#"{"id":9}"#);
    ws.send(WsMessage::Text(message.encode())).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message {
            topic: "/topic/chat/3".to_owned(),
            body: r#"{"id":9}"#.to_owned(),
        }
    );
}

#[tokio::test]
async fn outbound_messages_are_published_as_send_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let broker = async {
        let mut ws = accept_session(&listener).await;
        drain_global_subscriptions(&mut ws).await;
        ws
    };
    let (client, mut ws) = tokio::join!(connect(test_config(&url), "token-1"), broker);
    let (handle, _events) = client.unwrap();

    let message = InstantMessage {
        content: "salut".into(),
        sender: 7,
        receiver: 8,
        message_type: MessageType::Text,
    };
    handle.send_message(3, &message);

    let frame = read_frame(&mut ws).await;
    assert_eq!(frame.command, Command::Send);
    assert_eq!(frame.get("destination"), Some("/app/chat.message"));
    let sent: InstantMessage = serde_json::from_str(&frame.body).unwrap();
    assert_eq!(sent.content, "salut");
    assert_eq!(sent.receiver, 8);
}

#[tokio::test]
async fn dropped_connection_reconnects_with_a_fresh_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let broker = async {
        let mut ws = accept_session(&listener).await;
        drain_global_subscriptions(&mut ws).await;
        ws
    };
    let (client, ws) = tokio::join!(connect(test_config(&url), "token-1"), broker);
    let (handle, mut events) = client.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Connected { reconnect: false }
    );

    drop(ws);

    assert_eq!(next_event(&mut events).await, TransportEvent::Disconnected);

    let mut ws = accept_session(&listener).await;
    let destinations = drain_global_subscriptions(&mut ws).await;
    assert!(destinations.contains(&"/topic/call/7".to_owned()));

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Connected { reconnect: true }
    );
    assert!(handle.is_connected());
}

#[tokio::test]
async fn reconnect_gives_up_after_max_attempts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let mut config = test_config(&url);
    config.reconnect_interval = Duration::from_millis(20);
    config.max_reconnect_attempts = 2;

    let broker = async {
        let mut ws = accept_session(&listener).await;
        drain_global_subscriptions(&mut ws).await;
        ws
    };
    let (client, ws) = tokio::join!(connect(config, "token-1"), broker);
    let (handle, mut events) = client.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Connected { reconnect: false }
    );

    // Close both the live socket and the listener so every attempt fails.
    drop(ws);
    drop(listener);

    assert_eq!(next_event(&mut events).await, TransportEvent::Disconnected);
    assert_eq!(next_event(&mut events).await, TransportEvent::ReconnectFailed);
    assert!(!handle.is_connected());

    // The task is gone; the event channel must be closed.
    let end = timeout(WAIT, events.recv())
        .await
        .expect("transport task did not stop");
    assert_eq!(end, None);
}

#[tokio::test]
async fn disconnect_stops_the_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let broker = async {
        let mut ws = accept_session(&listener).await;
        drain_global_subscriptions(&mut ws).await;
        ws
    };
    let (client, mut ws) = tokio::join!(connect(test_config(&url), "token-1"), broker);
    let (handle, mut events) = client.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Connected { reconnect: false }
    );

    handle.disconnect();

    let frame = read_frame(&mut ws).await;
    assert_eq!(frame.command, Command::Disconnect);
    assert!(!handle.is_connected());

    // No reconnection attempts follow a requested disconnect.
    let end = timeout(WAIT, events.recv())
        .await
        .expect("transport task did not stop");
    assert_eq!(end, None);
}
