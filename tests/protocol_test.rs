//! Connection lifecycle driven through the protocol handler, without a socket.

use realtime_push_service::websocket::{
    CloseReason, Connection, ConnectionRegistry, ConnectionState, FrameOutcome, Outbound,
    ProtocolHandler,
};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};

fn open(
    registry: &ConnectionRegistry,
    user_id: i64,
) -> (ProtocolHandler, UnboundedReceiver<Outbound>) {
    let (conn, rx) = Connection::open(user_id);
    let mut handler = ProtocolHandler::new(registry.clone(), conn);
    assert_ok!(handler.open());
    (handler, rx)
}

fn next_json(rx: &mut UnboundedReceiver<Outbound>) -> Value {
    match rx.try_recv() {
        Ok(Outbound::Text(text)) => serde_json::from_str(&text).expect("frame is JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[test]
fn test_open_registers_and_acknowledges() {
    let registry = ConnectionRegistry::new();
    let (handler, mut rx) = open(&registry, 42);

    assert_eq!(handler.state(), ConnectionState::Open);
    assert!(registry.is_online(42));

    let ack = next_json(&mut rx);
    assert_eq!(ack["type"], "connected");
    assert_eq!(ack["userId"], 42);
    assert!(ack["timestamp"].is_i64());
}

#[test]
fn test_heartbeat_gets_exactly_one_pong() {
    let registry = ConnectionRegistry::new();
    let (mut handler, mut rx) = open(&registry, 42);
    next_json(&mut rx);

    assert_eq!(handler.handle_text(r#"{"type":"heartbeat"}"#), FrameOutcome::Replied);
    assert_eq!(next_json(&mut rx), json!({"type": "heartbeat", "message": "pong"}));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_unknown_and_malformed_frames_keep_connection_open() {
    let registry = ConnectionRegistry::new();
    let (mut handler, mut rx) = open(&registry, 42);
    next_json(&mut rx);

    assert_eq!(handler.handle_text(r#"{"type":"typing"}"#), FrameOutcome::Ignored);
    assert_eq!(handler.handle_text("{not json"), FrameOutcome::Malformed);
    assert_eq!(handler.handle_text(r#"{"no_type":1}"#), FrameOutcome::Malformed);

    assert!(rx.try_recv().is_err());
    assert_eq!(handler.state(), ConnectionState::Open);
    assert!(registry.is_online(42));
}

#[test]
fn test_reconnect_supersedes_and_stale_close_is_harmless() {
    let registry = ConnectionRegistry::new();
    let (mut first, mut rx1) = open(&registry, 42);
    let (second, mut rx2) = open(&registry, 42);

    assert_eq!(
        registry.lookup(42).map(|c| c.id()),
        Some(second.connection().id())
    );

    // The superseded socket is told to close.
    next_json(&mut rx1);
    assert_eq!(rx1.try_recv().unwrap(), Outbound::Close);

    assert!(first.close(CloseReason::ServerClosed));
    assert_eq!(
        registry.lookup(42).map(|c| c.id()),
        Some(second.connection().id())
    );
    assert!(registry.is_online(42));
    assert_eq!(next_json(&mut rx2)["type"], "connected");
}

#[test]
fn test_close_is_idempotent_and_unregisters() {
    let registry = ConnectionRegistry::new();
    let (mut handler, _rx) = open(&registry, 42);

    assert!(handler.close(CloseReason::ClientClosed));
    assert!(!handler.close(CloseReason::TransportError));
    assert_eq!(handler.state(), ConnectionState::Closed);
    assert!(!registry.is_online(42));
    assert_eq!(
        handler.handle_text(r#"{"type":"heartbeat"}"#),
        FrameOutcome::NotOpen
    );
    assert_err!(handler.open());
}

#[test]
fn test_user_can_reconnect_after_close() {
    let registry = ConnectionRegistry::new();
    let (mut first, _rx1) = open(&registry, 42);
    first.close(CloseReason::HeartbeatTimeout);
    assert!(!registry.is_online(42));

    let (second, mut rx2) = open(&registry, 42);
    assert!(registry.is_online(42));
    assert_eq!(second.state(), ConnectionState::Open);
    assert_eq!(next_json(&mut rx2)["type"], "connected");
}
