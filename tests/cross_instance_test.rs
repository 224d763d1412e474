//! Two instances sharing one broadcast channel, the way two processes share
//! one Redis.

use realtime_push_service::config::Config;
use realtime_push_service::pubsub::{BroadcastChannel, InMemoryBroadcastChannel};
use realtime_push_service::state::AppState;
use realtime_push_service::websocket::{Connection, Outbound};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

struct Cluster {
    a: AppState,
    b: AppState,
    listeners: Vec<JoinHandle<()>>,
}

impl Cluster {
    async fn start() -> Self {
        let channel: Arc<dyn BroadcastChannel> =
            Arc::new(InMemoryBroadcastChannel::new("test:realtime:push"));
        let a = AppState::with_channel(Config::default(), channel.clone());
        let b = AppState::with_channel(Config::default(), channel.clone());

        let mut listeners = Vec::new();
        for state in [&a, &b] {
            listeners.push(
                state
                    .subscriber()
                    .spawn(channel.clone())
                    .await
                    .expect("subscribe"),
            );
        }

        Self { a, b, listeners }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for handle in &self.listeners {
            handle.abort();
        }
    }
}

fn connect(state: &AppState, user_id: i64) -> UnboundedReceiver<Outbound> {
    let (conn, rx) = Connection::open(user_id);
    state.registry.register(conn);
    rx
}

/// Collects frames until the socket has been quiet for a while.
async fn frames(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await {
        if let Outbound::Text(text) = item {
            out.push(serde_json::from_str(&text).expect("frame is JSON"));
        }
    }
    out
}

#[tokio::test]
async fn test_push_reaches_user_on_other_instance_once() {
    let cluster = Cluster::start().await;
    let mut on_b = connect(&cluster.b, 42);

    let report = cluster
        .a
        .publisher
        .try_publish(42, &json!({"type": "x", "v": 1}))
        .await
        .unwrap();
    assert!(!report.delivered_locally);

    assert_eq!(frames(&mut on_b).await, vec![json!({"type": "x", "v": 1})]);
    assert_eq!(cluster.a.registry.online_count(), 0);
}

#[tokio::test]
async fn test_origin_local_user_gets_no_duplicate() {
    let cluster = Cluster::start().await;
    let mut on_a = connect(&cluster.a, 42);

    cluster.a.publisher.publish(42, &json!({"type": "x", "v": 1}));

    assert_eq!(frames(&mut on_a).await, vec![json!({"type": "x", "v": 1})]);
}

#[tokio::test]
async fn test_user_on_both_instances_gets_one_frame_per_socket() {
    let cluster = Cluster::start().await;
    let mut on_a = connect(&cluster.a, 42);
    let mut on_b = connect(&cluster.b, 42);

    cluster.b.publisher.publish(42, &json!({"type": "x", "v": 2}));

    assert_eq!(frames(&mut on_a).await.len(), 1);
    assert_eq!(frames(&mut on_b).await.len(), 1);
}

#[tokio::test]
async fn test_interleaved_publishers_deliver_each_message_once() {
    let cluster = Cluster::start().await;
    let mut on_b = connect(&cluster.b, 42);

    for v in 0..10 {
        let from = if v % 2 == 0 { &cluster.a } else { &cluster.b };
        from.publisher
            .try_publish(42, &json!({"type": "x", "v": v}))
            .await
            .unwrap();
    }

    let received = frames(&mut on_b).await;
    assert_eq!(received.len(), 10);
    let seen: HashSet<i64> = received
        .iter()
        .map(|frame| frame["v"].as_i64().unwrap())
        .collect();
    assert_eq!(seen, (0..10).collect());
}

#[tokio::test]
async fn test_push_to_absent_user_is_dropped() {
    let cluster = Cluster::start().await;
    let mut on_a = connect(&cluster.a, 1);
    let mut on_b = connect(&cluster.b, 2);

    let report = cluster
        .a
        .publisher
        .try_publish(99, &json!({"type": "x"}))
        .await
        .unwrap();
    assert!(!report.delivered_locally);
    assert_eq!(report.receivers, 2);

    assert!(frames(&mut on_a).await.is_empty());
    assert!(frames(&mut on_b).await.is_empty());
}

#[tokio::test]
async fn test_closed_socket_is_not_written() {
    let cluster = Cluster::start().await;
    let (conn, mut rx) = Connection::open(42);
    cluster.b.registry.register(conn.clone());
    conn.close();
    assert_eq!(rx.recv().await, Some(Outbound::Close));

    cluster.a.publisher.publish(42, &json!({"type": "x"}));
    assert!(frames(&mut rx).await.is_empty());
}

#[tokio::test]
async fn test_shutdown_closes_sockets_and_stops_delivery() {
    let cluster = Cluster::start().await;
    let mut on_b = connect(&cluster.b, 42);

    assert_eq!(cluster.b.shutdown(), 1);
    assert_eq!(on_b.recv().await, Some(Outbound::Close));

    cluster.a.publisher.publish(42, &json!({"type": "x"}));
    assert!(frames(&mut on_b).await.is_empty());
}
