use super::channel::BroadcastChannel;
use super::envelope::{BroadcastEnvelope, InstanceId};
use crate::error::PushResult;
use crate::metrics;
use crate::websocket::{LocalDispatcher, UserId};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of one publish, for callers that choose to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// The target was connected here and got the payload directly.
    pub delivered_locally: bool,
    /// Subscriber count reported by the channel.
    pub receivers: usize,
}

/// Emits push messages to every instance.
///
/// If the target is connected to this process it is delivered immediately;
/// the envelope is then published regardless so other instances holding the
/// user get it too. Our own subscriber drops the echo.
#[derive(Clone)]
pub struct BroadcastPublisher {
    channel: Arc<dyn BroadcastChannel>,
    dispatcher: LocalDispatcher,
    instance_id: InstanceId,
}

impl BroadcastPublisher {
    pub fn new(
        channel: Arc<dyn BroadcastChannel>,
        dispatcher: LocalDispatcher,
        instance_id: InstanceId,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            instance_id,
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Fire-and-forget publish. Never blocks on the channel and never fails;
    /// anything that goes wrong is logged and the message is dropped.
    pub fn publish<T: Serialize + ?Sized>(&self, target_user_id: UserId, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    target_user_id,
                    error = %e,
                    "Failed to serialize push payload, dropping"
                );
                metrics::record_publish_failure("serialization");
                return;
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!(target_user_id, "No async runtime available, dropping push");
                metrics::record_publish_failure("no_runtime");
                return;
            }
        };

        let publisher = self.clone();
        handle.spawn(async move {
            // Failures are logged inside.
            let _ = publisher.publish_value(target_user_id, payload).await;
        });
    }

    /// Awaitable variant of [`publish`](Self::publish).
    pub async fn try_publish<T: Serialize + ?Sized>(
        &self,
        target_user_id: UserId,
        payload: &T,
    ) -> PushResult<PublishReport> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            metrics::record_publish_failure("serialization");
            e
        })?;
        self.publish_value(target_user_id, payload).await
    }

    async fn publish_value(
        &self,
        target_user_id: UserId,
        payload: Value,
    ) -> PushResult<PublishReport> {
        let envelope =
            BroadcastEnvelope::new(target_user_id, payload, self.instance_id.clone())
                .and_then(|envelope| envelope.to_json().map(|wire| (envelope, wire)));
        let (envelope, wire) = match envelope {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(
                    target_user_id,
                    error = %e,
                    "Failed to build broadcast envelope, dropping"
                );
                metrics::record_publish_failure("serialization");
                return Err(e);
            }
        };

        let delivered_locally = self.dispatcher.is_online(target_user_id)
            && self.dispatcher.send_value(target_user_id, &envelope.payload);
        if delivered_locally {
            metrics::record_delivery("delivered_local");
        }

        match self.channel.publish(wire).await {
            Ok(receivers) => {
                metrics::record_published();
                tracing::debug!(
                    target_user_id,
                    instance_id = %self.instance_id,
                    channel = self.channel.name(),
                    receivers,
                    delivered_locally,
                    "Broadcast envelope published"
                );
                Ok(PublishReport {
                    delivered_locally,
                    receivers,
                })
            }
            Err(e) => {
                tracing::error!(
                    target_user_id,
                    channel = self.channel.name(),
                    error = %e,
                    "Failed to publish broadcast envelope"
                );
                metrics::record_publish_failure("channel");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::channel::InMemoryBroadcastChannel;
    use crate::websocket::{Connection, ConnectionRegistry, Outbound};
    use futures_util::StreamExt;
    use serde_json::json;
    use std::collections::HashMap;

    fn publisher_with(
        registry: &ConnectionRegistry,
    ) -> (BroadcastPublisher, InMemoryBroadcastChannel) {
        let channel = InMemoryBroadcastChannel::new("test");
        let publisher = BroadcastPublisher::new(
            Arc::new(channel.clone()),
            LocalDispatcher::new(registry.clone()),
            InstanceId::from("instance-a"),
        );
        (publisher, channel)
    }

    #[tokio::test]
    async fn test_envelope_is_tagged_with_origin() {
        let registry = ConnectionRegistry::new();
        let (publisher, channel) = publisher_with(&registry);
        let mut stream = channel.subscribe().await.unwrap();

        let report = publisher
            .try_publish(42, &json!({"type": "x", "v": 1}))
            .await
            .unwrap();
        assert!(!report.delivered_locally);
        assert_eq!(report.receivers, 1);

        let raw = stream.next().await.unwrap();
        let envelope = BroadcastEnvelope::from_json(&raw).unwrap();
        assert_eq!(envelope.target_user_id, 42);
        assert_eq!(envelope.origin_instance_id.as_str(), "instance-a");
        assert_eq!(envelope.payload, json!({"type": "x", "v": 1}));
    }

    #[tokio::test]
    async fn test_local_target_is_delivered_directly() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = Connection::open(42);
        registry.register(conn);
        let (publisher, _channel) = publisher_with(&registry);

        let report = publisher
            .try_publish(42, &json!({"type": "x", "v": 1}))
            .await
            .unwrap();
        assert!(report.delivered_locally);

        let Some(Outbound::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"type": "x", "v": 1})
        );
    }

    #[tokio::test]
    async fn test_unserializable_payload_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (publisher, channel) = publisher_with(&registry);
        let mut stream = channel.subscribe().await.unwrap();

        // Non-string map keys cannot become a JSON object.
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);

        publisher.publish(42, &bad);
        assert!(publisher.try_publish(42, &bad).await.is_err());
        assert!(publisher.try_publish(42, &json!("not an object")).await.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(futures_util::FutureExt::now_or_never(stream.next()).is_none());
    }

    #[test]
    fn test_publish_outside_runtime_does_not_panic() {
        let registry = ConnectionRegistry::new();
        let (publisher, _channel) = publisher_with(&registry);
        publisher.publish(42, &json!({"type": "x"}));
    }
}
