use super::channel::BroadcastChannel;
use super::envelope::{BroadcastEnvelope, InstanceId};
use crate::error::PushResult;
use crate::metrics;
use crate::websocket::LocalDispatcher;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// What the subscriber did with one channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Malformed,
    SelfOriginated,
    NotConnected,
    Delivered,
    SendFailed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::SelfOriginated => "self_originated",
            Self::NotConnected => "not_connected",
            Self::Delivered => "delivered",
            Self::SendFailed => "send_failed",
        }
    }
}

/// Receives envelopes from every instance and hands the ones addressed to
/// locally connected users to the dispatcher.
#[derive(Clone)]
pub struct BroadcastSubscriber {
    dispatcher: LocalDispatcher,
    instance_id: InstanceId,
}

impl BroadcastSubscriber {
    pub fn new(dispatcher: LocalDispatcher, instance_id: InstanceId) -> Self {
        Self {
            dispatcher,
            instance_id,
        }
    }

    /// Processes one raw channel message. Never fails.
    pub fn handle_payload(&self, raw: &str) -> DeliveryOutcome {
        let outcome = self.deliver(raw);
        metrics::record_delivery(outcome.as_str());
        outcome
    }

    fn deliver(&self, raw: &str) -> DeliveryOutcome {
        let envelope = match BroadcastEnvelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode broadcast envelope");
                return DeliveryOutcome::Malformed;
            }
        };

        let target_user_id = envelope.target_user_id;

        // Already delivered by the publisher on this instance.
        if envelope.is_from(&self.instance_id) {
            tracing::debug!(target_user_id, "Skipping self-originated envelope");
            return DeliveryOutcome::SelfOriginated;
        }

        if !self.dispatcher.is_online(target_user_id) {
            tracing::debug!(
                target_user_id,
                origin = %envelope.origin_instance_id,
                "Target not connected to this instance"
            );
            return DeliveryOutcome::NotConnected;
        }

        if self.dispatcher.send_value(target_user_id, &envelope.payload) {
            tracing::debug!(
                target_user_id,
                origin = %envelope.origin_instance_id,
                "Delivered broadcast envelope"
            );
            DeliveryOutcome::Delivered
        } else {
            DeliveryOutcome::SendFailed
        }
    }

    /// Subscribes to `channel` and processes messages on a background task.
    ///
    /// The first subscription is made before returning so startup fails loudly
    /// when the channel is unreachable. Later drops are retried with backoff.
    pub async fn spawn(self, channel: Arc<dyn BroadcastChannel>) -> PushResult<JoinHandle<()>> {
        let mut stream = channel.subscribe().await?;
        tracing::info!(
            channel = channel.name(),
            instance_id = %self.instance_id,
            "Broadcast subscriber started"
        );

        let handle = tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                while let Some(raw) = stream.next().await {
                    self.handle_payload(&raw);
                    backoff = INITIAL_BACKOFF;
                }

                tracing::warn!(
                    channel = channel.name(),
                    "Broadcast subscription ended, resubscribing"
                );

                loop {
                    tokio::time::sleep(backoff).await;
                    match channel.subscribe().await {
                        Ok(next) => {
                            tracing::info!(
                                channel = channel.name(),
                                "Broadcast subscription restored"
                            );
                            stream = next;
                            break;
                        }
                        Err(e) => {
                            tracing::error!(
                                channel = channel.name(),
                                error = %e,
                                retry_in_secs = backoff.as_secs(),
                                "Failed to resubscribe"
                            );
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        });

        Ok(handle)
    }
}
