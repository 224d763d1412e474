//! Shared broadcast channel between instances.
//!
//! ```text
//! instance A: PUBLISH realtime:push {"targetUserId":42,...}
//!      |
//! Redis Pub/Sub (fan-out to every subscriber)
//!      |
//! instance A, B, C: subscriber callback -> local dispatcher
//! ```

use crate::error::PushResult;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};

/// Capacity of the in-process channel. Subscribers that fall further behind
/// skip messages, which matches the best-effort contract.
const IN_MEMORY_CAPACITY: usize = 1024;

/// A named fan-out channel carrying serialized broadcast envelopes.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Emits one payload. Returns how many subscribers the transport reported.
    async fn publish(&self, payload: String) -> PushResult<usize>;

    /// Opens a new subscription. The stream ends when the transport drops it.
    async fn subscribe(&self) -> PushResult<BoxStream<'static, String>>;
}

/// Redis Pub/Sub backed channel.
///
/// Publishing goes through a shared `ConnectionManager`; each subscription
/// gets its own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisBroadcastChannel {
    client: Client,
    publisher: ConnectionManager,
    channel: String,
}

impl RedisBroadcastChannel {
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> PushResult<Self> {
        let client = Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;

        Ok(Self {
            client,
            publisher,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl BroadcastChannel for RedisBroadcastChannel {
    fn name(&self) -> &str {
        &self.channel
    }

    async fn publish(&self, payload: String) -> PushResult<usize> {
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(&self.channel, payload).await?;
        Ok(receivers)
    }

    async fn subscribe(&self) -> PushResult<BoxStream<'static, String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = self.channel.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(
                            error = ?e,
                            channel = %channel,
                            "Failed to get message payload"
                        );
                        continue;
                    }
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }

            tracing::debug!(channel = %channel, "Redis pub/sub reader stopped");
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Process-local channel for single-instance deployments and tests.
///
/// Instances sharing one value behave like instances sharing one Redis.
#[derive(Clone)]
pub struct InMemoryBroadcastChannel {
    sender: broadcast::Sender<String>,
    channel: String,
}

impl InMemoryBroadcastChannel {
    pub fn new(channel: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(IN_MEMORY_CAPACITY);
        Self {
            sender,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl BroadcastChannel for InMemoryBroadcastChannel {
    fn name(&self) -> &str {
        &self.channel
    }

    async fn publish(&self, payload: String) -> PushResult<usize> {
        // Err only means nobody is subscribed yet.
        Ok(self.sender.send(payload).unwrap_or(0))
    }

    async fn subscribe(&self) -> PushResult<BoxStream<'static, String>> {
        let channel = self.channel.clone();
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(payload) => Some(payload),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            channel = %channel,
                            skipped,
                            "Subscriber lagged, messages skipped"
                        );
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}
