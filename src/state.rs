use crate::{
    config::{BroadcastBackend, Config},
    error::PushResult,
    metrics,
    pubsub::{
        BroadcastChannel, BroadcastPublisher, BroadcastSubscriber, InMemoryBroadcastChannel,
        InstanceId, RedisBroadcastChannel,
    },
    websocket::{ConnectionRegistry, LocalDispatcher},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Origin tag for every envelope this process publishes.
    pub instance_id: InstanceId,
    pub registry: ConnectionRegistry,
    pub dispatcher: LocalDispatcher,
    pub publisher: BroadcastPublisher,
    pub channel: Arc<dyn BroadcastChannel>,
}

impl AppState {
    /// Connects the configured broadcast backend and wires the components.
    pub async fn build(config: Config) -> PushResult<Self> {
        let channel: Arc<dyn BroadcastChannel> = match config.broadcast_backend {
            BroadcastBackend::Redis => Arc::new(
                RedisBroadcastChannel::connect(&config.redis_url, config.broadcast_channel.clone())
                    .await?,
            ),
            BroadcastBackend::Memory => {
                tracing::warn!("Using in-memory broadcast channel; pushes stay on this instance");
                Arc::new(InMemoryBroadcastChannel::new(config.broadcast_channel.clone()))
            }
        };
        Ok(Self::with_channel(config, channel))
    }

    pub fn with_channel(config: Config, channel: Arc<dyn BroadcastChannel>) -> Self {
        let instance_id = config
            .instance_id
            .clone()
            .map(InstanceId::from)
            .unwrap_or_else(InstanceId::generate);

        let registry = ConnectionRegistry::new();
        let dispatcher = LocalDispatcher::new(registry.clone());
        let publisher =
            BroadcastPublisher::new(channel.clone(), dispatcher.clone(), instance_id.clone());

        tracing::info!(
            instance_id = %instance_id,
            channel = channel.name(),
            "Push state initialized"
        );

        Self {
            config: Arc::new(config),
            instance_id,
            registry,
            dispatcher,
            publisher,
            channel,
        }
    }

    pub fn subscriber(&self) -> BroadcastSubscriber {
        BroadcastSubscriber::new(self.dispatcher.clone(), self.instance_id.clone())
    }

    /// Closes every connection still registered. Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        let connections = self.registry.drain();
        let closed = connections.iter().filter(|conn| conn.close()).count();
        metrics::set_open_connections(self.registry.online_count());
        tracing::info!(closed, "Closed remaining WebSocket connections");
        closed
    }
}
