use crate::error::PushError;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which implementation carries broadcast envelopes between instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastBackend {
    /// Redis Pub/Sub, shared by every instance pointing at the same Redis.
    Redis,
    /// In-process only. A single instance without Redis.
    Memory,
}

impl FromStr for BroadcastBackend {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(BroadcastBackend::Redis),
            "memory" | "in-memory" => Ok(BroadcastBackend::Memory),
            other => Err(PushError::Config(format!(
                "PUSH_BROADCAST_BACKEND must be `redis` or `memory`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub path: String,
    /// How often the server pings each client.
    pub heartbeat_interval: Duration,
    /// A client silent for longer than this is disconnected.
    pub client_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub broadcast_channel: String,
    pub broadcast_backend: BroadcastBackend,
    /// Overrides the generated origin id. Must stay unique per process.
    pub instance_id: Option<String>,
    pub websocket: WebSocketConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            broadcast_channel: "realtime:push".to_string(),
            broadcast_backend: BroadcastBackend::Redis,
            instance_id: None,
            websocket: WebSocketConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, PushError> {
        dotenv().ok();
        let defaults = Config::default();

        let port = parse_var("PORT", defaults.port)?;
        let redis_url = env::var("REDIS_URL").unwrap_or(defaults.redis_url);
        let broadcast_channel =
            env::var("PUSH_BROADCAST_CHANNEL").unwrap_or(defaults.broadcast_channel);
        let broadcast_backend = match env::var("PUSH_BROADCAST_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.broadcast_backend,
        };
        let instance_id = env::var("INSTANCE_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let websocket = WebSocketConfig {
            path: env::var("WS_PATH").unwrap_or(defaults.websocket.path),
            heartbeat_interval: Duration::from_secs(parse_var(
                "WS_HEARTBEAT_INTERVAL_SECS",
                defaults.websocket.heartbeat_interval.as_secs(),
            )?),
            client_timeout: Duration::from_secs(parse_var(
                "WS_CLIENT_TIMEOUT_SECS",
                defaults.websocket.client_timeout.as_secs(),
            )?),
        };

        if websocket.client_timeout <= websocket.heartbeat_interval {
            return Err(PushError::Config(
                "WS_CLIENT_TIMEOUT_SECS must be greater than WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        Ok(Self {
            port,
            redis_url,
            broadcast_channel,
            broadcast_backend,
            instance_id,
            websocket,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, PushError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PushError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
