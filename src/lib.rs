//! Live push delivery: WebSocket sessions held per instance plus a shared
//! broadcast channel so a push reaches its user on whichever instance holds
//! the socket.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pubsub;
pub mod routes;
pub mod state;
pub mod websocket;
