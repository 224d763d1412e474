//! Per-connection protocol state machine.
//!
//! `Connecting -> Open -> Closed`. The actix session drives it; it is kept
//! free of actix types so it can be exercised directly.

use super::connection::{Connection, UserId};
use super::message_types::{InboundMessage, OutboundMessage};
use super::registry::ConnectionRegistry;
use crate::error::{HandshakeError, PushError, PushResult};
use crate::metrics;
use actix_web::web;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    TransportError,
    HeartbeatTimeout,
    ServerClosed,
}

/// What happened to one inbound text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Replied,
    ReplyFailed,
    Ignored,
    Malformed,
    NotOpen,
}

#[derive(Debug, Deserialize)]
struct HandshakeParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// Extracts `userId=<integer>` from the upgrade request's query string.
pub fn parse_user_id(query: &str) -> Result<UserId, HandshakeError> {
    let params = web::Query::<HandshakeParams>::from_query(query)
        .map_err(|_| HandshakeError::InvalidUserId(query.to_string()))?
        .into_inner();

    let raw = params.user_id.ok_or(HandshakeError::MissingUserId)?;
    raw.trim()
        .parse::<UserId>()
        .map_err(|_| HandshakeError::InvalidUserId(raw))
}

pub struct ProtocolHandler {
    registry: ConnectionRegistry,
    connection: Connection,
    state: ConnectionState,
}

impl ProtocolHandler {
    pub fn new(registry: ConnectionRegistry, connection: Connection) -> Self {
        Self {
            registry,
            connection,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn user_id(&self) -> UserId {
        self.connection.user_id()
    }

    /// Registers the connection and acknowledges the handshake.
    ///
    /// A connection previously registered for the same user is closed here;
    /// its own close path then finds the entry taken and leaves it alone.
    pub fn open(&mut self) -> PushResult<()> {
        if self.state != ConnectionState::Connecting {
            return Err(PushError::InvalidMessage(format!(
                "cannot open a connection in state {:?}",
                self.state
            )));
        }

        let user_id = self.user_id();
        if let Some(previous) = self.registry.register(self.connection.clone()) {
            if previous.id() != self.connection.id() && previous.close() {
                tracing::info!(
                    user_id,
                    superseded = %previous.id(),
                    "Closing superseded connection"
                );
            }
        }
        self.state = ConnectionState::Open;
        metrics::set_open_connections(self.registry.online_count());

        let ack = OutboundMessage::connected(user_id).to_json()?;
        if let Err(e) = self.connection.send_text(ack) {
            tracing::warn!(user_id, error = %e, "Failed to send handshake acknowledgement");
            self.close(CloseReason::TransportError);
            return Err(e);
        }

        tracing::info!(
            user_id,
            connection_id = %self.connection.id(),
            "WebSocket connection opened"
        );
        Ok(())
    }

    /// Handles one inbound text frame. Decode failures never end the connection.
    pub fn handle_text(&mut self, text: &str) -> FrameOutcome {
        if self.state != ConnectionState::Open {
            return FrameOutcome::NotOpen;
        }

        match InboundMessage::from_json(text) {
            Ok(InboundMessage::Heartbeat) => {
                let reply = OutboundMessage::heartbeat_pong();
                let sent = reply
                    .to_json()
                    .map_err(PushError::from)
                    .and_then(|json| self.connection.send_text(json));
                match sent {
                    Ok(()) => FrameOutcome::Replied,
                    Err(e) => {
                        tracing::warn!(
                            user_id = self.user_id(),
                            error = %e,
                            "Heartbeat reply failed"
                        );
                        FrameOutcome::ReplyFailed
                    }
                }
            }
            Ok(InboundMessage::Other) => {
                tracing::debug!(user_id = self.user_id(), "Ignoring unhandled frame type");
                FrameOutcome::Ignored
            }
            Err(e) => {
                tracing::warn!(
                    user_id = self.user_id(),
                    error = %e,
                    "Failed to parse WS message"
                );
                FrameOutcome::Malformed
            }
        }
    }

    /// Moves to `Closed` and unregisters by this connection's own id.
    /// Returns false if already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        let was_open = self.state == ConnectionState::Open;
        self.state = ConnectionState::Closed;
        self.connection.mark_closed();

        if was_open {
            self.registry
                .unregister(self.user_id(), self.connection.id());
            metrics::set_open_connections(self.registry.online_count());
        }

        tracing::info!(
            user_id = self.user_id(),
            connection_id = %self.connection.id(),
            reason = ?reason,
            "WebSocket connection closed"
        );
        true
    }
}
