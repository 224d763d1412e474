use super::connection::UserId;
use super::message_types::OutboundMessage;
use super::registry::ConnectionRegistry;
use serde_json::Value;

/// Delivers payloads to connections held by this process.
///
/// Every failure here is absorbed: a closed socket or an unserializable
/// payload is logged and reported as `false`, never raised to the caller.
#[derive(Clone)]
pub struct LocalDispatcher {
    registry: ConnectionRegistry,
}

impl LocalDispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.registry.is_online(user_id)
    }

    pub fn send(&self, user_id: UserId, message: &OutboundMessage) -> bool {
        match message.to_json() {
            Ok(text) => self.send_text(user_id, text),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to serialize outbound message");
                false
            }
        }
    }

    /// Forwards an already-decoded JSON payload verbatim.
    pub fn send_value(&self, user_id: UserId, payload: &Value) -> bool {
        match serde_json::to_string(payload) {
            Ok(text) => self.send_text(user_id, text),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to serialize payload");
                false
            }
        }
    }

    fn send_text(&self, user_id: UserId, text: String) -> bool {
        let Some(connection) = self.registry.lookup(user_id) else {
            tracing::debug!(user_id, "No local connection, dropping push");
            return false;
        };

        match connection.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    user_id,
                    connection_id = %connection.id(),
                    error = %e,
                    "Push to local connection failed"
                );
                false
            }
        }
    }
}
