use super::connection::UserId;
use crate::error::{PushError, PushResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const TYPE_CONNECTED: &str = "connected";
pub const TYPE_HEARTBEAT: &str = "heartbeat";
pub const TYPE_PRIVATE_MESSAGE: &str = "private_message";
pub const TYPE_AUDIT_RESULT: &str = "audit_result";

/// Inbound frames from client to server.
///
/// Only `heartbeat` is acted on; every other `type` lands in `Other` and is
/// ignored by this layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(other)]
    Other,
}

impl InboundMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Outbound frame pushed to a client: `{"type": ..., ...fields}`.
///
/// Application payloads arriving over the broadcast channel are forwarded
/// verbatim, so `fields` is an open map rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "type" {
            self.fields.insert(key, value);
        }
        self
    }

    /// Handshake acknowledgement.
    pub fn connected(user_id: UserId) -> Self {
        Self::new(TYPE_CONNECTED)
            .with_field("userId", json!(user_id))
            .with_field("message", json!("connected"))
            .with_field("timestamp", json!(chrono::Utc::now().timestamp_millis()))
    }

    /// Reply to a client `heartbeat` frame.
    pub fn heartbeat_pong() -> Self {
        Self::new(TYPE_HEARTBEAT).with_field("message", json!("pong"))
    }

    /// A private message from one user to another.
    pub fn private_message(
        message_id: i64,
        from_user_id: UserId,
        to_user_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self::new(TYPE_PRIVATE_MESSAGE)
            .with_field("messageId", json!(message_id))
            .with_field("fromUserId", json!(from_user_id))
            .with_field("toUserId", json!(to_user_id))
            .with_field("content", json!(content.into()))
            .with_field("createdAt", json!(chrono::Utc::now().to_rfc3339()))
    }

    /// Moderation outcome for a piece of user content.
    pub fn audit_result(note_id: i64, approved: bool, reason: Option<&str>) -> Self {
        let mut msg = Self::new(TYPE_AUDIT_RESULT)
            .with_field("noteId", json!(note_id))
            .with_field(
                "status",
                json!(if approved { "approved" } else { "rejected" }),
            )
            .with_field("timestamp", json!(chrono::Utc::now().timestamp_millis()));
        if let Some(reason) = reason {
            msg = msg.with_field("reason", json!(reason));
        }
        msg
    }

    /// Builds a message from an arbitrary JSON object carrying a string `type`.
    pub fn from_value(value: Value) -> PushResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(PushError::InvalidMessage(
                "payload must be a JSON object".to_string(),
            ));
        };
        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => {
                return Err(PushError::InvalidMessage(
                    "payload `type` must be a string".to_string(),
                ))
            }
            None => {
                return Err(PushError::InvalidMessage(
                    "payload is missing `type`".to_string(),
                ))
            }
        };
        Ok(Self { kind, fields: map })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert("type".to_string(), Value::String(self.kind.clone()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}
