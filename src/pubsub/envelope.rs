use crate::error::{PushError, PushResult};
use crate::websocket::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identity of this process on the broadcast channel. Used only to recognise
/// our own echoes, never for addressing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn generate() -> Self {
        Self(format!("instance-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire object on the shared channel:
/// `{"targetUserId": 42, "message": {...}, "sourceInstanceId": "instance-..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    #[serde(rename = "targetUserId")]
    pub target_user_id: UserId,
    #[serde(rename = "message")]
    pub payload: Value,
    #[serde(rename = "sourceInstanceId")]
    pub origin_instance_id: InstanceId,
}

impl BroadcastEnvelope {
    pub fn new(target_user_id: UserId, payload: Value, origin: InstanceId) -> PushResult<Self> {
        if !payload.is_object() {
            return Err(PushError::InvalidMessage(
                "broadcast payload must be a JSON object".to_string(),
            ));
        }
        Ok(Self {
            target_user_id,
            payload,
            origin_instance_id: origin,
        })
    }

    pub fn is_from(&self, instance_id: &InstanceId) -> bool {
        &self.origin_instance_id == instance_id
    }

    pub fn to_json(&self) -> PushResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> PushResult<Self> {
        let envelope: Self = serde_json::from_str(raw)?;
        if !envelope.payload.is_object() {
            return Err(PushError::InvalidMessage(
                "broadcast payload must be a JSON object".to_string(),
            ));
        }
        Ok(envelope)
    }
}
