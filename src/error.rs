use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type PushResult<T> = Result<T, PushError>;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),
}

/// Reasons a WebSocket upgrade is refused before anything is registered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing userId query parameter")]
    MissingUserId,

    #[error("invalid userId: {0:?}")]
    InvalidUserId(String),
}

impl PushError {
    pub fn status_code(&self) -> u16 {
        match self {
            PushError::InvalidMessage(_) | PushError::Serialization(_) => 400,
            PushError::ConnectionClosed | PushError::Redis(_) => 503,
            _ => 500,
        }
    }
}

impl ResponseError for PushError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(PushError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(ResponseError::status_code(self)).json(json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

impl ResponseError for HandshakeError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}
