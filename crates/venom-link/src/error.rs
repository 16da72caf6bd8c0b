//! Link error types.

use thiserror::Error;

/// Stream transport and decoding errors.
///
/// None of these escape `subscribe`/`unsubscribe`; the stream driver logs them
/// and either drops the frame or schedules a reconnect.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;
