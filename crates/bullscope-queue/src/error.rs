//! Queue error types.

use std::time::Duration;

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(
        "Connection timeout: could not connect to {host}:{port} within {}",
        format_timeout(.timeout)
    )]
    ConnectionTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("Connection refused by {host}:{port}: {message}")]
    ConnectionRefused {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Not connected to Redis")]
    NotConnected,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error means the link to the store is gone.
    pub fn is_connection_error(&self) -> bool {
        match self {
            QueueError::ConnectionTimeout { .. }
            | QueueError::ConnectionRefused { .. }
            | QueueError::NotConnected => true,
            QueueError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            _ => false,
        }
    }
}

/// Whole seconds as "5s", anything finer in milliseconds.
fn format_timeout(timeout: &Duration) -> String {
    if timeout.subsec_millis() == 0 && timeout.as_secs() > 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}
