//! Connection lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the single store connection owned by the process.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No live connection
    #[default]
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Connected and answering PING
    Connected,
    /// The last connect attempt failed
    Error(String),
}

impl ConnectionState {
    /// Build an error state from any displayable error.
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ConnectionState::Error(_))
    }

    /// Error message, if the state carries one.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ConnectionState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error(_) => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Error(msg) => write!(f, "error: {}", msg),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
