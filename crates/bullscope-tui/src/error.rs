//! Dashboard error types.

use thiserror::Error;

pub type TuiResult<T> = Result<T, TuiError>;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("Terminal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] bullscope_queue::QueueError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TuiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
