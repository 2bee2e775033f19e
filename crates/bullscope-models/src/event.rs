//! Normalized queue events.
//!
//! Every raw event shape emitted by the store is mapped onto a single
//! [`QueueEvent`] envelope whose [`QueueEventKind`] carries the
//! kind-specific payload, if any.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kind with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEventKind {
    Waiting,
    Active,
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        return_value: Option<Value>,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failed_reason: Option<String>,
    },
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Stalled,
    Removed,
    /// The queue ran out of waiting jobs
    Drained,
}

impl QueueEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEventKind::Waiting => "waiting",
            QueueEventKind::Active => "active",
            QueueEventKind::Completed { .. } => "completed",
            QueueEventKind::Failed { .. } => "failed",
            QueueEventKind::Progress { .. } => "progress",
            QueueEventKind::Stalled => "stalled",
            QueueEventKind::Removed => "removed",
            QueueEventKind::Drained => "drained",
        }
    }
}

/// An advisory event observed on a queue's push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    /// What happened
    #[serde(flatten)]
    pub kind: QueueEventKind,
    /// Queue the event belongs to
    pub queue: String,
    /// Job id, empty for queue-wide events
    pub job_id: String,
    /// When the event was captured locally
    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    /// Create an event captured now.
    pub fn new(queue: impl Into<String>, job_id: impl Into<String>, kind: QueueEventKind) -> Self {
        Self {
            kind,
            queue: queue.into(),
            job_id: job_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// True for events that do not refer to a single job.
    pub fn is_queue_wide(&self) -> bool {
        self.job_id.is_empty()
    }
}
