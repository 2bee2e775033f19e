//! Store boundary used by the monitor.
//!
//! [`QueueStore`] is the seam between the sync engine and the backing store.
//! [`crate::RedisQueueStore`] implements it against a live Redis; tests
//! substitute an in-memory store.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use bullscope_models::{ConnectionState, JobInfo, JobLogs, JobState, QueueEvent, QueueInfo};

use crate::error::QueueResult;

/// Callback invoked for every event on a subscribed queue.
pub type EventListener = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// Handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Read-mostly access to a queue store.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Establish the connection. Fails fast, never retries.
    async fn connect(&self) -> QueueResult<()>;

    /// Close event channels, queue handles and the base connection, in that
    /// order. Idempotent and infallible.
    async fn disconnect(&self);

    /// Tear down the current connection completely, then connect again.
    async fn reconnect(&self) -> QueueResult<()> {
        self.disconnect().await;
        self.connect().await
    }

    async fn connection_state(&self) -> ConnectionState;

    /// Sorted, de-duplicated queue names found in the store.
    async fn discover_queues(&self) -> QueueResult<Vec<String>>;

    /// Counts and pause flag for one queue.
    async fn queue_info(&self, queue: &str) -> QueueResult<QueueInfo>;

    /// Jobs of one state, positions `start..=end` in store order.
    async fn list_jobs(
        &self,
        queue: &str,
        state: JobState,
        start: usize,
        end: usize,
    ) -> QueueResult<Vec<JobInfo>>;

    /// A single job, or `None` when it does not exist.
    async fn get_job(&self, queue: &str, id: &str) -> QueueResult<Option<JobInfo>>;

    async fn job_logs(&self, queue: &str, id: &str) -> QueueResult<JobLogs>;

    /// Register a listener, opening the queue's event channel on first use.
    async fn subscribe(&self, queue: &str, listener: EventListener) -> QueueResult<ListenerId>;

    /// Remove one listener. The channel stays open.
    async fn unsubscribe(&self, queue: &str, id: ListenerId) -> bool;
}
