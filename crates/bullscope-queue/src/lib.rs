//! BullMQ queue store access over Redis.
//!
//! This crate provides:
//! - The [`QueueStore`] boundary used by the monitor
//! - Connection lifecycle with bounded connect timeout
//! - Queue discovery from metadata keys
//! - Concurrent per-queue count polling
//! - Job listing, lookup and logs
//! - Per-queue event streams with listener fan-out

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod jobs;
pub mod keys;
pub mod poller;
pub mod registry;
pub mod store;

pub use config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PREFIX};
pub use connection::RedisQueueStore;
pub use error::{QueueError, QueueResult};
pub use events::{normalize_event, EventFanout, EventSubscriber};
pub use jobs::job_from_hash;
pub use keys::{KeyScheme, QueueKeys};
pub use poller::{poll_queues, split_polls, QueuePoll};
pub use registry::queue_names_from_keys;
pub use store::{EventListener, ListenerId, QueueStore};
