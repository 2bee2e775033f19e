//! Shared data models for the bullscope queue monitor.
//!
//! This crate provides Serde-serializable types for:
//! - Job states, job snapshots and job logs
//! - Per-queue counts and pause state
//! - Normalized queue events
//! - Connection lifecycle state

pub mod connection;
pub mod event;
pub mod job;
pub mod queue;

// Re-export common types
pub use connection::ConnectionState;
pub use event::{QueueEvent, QueueEventKind};
pub use job::{JobInfo, JobLogs, JobState, ParseJobStateError};
pub use queue::{JobCounts, QueueInfo};
