//! Per-queue counts and pause state.

use serde::{Deserialize, Serialize};

use crate::JobState;

/// Number of jobs in each tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: u64,
    pub prioritized: u64,
}

impl JobCounts {
    /// Count for a single state.
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Active => self.active,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Delayed => self.delayed,
            JobState::Paused => self.paused,
            JobState::Prioritized => self.prioritized,
        }
    }

    /// Set the count for a single state.
    pub fn set(&mut self, state: JobState, value: u64) {
        let slot = match state {
            JobState::Waiting => &mut self.waiting,
            JobState::Active => &mut self.active,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Delayed => &mut self.delayed,
            JobState::Paused => &mut self.paused,
            JobState::Prioritized => &mut self.prioritized,
        };
        *slot = value;
    }

    /// Sum across all tracked states.
    pub fn total(&self) -> u64 {
        JobState::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// Snapshot of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Queue name
    pub name: String,
    /// Counts per job state
    pub counts: JobCounts,
    /// Whether the queue is paused
    pub is_paused: bool,
}

impl QueueInfo {
    /// Create a snapshot with zero counts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counts: JobCounts::default(),
            is_paused: false,
        }
    }
}
