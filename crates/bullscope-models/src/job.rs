//! Job snapshots and job states.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Job state tracked by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued and waiting for a worker
    Waiting,
    /// Currently held by a worker
    #[default]
    Active,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Scheduled for later
    Delayed,
    /// Waiting in a paused queue
    Paused,
    /// Waiting with an explicit priority
    Prioritized,
}

impl JobState {
    /// Every state a queue reports a count for.
    pub const ALL: [JobState; 7] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Delayed,
        JobState::Paused,
        JobState::Prioritized,
    ];

    /// States offered as job-list filter tabs, in display order.
    pub const FILTER_TABS: [JobState; 5] = [
        JobState::Active,
        JobState::Waiting,
        JobState::Failed,
        JobState::Completed,
        JobState::Delayed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
            JobState::Paused => "paused",
            JobState::Prioritized => "prioritized",
        }
    }

    /// Short label used on filter tabs.
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Waiting => "Waiting",
            JobState::Active => "Active",
            JobState::Completed => "Done",
            JobState::Failed => "Failed",
            JobState::Delayed => "Delayed",
            JobState::Paused => "Paused",
            JobState::Prioritized => "Prioritized",
        }
    }

    /// Next filter tab, wrapping around.
    ///
    /// States that are not filter tabs move to the first tab.
    pub fn next_tab(self) -> Self {
        match Self::FILTER_TABS.iter().position(|s| *s == self) {
            Some(idx) => Self::FILTER_TABS[(idx + 1) % Self::FILTER_TABS.len()],
            None => Self::FILTER_TABS[0],
        }
    }

    /// Previous filter tab, wrapping around.
    pub fn prev_tab(self) -> Self {
        let len = Self::FILTER_TABS.len();
        match Self::FILTER_TABS.iter().position(|s| *s == self) {
            Some(idx) => Self::FILTER_TABS[(idx + len - 1) % len],
            None => Self::FILTER_TABS[0],
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown job state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown job state: {0}")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" | "wait" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" | "done" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "delayed" => Ok(JobState::Delayed),
            "paused" => Ok(JobState::Paused),
            "prioritized" => Ok(JobState::Prioritized),
            other => Err(ParseJobStateError(other.to_string())),
        }
    }
}

/// Read-only snapshot of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job id, unique within its queue
    pub id: String,
    /// Job name given by the producer
    pub name: String,
    /// Opaque payload
    #[serde(default)]
    pub data: Value,
    /// Opaque progress (number or structured value)
    #[serde(default)]
    pub progress: Value,
    /// Attempts made so far
    #[serde(default)]
    pub attempts_made: u32,
    /// When the job was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// When a worker started the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_on: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<DateTime<Utc>>,
    /// Failure reason (failed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    /// Stacktrace lines (failed jobs only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacktrace: Vec<String>,
    /// Return value (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
}

impl JobInfo {
    /// Create an empty snapshot for a job id.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data: Value::Null,
            progress: Value::Null,
            attempts_made: 0,
            timestamp: None,
            processed_on: None,
            finished_on: None,
            failed_reason: None,
            stacktrace: Vec::new(),
            return_value: None,
        }
    }

    /// True when the job carries failure information.
    pub fn has_error(&self) -> bool {
        self.failed_reason.is_some() || !self.stacktrace.is_empty()
    }

    pub fn has_result(&self) -> bool {
        self.return_value.is_some()
    }

    /// Time between start and finish, when both are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.processed_on, self.finished_on) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Log lines attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobLogs {
    /// Log lines in insertion order
    pub logs: Vec<String>,
    /// Total number of lines stored
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filter_tab_cycle() {
        assert_eq!(JobState::Active.next_tab(), JobState::Waiting);
        assert_eq!(JobState::Delayed.next_tab(), JobState::Active);
        assert_eq!(JobState::Active.prev_tab(), JobState::Delayed);
        assert_eq!(JobState::Paused.next_tab(), JobState::Active);
    }

    #[test]
    fn test_parse_job_state() {
        assert_eq!("wait".parse::<JobState>().unwrap(), JobState::Waiting);
        assert_eq!(" Failed ".parse::<JobState>().unwrap(), JobState::Failed);
        assert!("stuck".parse::<JobState>().is_err());
    }

    #[test]
    fn test_job_duration() {
        let mut job = JobInfo::new("1", "email");
        assert!(job.duration().is_none());

        job.processed_on = Utc.timestamp_millis_opt(1_000).single();
        job.finished_on = Utc.timestamp_millis_opt(3_500).single();
        assert_eq!(job.duration().map(|d| d.num_milliseconds()), Some(2_500));
    }

    #[test]
    fn test_error_and_result_flags() {
        let mut job = JobInfo::new("1", "email");
        assert!(!job.has_error());
        assert!(!job.has_result());

        job.stacktrace.push("at handler (worker.js:10)".into());
        assert!(job.has_error());

        job.return_value = Some(serde_json::json!({"ok": true}));
        assert!(job.has_result());
    }
}
