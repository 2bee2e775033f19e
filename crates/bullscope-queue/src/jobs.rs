//! Job listing, lookup and logs.
//!
//! Reads follow the store's native ordering: lists are read from the head
//! (newest first, as producers LPUSH) and sorted sets newest-first with
//! ZREVRANGE. Nothing is re-sorted or cached here.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use tracing::debug;

use bullscope_models::{JobInfo, JobLogs, JobState};

use crate::error::QueueResult;
use crate::keys::{state_key, KeyKind, QueueKeys};

/// Collections read for a listing. Waiting jobs of a paused queue sit in
/// the paused list, so `waiting` covers both.
fn sources(state: JobState) -> Vec<JobState> {
    match state {
        JobState::Waiting => vec![JobState::Waiting, JobState::Paused],
        other => vec![other],
    }
}

/// Jobs of one state at positions `start..=end`.
pub(crate) async fn list_jobs(
    conn: &mut MultiplexedConnection,
    keys: &QueueKeys,
    state: JobState,
    start: usize,
    end: usize,
) -> QueueResult<Vec<JobInfo>> {
    if end < start {
        return Ok(Vec::new());
    }
    let limit = end - start + 1;

    let mut pipe = redis::pipe();
    for source in sources(state) {
        let key = keys.state(source);
        match state_key(source).1 {
            KeyKind::List => pipe.cmd("LRANGE").arg(key).arg(start).arg(end),
            KeyKind::SortedSet => pipe.cmd("ZREVRANGE").arg(key).arg(start).arg(end),
        };
    }
    let ranges: Vec<Vec<String>> = pipe.query_async(&mut *conn).await?;

    let ids = merge_ids(ranges, limit);
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut pipe = redis::pipe();
    for id in &ids {
        pipe.cmd("HGETALL").arg(keys.job(id));
    }
    let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut *conn).await?;

    let jobs: Vec<JobInfo> = ids
        .iter()
        .zip(hashes.iter())
        .filter_map(|(id, fields)| job_from_hash(id, fields))
        .collect();

    debug!(state = %state, requested = limit, returned = jobs.len(), "Listed jobs");
    Ok(jobs)
}

/// A single job, `None` if its hash does not exist.
pub(crate) async fn get_job(
    conn: &mut MultiplexedConnection,
    keys: &QueueKeys,
    id: &str,
) -> QueueResult<Option<JobInfo>> {
    let fields: HashMap<String, String> = redis::cmd("HGETALL")
        .arg(keys.job(id))
        .query_async(conn)
        .await?;
    Ok(job_from_hash(id, &fields))
}

pub(crate) async fn job_logs(
    conn: &mut MultiplexedConnection,
    keys: &QueueKeys,
    id: &str,
) -> QueueResult<JobLogs> {
    let key = keys.logs(id);
    let (logs, count): (Vec<String>, u64) = redis::pipe()
        .cmd("LRANGE")
        .arg(&key)
        .arg(0)
        .arg(-1)
        .cmd("LLEN")
        .arg(&key)
        .query_async(conn)
        .await?;
    Ok(JobLogs { logs, count })
}

/// Concatenate id ranges in source order, dropping duplicates, capped at `limit`.
fn merge_ids(ranges: Vec<Vec<String>>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    ranges
        .into_iter()
        .flatten()
        .filter(|id| seen.insert(id.clone()))
        .take(limit)
        .collect()
}

/// Build a job snapshot from its stored hash. An empty hash means the job
/// is gone.
pub fn job_from_hash(id: &str, fields: &HashMap<String, String>) -> Option<JobInfo> {
    if fields.is_empty() {
        return None;
    }

    let mut job = JobInfo::new(id, fields.get("name").cloned().unwrap_or_default());
    job.data = json_value(fields.get("data")).unwrap_or(Value::Null);
    job.progress = json_value(fields.get("progress")).unwrap_or(Value::Null);
    job.attempts_made = fields
        .get("atm")
        .or_else(|| fields.get("attemptsMade"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    job.timestamp = millis(fields.get("timestamp"));
    job.processed_on = millis(fields.get("processedOn"));
    job.finished_on = millis(fields.get("finishedOn"));
    job.failed_reason = fields
        .get("failedReason")
        .filter(|s| !s.is_empty())
        .cloned();
    job.stacktrace = fields
        .get("stacktrace")
        .map(|raw| stacktrace_lines(raw))
        .unwrap_or_default();
    job.return_value = json_value(fields.get("returnvalue")).filter(|v| !v.is_null());

    Some(job)
}

fn json_value(raw: Option<&String>) -> Option<Value> {
    let raw = raw?;
    Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
}

fn millis(raw: Option<&String>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    let ms = raw
        .parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|f| f as i64))?;
    if ms <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}

fn stacktrace_lines(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(frames) => frames
            .into_iter()
            .filter_map(|frame| match frame {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
        Err(_) if raw.is_empty() => Vec::new(),
        Err(_) => vec![raw.to_string()],
    }
}
