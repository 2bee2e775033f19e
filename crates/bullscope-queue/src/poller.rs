//! Per-queue counts and pause state.

use futures_util::future::join_all;
use redis::aio::MultiplexedConnection;

use bullscope_models::{JobCounts, JobState, QueueInfo};

use crate::error::{QueueError, QueueResult};
use crate::keys::{state_key, KeyKind, QueueKeys, PAUSED_FIELD};
use crate::store::QueueStore;

/// Outcome of polling one queue.
pub type QueuePoll = (String, QueueResult<QueueInfo>);

/// Fetch counts for all seven states plus the pause flag in one round trip.
pub(crate) async fn fetch_queue_info(
    conn: &mut MultiplexedConnection,
    keys: &QueueKeys,
    name: &str,
) -> QueueResult<QueueInfo> {
    let mut pipe = redis::pipe();
    for state in JobState::ALL {
        match state_key(state).1 {
            KeyKind::List => pipe.cmd("LLEN").arg(keys.state(state)),
            KeyKind::SortedSet => pipe.cmd("ZCARD").arg(keys.state(state)),
        };
    }
    pipe.cmd("HEXISTS").arg(keys.meta()).arg(PAUSED_FIELD);

    let values: Vec<u64> = pipe.query_async(conn).await?;

    let mut counts = JobCounts::default();
    for (idx, state) in JobState::ALL.iter().enumerate() {
        counts.set(*state, values.get(idx).copied().unwrap_or(0));
    }
    let is_paused = values.get(JobState::ALL.len()).copied().unwrap_or(0) == 1;

    Ok(QueueInfo {
        name: name.to_string(),
        counts,
        is_paused,
    })
}

/// Poll every queue concurrently. One queue failing does not affect the
/// others; each name gets its own result.
pub async fn poll_queues<S>(store: &S, names: &[String]) -> Vec<QueuePoll>
where
    S: QueueStore + ?Sized,
{
    let polls = names.iter().map(|name| async move {
        let result = store.queue_info(name).await;
        (name.clone(), result)
    });
    join_all(polls).await
}

/// Split poll results into fresh snapshots and per-queue failures.
pub fn split_polls(polls: Vec<QueuePoll>) -> (Vec<QueueInfo>, Vec<(String, QueueError)>) {
    let mut fresh = Vec::with_capacity(polls.len());
    let mut failed = Vec::new();
    for (name, result) in polls {
        match result {
            Ok(info) => fresh.push(info),
            Err(e) => failed.push((name, e)),
        }
    }
    (fresh, failed)
}
