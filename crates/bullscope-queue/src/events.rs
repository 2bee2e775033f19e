//! Queue events via Redis Streams.
//!
//! Each queue publishes its events to "<prefix>:<queue>:events". One reader
//! task per queue blocks on XREAD, normalizes every entry into a
//! [`QueueEvent`] and fans it out to the listeners registered for that
//! queue. Channels open lazily on the first subscription and stay open until
//! [`EventSubscriber::close_all`], whatever the listener count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bullscope_models::{QueueEvent, QueueEventKind};

use crate::store::{EventListener, ListenerId};

/// How long one XREAD blocks before looping.
const EVENT_BLOCK_MS: usize = 2000;

/// Maximum entries taken per XREAD.
const EVENT_BATCH: usize = 100;

/// Listener registry keyed by queue.
#[derive(Default)]
pub struct EventFanout {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, EventListener)>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, queue: &str, listener: EventListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(queue.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn remove(&mut self, queue: &str, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(queue) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(queue);
        }
        removed
    }

    pub fn listener_count(&self, queue: &str) -> usize {
        self.listeners.get(queue).map_or(0, Vec::len)
    }

    /// Snapshot of the listeners for a queue, so callers can invoke them
    /// without holding the registry.
    pub fn listeners_for(&self, queue: &str) -> Vec<EventListener> {
        self.listeners
            .get(queue)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// Call every listener with `event`. Runs outside the registry lock.
pub fn deliver(listeners: &[EventListener], event: &QueueEvent) -> usize {
    for listener in listeners {
        listener(event);
    }
    listeners.len()
}

/// Owns the per-queue event channels and their listeners.
#[derive(Default)]
pub struct EventSubscriber {
    fanout: Arc<Mutex<EventFanout>>,
    channels: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl EventSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `queue`.
    ///
    /// `open` is called only when the queue has no channel yet; it receives
    /// the shared fan-out and returns the reader task.
    pub async fn subscribe<F>(&self, queue: &str, listener: EventListener, open: F) -> ListenerId
    where
        F: FnOnce(Arc<Mutex<EventFanout>>) -> JoinHandle<()>,
    {
        let id = self.fanout.lock().await.register(queue, listener);

        let mut channels = self.channels.lock().await;
        if !channels.contains_key(queue) {
            let task = open(Arc::clone(&self.fanout));
            channels.insert(queue.to_string(), task);
            info!(queue = %queue, "Opened event channel");
        }

        debug!(queue = %queue, listener = %id, "Registered event listener");
        id
    }

    pub async fn unsubscribe(&self, queue: &str, id: ListenerId) -> bool {
        let removed = self.fanout.lock().await.remove(queue, id);
        if removed {
            debug!(queue = %queue, listener = %id, "Removed event listener");
        }
        removed
    }

    pub async fn is_open(&self, queue: &str) -> bool {
        self.channels.lock().await.contains_key(queue)
    }

    pub async fn open_channels(&self) -> usize {
        self.channels.lock().await.len()
    }

    pub async fn listener_count(&self, queue: &str) -> usize {
        self.fanout.lock().await.listener_count(queue)
    }

    /// Close every channel and drop every listener. Returns the number of
    /// channels closed.
    pub async fn close_all(&self) -> usize {
        let channels: Vec<(String, JoinHandle<()>)> =
            self.channels.lock().await.drain().collect();
        let closed = channels.len();

        for (queue, task) in channels {
            task.abort();
            match task.await {
                Ok(()) => debug!(queue = %queue, "Event channel had already stopped"),
                Err(e) if e.is_cancelled() => debug!(queue = %queue, "Closed event channel"),
                Err(e) => warn!(queue = %queue, "Event channel ended abnormally: {}", e),
            }
        }

        self.fanout.lock().await.clear();
        closed
    }
}

/// Spawn the XREAD loop for one queue.
pub(crate) fn spawn_channel(
    client: redis::Client,
    stream_key: String,
    queue: String,
    fanout: Arc<Mutex<EventFanout>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_channel(client, stream_key, queue, fanout).await;
    })
}

async fn run_channel(
    client: redis::Client,
    stream_key: String,
    queue: String,
    fanout: Arc<Mutex<EventFanout>>,
) {
    // XREAD BLOCK needs its own connection and a response timeout longer
    // than the block.
    let config = redis::AsyncConnectionConfig::new()
        .set_response_timeout(Duration::from_millis(EVENT_BLOCK_MS as u64 + 3000));
    let mut conn = match client.get_multiplexed_async_connection_with_config(&config).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(queue = %queue, "Failed to open event channel: {}", e);
            return;
        }
    };

    let opts = StreamReadOptions::default()
        .block(EVENT_BLOCK_MS)
        .count(EVENT_BATCH);
    let mut last_id = "$".to_string();

    loop {
        let reply: redis::RedisResult<Option<StreamReadReply>> = conn
            .xread_options(&[stream_key.as_str()], &[last_id.as_str()], &opts)
            .await;

        let reply = match reply {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(e) => {
                warn!(queue = %queue, "Event channel dropped: {}", e);
                return;
            }
        };

        for stream in reply.keys {
            for entry in stream.ids {
                last_id = entry.id.clone();
                let fields = entry_fields(&entry.map);
                let Some(event) = normalize_event(&queue, &fields) else {
                    continue;
                };
                let listeners = fanout.lock().await.listeners_for(&queue);
                deliver(&listeners, &event);
            }
        }
    }
}

fn entry_fields(map: &HashMap<String, redis::Value>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| {
            redis::from_redis_value::<String>(v)
                .ok()
                .map(|s| (k.clone(), s))
        })
        .collect()
}

/// Map one raw stream entry onto the event envelope.
///
/// Entries without an `event` field and unknown kinds yield `None`.
pub fn normalize_event(queue: &str, fields: &HashMap<String, String>) -> Option<QueueEvent> {
    let raw_kind = fields.get("event")?;
    let job_id = fields.get("jobId").cloned().unwrap_or_default();

    let (kind, job_id) = match raw_kind.as_str() {
        "waiting" => (QueueEventKind::Waiting, job_id),
        "active" => (QueueEventKind::Active, job_id),
        "completed" => (completed(fields), job_id),
        "failed" => (failed(fields), job_id),
        "progress" => (progress(fields), job_id),
        "stalled" => (QueueEventKind::Stalled, job_id),
        "removed" => (QueueEventKind::Removed, job_id),
        "drained" => (QueueEventKind::Drained, String::new()),
        _ => return None,
    };

    Some(QueueEvent::new(queue, job_id, kind))
}

fn completed(fields: &HashMap<String, String>) -> QueueEventKind {
    QueueEventKind::Completed {
        return_value: json_field(fields, "returnvalue"),
    }
}

fn failed(fields: &HashMap<String, String>) -> QueueEventKind {
    QueueEventKind::Failed {
        failed_reason: fields.get("failedReason").filter(|s| !s.is_empty()).cloned(),
    }
}

fn progress(fields: &HashMap<String, String>) -> QueueEventKind {
    QueueEventKind::Progress {
        data: json_field(fields, "data"),
    }
}

/// Parse a JSON-encoded field, keeping the raw text if it is not JSON.
fn json_field(fields: &HashMap<String, String>, name: &str) -> Option<Value> {
    let raw = fields.get(name)?;
    Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> EventListener {
        let counter = Arc::clone(counter);
        Arc::new(move |_event: &QueueEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn idle_channel(_fanout: Arc<Mutex<EventFanout>>) -> JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    #[test]
    fn test_normalize_completed_parses_return_value() {
        let raw = fields(&[("event", "completed"), ("jobId", "7"), ("returnvalue", "{\"sent\":3}")]);
        let event = normalize_event("mail", &raw).unwrap();

        assert_eq!(event.queue, "mail");
        assert_eq!(event.job_id, "7");
        assert_eq!(
            event.kind,
            QueueEventKind::Completed {
                return_value: Some(serde_json::json!({"sent": 3}))
            }
        );
    }

    #[test]
    fn test_normalize_failed_and_progress() {
        let raw = fields(&[("event", "failed"), ("jobId", "8"), ("failedReason", "timeout")]);
        assert_eq!(
            normalize_event("mail", &raw).unwrap().kind,
            QueueEventKind::Failed {
                failed_reason: Some("timeout".into())
            }
        );

        let raw = fields(&[("event", "progress"), ("jobId", "8"), ("data", "42")]);
        assert_eq!(
            normalize_event("mail", &raw).unwrap().kind,
            QueueEventKind::Progress {
                data: Some(serde_json::json!(42))
            }
        );
    }

    #[test]
    fn test_normalize_drained_has_no_job() {
        let raw = fields(&[("event", "drained"), ("id", "1700000000000-0")]);
        let event = normalize_event("mail", &raw).unwrap();
        assert_eq!(event.kind, QueueEventKind::Drained);
        assert!(event.is_queue_wide());
    }

    #[test]
    fn test_normalize_drops_unknown_kinds() {
        assert!(normalize_event("mail", &fields(&[("event", "duplicated"), ("jobId", "1")])).is_none());
        assert!(normalize_event("mail", &fields(&[("jobId", "1")])).is_none());
    }

    #[test]
    fn test_fanout_delivers_to_every_listener_of_the_queue() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut fanout = EventFanout::new();
        fanout.register("mail", counting_listener(&hits));
        fanout.register("mail", counting_listener(&hits));
        fanout.register("billing", counting_listener(&hits));

        let event = QueueEvent::new("mail", "1", QueueEventKind::Active);
        let delivered = deliver(&fanout.listeners_for("mail"), &event);
        assert_eq!(delivered, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fanout_remove_only_drops_one_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut fanout = EventFanout::new();
        let first = fanout.register("mail", counting_listener(&hits));
        fanout.register("mail", counting_listener(&hits));

        assert!(fanout.remove("mail", first));
        assert!(!fanout.remove("mail", first));
        assert_eq!(fanout.listener_count("mail"), 1);
    }

    #[tokio::test]
    async fn test_channel_opens_once_and_survives_unsubscribe() {
        let subscriber = EventSubscriber::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let opened = Arc::new(AtomicUsize::new(0));

        let mut ids = Vec::new();
        for _ in 0..2 {
            let opened = Arc::clone(&opened);
            let id = subscriber
                .subscribe("mail", counting_listener(&hits), move |fanout| {
                    opened.fetch_add(1, Ordering::SeqCst);
                    idle_channel(fanout)
                })
                .await;
            ids.push(id);
        }

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(subscriber.listener_count("mail").await, 2);

        for id in ids {
            assert!(subscriber.unsubscribe("mail", id).await);
        }
        assert_eq!(subscriber.listener_count("mail").await, 0);
        assert!(subscriber.is_open("mail").await);
    }

    #[tokio::test]
    async fn test_close_all_is_idempotent() {
        let subscriber = EventSubscriber::new();
        let hits = Arc::new(AtomicUsize::new(0));
        subscriber.subscribe("mail", counting_listener(&hits), idle_channel).await;
        subscriber.subscribe("billing", counting_listener(&hits), idle_channel).await;

        assert_eq!(subscriber.close_all().await, 2);
        assert_eq!(subscriber.close_all().await, 0);
        assert_eq!(subscriber.open_channels().await, 0);
        assert_eq!(subscriber.listener_count("mail").await, 0);
    }
}
