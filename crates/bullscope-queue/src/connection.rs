//! Redis-backed [`QueueStore`].
//!
//! One base connection per process, plus one dedicated connection per open
//! event channel. Connect and disconnect are serialized by a lifecycle lock.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use bullscope_models::{ConnectionState, JobInfo, JobLogs, JobState, QueueInfo};

use crate::config::ConnectionConfig;
use crate::error::{QueueError, QueueResult};
use crate::events::{spawn_channel, EventSubscriber};
use crate::jobs;
use crate::keys::{KeyScheme, QueueKeys};
use crate::poller::fetch_queue_info;
use crate::registry::{queue_names_from_keys, scan_keys};
use crate::store::{EventListener, ListenerId, QueueStore};

/// Upper bound on the QUIT sent during teardown.
const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// An established link and the queue handles created on it.
struct LiveConnection {
    client: redis::Client,
    conn: MultiplexedConnection,
    handles: HashMap<String, QueueKeys>,
}

/// [`QueueStore`] over a Redis server using the BullMQ key layout.
pub struct RedisQueueStore {
    config: ConnectionConfig,
    keys: KeyScheme,
    lifecycle: Mutex<()>,
    live: Mutex<Option<LiveConnection>>,
    state: RwLock<ConnectionState>,
    events: EventSubscriber,
}

impl fmt::Debug for RedisQueueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueueStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisQueueStore {
    /// Create a disconnected store. Fails only on an invalid config.
    pub fn new(config: ConnectionConfig) -> QueueResult<Self> {
        config.validate()?;
        let keys = KeyScheme::new(&config.prefix)?;
        Ok(Self {
            config,
            keys,
            lifecycle: Mutex::new(()),
            live: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            events: EventSubscriber::new(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(ConnectionConfig::from_env())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Number of queues with an open event channel.
    pub async fn open_event_channels(&self) -> usize {
        self.events.open_channels().await
    }

    async fn set_state(&self, state: ConnectionState) {
        debug!(state = %state, "Connection state changed");
        *self.state.write().await = state;
    }

    /// The base connection, or `NotConnected`.
    async fn base(&self) -> QueueResult<MultiplexedConnection> {
        let live = self.live.lock().await;
        live.as_ref()
            .map(|l| l.conn.clone())
            .ok_or(QueueError::NotConnected)
    }

    /// Keys and connection for one queue, creating its handle on first use.
    async fn handle(&self, queue: &str) -> QueueResult<(MultiplexedConnection, QueueKeys)> {
        let mut live = self.live.lock().await;
        let live = live.as_mut().ok_or(QueueError::NotConnected)?;
        let keys = live
            .handles
            .entry(queue.to_string())
            .or_insert_with(|| {
                debug!(queue = %queue, "Created queue handle");
                self.keys.queue(queue)
            })
            .clone();
        Ok((live.conn.clone(), keys))
    }

    /// Connect and PING within the configured timeout. Caller holds the
    /// lifecycle lock.
    async fn establish(&self) -> QueueResult<()> {
        self.set_state(ConnectionState::Connecting).await;
        info!(target_addr = %self.config.target(), db = self.config.db, "Connecting to Redis");

        let result = self.open_connection().await;
        match result {
            Ok(live) => {
                *self.live.lock().await = Some(live);
                self.set_state(ConnectionState::Connected).await;
                info!(target_addr = %self.config.target(), "Connected to Redis");
                Ok(())
            }
            Err(e) => {
                warn!(target_addr = %self.config.target(), "Connection failed: {}", e);
                self.set_state(ConnectionState::error(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn open_connection(&self) -> QueueResult<LiveConnection> {
        let client = redis::Client::open(self.config.redis_url().as_str())?;

        let attempt = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn)
        };

        // Dropping the timed-out future drops any half-open connection.
        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(conn)) => Ok(LiveConnection {
                client,
                conn,
                handles: HashMap::new(),
            }),
            Ok(Err(e)) => Err(self.classify(e)),
            Err(_) => Err(QueueError::ConnectionTimeout {
                host: self.config.host.clone(),
                port: self.config.port,
                timeout: self.config.connect_timeout,
            }),
        }
    }

    fn classify(&self, e: redis::RedisError) -> QueueError {
        if e.is_connection_refusal() {
            QueueError::ConnectionRefused {
                host: self.config.host.clone(),
                port: self.config.port,
                message: e.to_string(),
            }
        } else if e.is_timeout() {
            QueueError::ConnectionTimeout {
                host: self.config.host.clone(),
                port: self.config.port,
                timeout: self.config.connect_timeout,
            }
        } else {
            QueueError::Redis(e)
        }
    }

    /// Close event channels, then queue handles, then the base connection.
    /// Caller holds the lifecycle lock.
    async fn teardown(&self) {
        let closed = self.events.close_all().await;
        if closed > 0 {
            debug!(channels = closed, "Closed event channels");
        }

        let live = self.live.lock().await.take();
        if let Some(mut live) = live {
            let handles = live.handles.len();
            live.handles.clear();
            debug!(handles, "Released queue handles");

            let cmd = redis::cmd("QUIT");
            let quit = cmd.query_async::<()>(&mut live.conn);
            match tokio::time::timeout(QUIT_TIMEOUT, quit).await {
                Ok(Ok(())) => debug!("Sent QUIT"),
                Ok(Err(e)) => debug!("QUIT failed, dropping connection: {}", e),
                Err(_) => debug!("QUIT timed out, dropping connection"),
            }
            info!(target_addr = %self.config.target(), "Disconnected from Redis");
        }

        self.set_state(ConnectionState::Disconnected).await;
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn connect(&self) -> QueueResult<()> {
        let _guard = self.lifecycle.lock().await;
        if self.live.lock().await.is_some() {
            return Ok(());
        }
        self.establish().await
    }

    async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
    }

    async fn reconnect(&self) -> QueueResult<()> {
        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
        self.establish().await
    }

    async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    async fn discover_queues(&self) -> QueueResult<Vec<String>> {
        let mut conn = self.base().await?;
        let keys = scan_keys(&mut conn, &self.keys.meta_scan_pattern()).await?;
        let names = queue_names_from_keys(&self.keys, keys);
        info!(count = names.len(), "Discovered queues");
        Ok(names)
    }

    async fn queue_info(&self, queue: &str) -> QueueResult<QueueInfo> {
        let (mut conn, keys) = self.handle(queue).await?;
        fetch_queue_info(&mut conn, &keys, queue).await
    }

    async fn list_jobs(
        &self,
        queue: &str,
        state: JobState,
        start: usize,
        end: usize,
    ) -> QueueResult<Vec<JobInfo>> {
        let (mut conn, keys) = self.handle(queue).await?;
        jobs::list_jobs(&mut conn, &keys, state, start, end).await
    }

    async fn get_job(&self, queue: &str, id: &str) -> QueueResult<Option<JobInfo>> {
        let (mut conn, keys) = self.handle(queue).await?;
        jobs::get_job(&mut conn, &keys, id).await
    }

    async fn job_logs(&self, queue: &str, id: &str) -> QueueResult<JobLogs> {
        let (mut conn, keys) = self.handle(queue).await?;
        jobs::job_logs(&mut conn, &keys, id).await
    }

    async fn subscribe(&self, queue: &str, listener: EventListener) -> QueueResult<ListenerId> {
        let (client, keys) = {
            let mut live = self.live.lock().await;
            let live = live.as_mut().ok_or(QueueError::NotConnected)?;
            let keys = live
                .handles
                .entry(queue.to_string())
                .or_insert_with(|| self.keys.queue(queue))
                .clone();
            (live.client.clone(), keys)
        };

        let name = queue.to_string();
        let id = self
            .events
            .subscribe(queue, listener, move |fanout| {
                spawn_channel(client, keys.events(), name, fanout)
            })
            .await;
        Ok(id)
    }

    async fn unsubscribe(&self, queue: &str, id: ListenerId) -> bool {
        self.events.unsubscribe(queue, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn store() -> RedisQueueStore {
        RedisQueueStore::new(ConnectionConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ConnectionConfig {
            host: "  ".into(),
            ..Default::default()
        };
        let err = assert_err!(RedisQueueStore::new(config));
        assert!(matches!(err, QueueError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_calls_before_connect_fail_with_not_connected() {
        let store = store();
        assert!(matches!(store.discover_queues().await, Err(QueueError::NotConnected)));
        assert!(matches!(store.queue_info("orders").await, Err(QueueError::NotConnected)));
        assert!(matches!(
            store.list_jobs("orders", JobState::Active, 0, 99).await,
            Err(QueueError::NotConnected)
        ));
        assert!(matches!(store.get_job("orders", "1").await, Err(QueueError::NotConnected)));
        assert!(matches!(store.job_logs("orders", "1").await, Err(QueueError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_harmless() {
        let store = store();
        store.disconnect().await;
        store.disconnect().await;
        assert_eq!(store.connection_state().await, ConnectionState::Disconnected);
    }

    fn local_config(port: u16, connect_timeout: Duration) -> ConnectionConfig {
        ConnectionConfig {
            host: "127.0.0.1".into(),
            port,
            connect_timeout,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out_with_target() {
        // Accepts TCP but never answers PING.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let store = RedisQueueStore::new(local_config(port, Duration::from_millis(300))).unwrap();

        let started = std::time::Instant::now();
        let err = assert_err!(store.connect().await);
        assert!(started.elapsed() < Duration::from_secs(3));

        match &err {
            QueueError::ConnectionTimeout {
                host,
                port: failed_port,
                timeout,
            } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(*failed_port, port);
                assert_eq!(*timeout, Duration::from_millis(300));
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
        assert!(store.connection_state().await.is_error());
        assert!(matches!(store.discover_queues().await, Err(QueueError::NotConnected)));
        drop(listener);
    }

    /// Answers "+OK" to every RESP command it reads and records the names.
    async fn ok_server() -> (u16, std::sync::Arc<std::sync::Mutex<Vec<String>>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = std::sync::Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let log = std::sync::Arc::clone(&log);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                        let text = String::from_utf8_lossy(&buf[..n]).to_string();
                        let lines: Vec<&str> = text.split("\r\n").collect();
                        let mut replies = 0;
                        for (i, line) in lines.iter().enumerate() {
                            if line.starts_with('*') {
                                replies += 1;
                                if let Some(name) = lines.get(i + 2) {
                                    log.lock().unwrap().push(name.to_uppercase());
                                }
                            }
                        }
                        let reply = "+OK\r\n".repeat(replies);
                        if socket.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        (port, seen)
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_sends_quit() {
        let (port, seen) = ok_server().await;
        let store = RedisQueueStore::new(local_config(port, Duration::from_secs(2))).unwrap();

        tokio_test::assert_ok!(store.connect().await);
        assert_eq!(store.connection_state().await, ConnectionState::Connected);

        store.disconnect().await;
        assert_eq!(store.connection_state().await, ConnectionState::Disconnected);
        assert!(matches!(store.discover_queues().await, Err(QueueError::NotConnected)));

        let seen = seen.lock().unwrap().clone();
        assert!(seen.contains(&"PING".to_string()));
        assert_eq!(seen.last().map(String::as_str), Some("QUIT"));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = RedisQueueStore::new(local_config(port, Duration::from_secs(2))).unwrap();

        let err = assert_err!(store.connect().await);
        assert!(err.is_connection_error());
        assert!(store.connection_state().await.is_error());

        store.disconnect().await;
        assert_eq!(store.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let store = store();
        let listener: EventListener = std::sync::Arc::new(|_: &bullscope_models::QueueEvent| {});
        assert!(matches!(
            store.subscribe("orders", listener).await,
            Err(QueueError::NotConnected)
        ));
        assert_eq!(store.open_event_channels().await, 0);
    }
}
