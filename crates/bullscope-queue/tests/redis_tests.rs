//! Integration tests against a live Redis.
//!
//! Point `BULLSCOPE_REDIS_HOST`/`BULLSCOPE_REDIS_PORT` at a disposable
//! server and run with `--ignored`. Keys are written under a dedicated
//! prefix and removed afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bullscope_models::{ConnectionState, JobState, QueueEvent};
use bullscope_queue::{
    poll_queues, split_polls, ConnectionConfig, EventListener, QueueStore,
    RedisQueueStore,
};

const TEST_PREFIX: &str = "bullscope-test";

fn test_config() -> ConnectionConfig {
    dotenvy::dotenv().ok();
    ConnectionConfig {
        prefix: TEST_PREFIX.to_string(),
        ..ConnectionConfig::from_env()
    }
}

async fn raw_connection(config: &ConnectionConfig) -> redis::aio::MultiplexedConnection {
    redis::Client::open(config.redis_url().as_str())
        .expect("Failed to open client")
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect")
}

async fn cleanup(conn: &mut redis::aio::MultiplexedConnection) {
    let keys: Vec<String> = redis::cmd("KEYS")
        .arg(format!("{}:*", TEST_PREFIX))
        .query_async(conn)
        .await
        .expect("Failed to list test keys");
    if !keys.is_empty() {
        let _: () = redis::cmd("DEL")
            .arg(keys)
            .query_async(conn)
            .await
            .expect("Failed to delete test keys");
    }
}

async fn seed_queue(conn: &mut redis::aio::MultiplexedConnection, queue: &str) {
    let base = format!("{}:{}", TEST_PREFIX, queue);
    let _: () = redis::pipe()
        .cmd("HSET").arg(format!("{}:meta", base)).arg("opts.maxLenEvents").arg(10000)
        .cmd("RPUSH").arg(format!("{}:wait", base)).arg("3").arg("2")
        .cmd("RPUSH").arg(format!("{}:active", base)).arg("1")
        .cmd("ZADD").arg(format!("{}:failed", base)).arg(10).arg("4").arg(20).arg("5")
        .cmd("HSET").arg(format!("{}:5", base))
            .arg("name").arg("charge")
            .arg("data").arg("{\"amount\":12}")
            .arg("attemptsMade").arg(2)
            .arg("timestamp").arg(1700000000000_i64)
            .arg("failedReason").arg("card declined")
            .arg("stacktrace").arg("[\"Error: card declined\"]")
        .cmd("HSET").arg(format!("{}:4", base))
            .arg("name").arg("charge")
            .arg("data").arg("{}")
            .arg("timestamp").arg(1699999999000_i64)
        .cmd("RPUSH").arg(format!("{}:5:logs", base)).arg("starting").arg("declined")
        .query_async(conn)
        .await
        .expect("Failed to seed queue");
}

/// Connect, discover, poll and read jobs back.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_discover_poll_and_list() {
    let config = test_config();
    let mut raw = raw_connection(&config).await;
    cleanup(&mut raw).await;
    seed_queue(&mut raw, "payments").await;
    seed_queue(&mut raw, "payments:eu").await;

    let store = RedisQueueStore::new(config).expect("Failed to create store");
    store.connect().await.expect("Failed to connect");
    assert_eq!(store.connection_state().await, ConnectionState::Connected);

    let names = store.discover_queues().await.expect("Failed to discover");
    assert_eq!(names, vec!["payments", "payments:eu"]);

    let (fresh, failed) = split_polls(poll_queues(&store, &names).await);
    assert!(failed.is_empty());
    let info = fresh.iter().find(|q| q.name == "payments").unwrap();
    assert_eq!(info.counts.waiting, 2);
    assert_eq!(info.counts.active, 1);
    assert_eq!(info.counts.failed, 2);
    assert!(!info.is_paused);

    let failed_jobs = store
        .list_jobs("payments", JobState::Failed, 0, 99)
        .await
        .expect("Failed to list jobs");
    let ids: Vec<&str> = failed_jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["5", "4"]);
    assert_eq!(failed_jobs[0].failed_reason.as_deref(), Some("card declined"));

    let logs = store.job_logs("payments", "5").await.expect("Failed to read logs");
    assert_eq!(logs.count, 2);
    assert_eq!(logs.logs, vec!["starting", "declined"]);

    assert!(store.get_job("payments", "missing").await.unwrap().is_none());

    store.disconnect().await;
    cleanup(&mut raw).await;
}

/// Events published to the stream reach every listener.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_event_channel_fans_out() {
    let config = test_config();
    let mut raw = raw_connection(&config).await;
    cleanup(&mut raw).await;

    let store = RedisQueueStore::new(config).expect("Failed to create store");
    store.connect().await.expect("Failed to connect");

    let seen = Arc::new(AtomicUsize::new(0));
    let listener = |seen: Arc<AtomicUsize>| -> EventListener {
        Arc::new(move |event: &QueueEvent| {
            assert_eq!(event.job_id, "7");
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };
    store.subscribe("mail", listener(Arc::clone(&seen))).await.unwrap();
    store.subscribe("mail", listener(Arc::clone(&seen))).await.unwrap();
    assert_eq!(store.open_event_channels().await, 1);

    // Give the reader time to block on XREAD from "$".
    tokio::time::sleep(Duration::from_millis(300)).await;
    let _: String = redis::cmd("XADD")
        .arg(format!("{}:mail:events", TEST_PREFIX))
        .arg("*")
        .arg("event")
        .arg("completed")
        .arg("jobId")
        .arg("7")
        .arg("returnvalue")
        .arg("{\"ok\":true}")
        .query_async(&mut raw)
        .await
        .expect("Failed to publish event");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    store.disconnect().await;
    assert_eq!(store.open_event_channels().await, 0);
    cleanup(&mut raw).await;
}
