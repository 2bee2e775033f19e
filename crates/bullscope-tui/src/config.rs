//! Command line and engine configuration.

use std::time::Duration;

use clap::Parser;

use bullscope_queue::ConnectionConfig;

/// Default interval between metadata and job-list polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of jobs fetched per listing.
pub const DEFAULT_JOB_PAGE_SIZE: usize = 100;

/// Terminal dashboard for BullMQ queues.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "bullscope", version, about)]
pub struct Cli {
    /// Redis host. Without it an interactive prompt asks for the connection.
    #[arg(long, env = "BULLSCOPE_REDIS_HOST")]
    pub redis_host: Option<String>,

    /// Redis port
    #[arg(long, env = "BULLSCOPE_REDIS_PORT")]
    pub redis_port: Option<u16>,

    /// Redis password
    #[arg(long, env = "BULLSCOPE_REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Redis database index
    #[arg(long, env = "BULLSCOPE_REDIS_DB")]
    pub redis_db: Option<i64>,

    /// Key prefix used by the queues
    #[arg(long, env = "BULLSCOPE_PREFIX")]
    pub prefix: Option<String>,
}

impl Cli {
    /// Whether a host was given on the command line or in the environment.
    pub fn has_host(&self) -> bool {
        self.redis_host
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty())
    }

    /// Overlay the given flags on `base`.
    pub fn apply(&self, mut base: ConnectionConfig) -> ConnectionConfig {
        if let Some(host) = self.redis_host.as_ref().filter(|h| !h.trim().is_empty()) {
            base.host = host.clone();
        }
        if let Some(port) = self.redis_port {
            base.port = port;
        }
        if let Some(password) = &self.redis_password {
            base.password = Some(password.clone()).filter(|p| !p.is_empty());
        }
        if let Some(db) = self.redis_db {
            base.db = db;
        }
        if let Some(prefix) = self.prefix.as_ref().filter(|p| !p.trim().is_empty()) {
            base.prefix = prefix.clone();
        }
        base
    }
}

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval for both the metadata and job-list tickers
    pub poll_interval: Duration,
    /// Jobs requested per listing
    pub job_page_size: usize,
    /// Refetch the open job list when a push event arrives for its queue
    pub event_refresh: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_page_size: DEFAULT_JOB_PAGE_SIZE,
            event_refresh: true,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_millis(
                std::env::var("BULLSCOPE_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|ms: &u64| *ms > 0)
                    .unwrap_or(2000),
            ),
            job_page_size: std::env::var("BULLSCOPE_JOB_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_JOB_PAGE_SIZE),
            event_refresh: std::env::var("BULLSCOPE_EVENT_REFRESH")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }

    /// Inclusive end index of the job page.
    pub fn job_page_end(&self) -> usize {
        self.job_page_size.saturating_sub(1)
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// Everything the dashboard needs to start.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub engine: EngineConfig,
}
