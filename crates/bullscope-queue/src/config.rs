//! Connection configuration.

use std::time::Duration;

use crate::error::{QueueError, QueueResult};

/// Default BullMQ key prefix.
pub const DEFAULT_PREFIX: &str = "bull";

/// Default bound on connect + PING.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis connection configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Redis host
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Optional password (AUTH)
    pub password: Option<String>,
    /// Database index
    pub db: i64,
    /// Key prefix queues live under
    pub prefix: String,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            prefix: DEFAULT_PREFIX.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("prefix", &self.prefix)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("BULLSCOPE_REDIS_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("BULLSCOPE_REDIS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(6379),
            password: std::env::var("BULLSCOPE_REDIS_PASSWORD")
                .ok()
                .filter(|s| !s.is_empty()),
            db: std::env::var("BULLSCOPE_REDIS_DB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            prefix: std::env::var("BULLSCOPE_PREFIX")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            connect_timeout: Duration::from_millis(
                std::env::var("BULLSCOPE_CONNECT_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
        }
    }

    /// Check the values a connection cannot work without.
    pub fn validate(&self) -> QueueResult<()> {
        if self.host.trim().is_empty() {
            return Err(QueueError::invalid_config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(QueueError::invalid_config("port must not be 0"));
        }
        if self.prefix.trim().is_empty() {
            return Err(QueueError::invalid_config("key prefix must not be empty"));
        }
        if self.db < 0 {
            return Err(QueueError::invalid_config("database index must not be negative"));
        }
        Ok(())
    }

    /// Redis URL for this config, with the password percent-encoded.
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// `host:port`, as shown to the user.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_without_password() {
        let config = ConnectionConfig {
            host: "queue.local".into(),
            port: 6380,
            db: 2,
            ..Default::default()
        };
        assert_eq!(config.redis_url(), "redis://queue.local:6380/2");
    }

    #[test]
    fn test_redis_url_encodes_password() {
        let config = ConnectionConfig {
            password: Some("p@ss/word".into()),
            ..Default::default()
        };
        assert_eq!(config.redis_url(), "redis://:p%40ss%2Fword@localhost:6379/0");
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ConnectionConfig {
            password: Some("secret".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::default().validate().is_ok());

        let config = ConnectionConfig {
            host: " ".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));
    }
}
