//! Redis store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Minimum idle connections.
    #[serde(default)]
    pub min_idle: Option<u32>,
    /// Deadline for checking a connection out of the pool.
    #[serde(with = "seconds", default = "default_connection_timeout")]
    pub connection_timeout: Duration,
    /// Deadline for a single store command.
    #[serde(with = "seconds", default = "default_command_timeout")]
    pub command_timeout: Duration,
    /// Database number (0-15).
    #[serde(default)]
    pub database: Option<u8>,
    /// Username for Redis 6+ ACL.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Namespace prepended to every key, set keys included.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: default_pool_size(),
            min_idle: Some(1),
            connection_timeout: default_connection_timeout(),
            command_timeout: default_command_timeout(),
            database: None,
            username: None,
            password: None,
            key_prefix: None,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> RedisConfigBuilder {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> RedisConfigBuilder {
        let mut builder = RedisConfigBuilder::new();

        if let Some(url) = lookup("REDIS_URL") {
            builder = builder.url(url);
        }

        if let Some(pool_size) = lookup("REDIS_POOL_SIZE")
            && let Ok(size) = pool_size.parse()
        {
            builder = builder.pool_size(size);
        }

        if let Some(db) = lookup("REDIS_DATABASE")
            && let Ok(db_num) = db.parse()
        {
            builder = builder.database(db_num);
        }

        if let Some(username) = lookup("REDIS_USERNAME") {
            builder = builder.username(username);
        }

        if let Some(password) = lookup("REDIS_PASSWORD") {
            builder = builder.password(password);
        }

        if let Some(prefix) = lookup("REDIS_KEY_PREFIX").filter(|p| !p.is_empty()) {
            builder = builder.key_prefix(prefix);
        }

        builder
    }

    /// Get the full Redis URL with auth and database.
    pub fn connection_url(&self) -> String {
        let mut url = self.url.clone();

        if let Some(password) = &self.password {
            let auth = match &self.username {
                Some(username) => format!("{}:{}@", username, password),
                None => format!(":{}@", password),
            };
            for scheme in ["redis://", "rediss://"] {
                if let Some(rest) = url.strip_prefix(scheme) {
                    url = format!("{}{}{}", scheme, auth, rest);
                    break;
                }
            }
        }

        if let Some(db) = self.database {
            let authority = url.split_once("://").map_or(url.as_str(), |(_, rest)| rest);
            if !authority.contains('/') {
                url = format!("{}/{}", url, db);
            }
        }

        url
    }

    /// Apply the key prefix.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

/// Builder for [`RedisConfig`].
#[derive(Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    pub fn min_idle(mut self, min_idle: u32) -> Self {
        self.config.min_idle = Some(min_idle);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the per-command deadline.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn database(mut self, db: u8) -> Self {
        self.config.database = Some(db);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Namespace every key under `prefix`.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> RedisConfig {
        self.config
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
