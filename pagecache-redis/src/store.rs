//! Redis-backed [`CacheStore`] with native sets.

use async_trait::async_trait;
use bb8::PooledConnection;
use bb8_redis::RedisConnectionManager;
use pagecache_core::store::{CacheStore, SetStore};
use pagecache_core::{CacheError, CacheResult};
use redis::{AsyncCommands, RedisResult, Script};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::pool::{RedisPool, build_pool};
use crate::{RedisConfig, RedisError};

/// Increments only keys that exist; returns nil otherwise.
const INCREMENT_EXISTING: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
";

/// Redis store.
///
/// Every key, set keys included, goes through the configured key prefix, so
/// cached pages, surrogate indexes and version counters share one namespace.
/// Each command is bounded by the configured command timeout.
#[derive(Clone)]
pub struct RedisStore {
    pool: RedisPool,
    config: RedisConfig,
}

impl RedisStore {
    /// Connect using `config`.
    pub async fn new(config: RedisConfig) -> crate::Result<Self> {
        let pool = build_pool(&config).await?;
        Ok(Self { pool, config })
    }

    /// Create from an existing pool.
    pub fn from_pool(config: RedisConfig, pool: RedisPool) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    fn build_key(&self, key: &str) -> String {
        self.config.build_key(key)
    }

    async fn connection(&self) -> CacheResult<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::from(RedisError::from(e)))
    }

    /// Run a command under the command timeout.
    async fn bounded<T>(&self, command: impl Future<Output = RedisResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.config.command_timeout, command).await {
            Ok(result) => result.map_err(|e| CacheError::from(RedisError::from(e))),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

/// Millisecond TTL for a `PX` or `PEXPIRE` argument, at least 1.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let key = self.build_key(key);
        let mut conn = self.connection().await?;
        self.bounded(conn.get(&key)).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection().await?;

        match ttl {
            // A zero lifetime means the value is already expired.
            Some(ttl) if ttl.is_zero() => {
                let _: u32 = self.bounded(conn.del(&key)).await?;
            }
            Some(ttl) => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&key).arg(value).arg("PX").arg(ttl_millis(ttl));
                let _: () = self.bounded(cmd.query_async(&mut *conn)).await?;
            }
            None => {
                let _: () = self.bounded(conn.set(&key, value)).await?;
            }
        }
        Ok(())
    }

    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
        if ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Ok(false);
        }

        let key = self.build_key(key);
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let stored: Option<String> = self.bounded(cmd.query_async(&mut *conn)).await?;
        Ok(stored.is_some())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let key = self.build_key(key);
        let mut conn = self.connection().await?;
        let deleted: u32 = self.bounded(conn.del(&key)).await?;
        Ok(deleted > 0)
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let full_key = self.build_key(key);
        let mut conn = self.connection().await?;

        let script = Script::new(INCREMENT_EXISTING);
        let mut invocation = script.key(&full_key);
        invocation.arg(delta);
        let value: Option<i64> = self.bounded(invocation.invoke_async(&mut *conn)).await?;
        value.ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection().await?;
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        let _: bool = self.bounded(conn.pexpire(&key, millis)).await?;
        Ok(())
    }
}

#[async_trait]
impl SetStore for RedisStore {
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection().await?;
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(&key, member)
            .ignore()
            .pexpire(&key, millis)
            .ignore();
        let _: () = self.bounded(pipe.query_async(&mut *conn)).await?;
        Ok(())
    }

    async fn members_of(&self, key: &str) -> CacheResult<HashSet<String>> {
        let key = self.build_key(key);
        let mut conn = self.connection().await?;
        self.bounded(conn.smembers(&key)).await
    }

    async fn delete_key(&self, key: &str) -> CacheResult<bool> {
        self.delete(key).await
    }
}
