//! Redis connection pool.

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use tracing::info;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

/// Build a connection pool and check it with a `PING`.
pub async fn build_pool(config: &RedisConfig) -> Result<RedisPool> {
    let manager = RedisConnectionManager::new(config.connection_url())
        .map_err(|e| RedisError::Config(e.to_string()))?;

    let pool = Pool::builder()
        .max_size(config.pool_size)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| RedisError::Connection(e.to_string()))?;

    {
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;
    }

    info!(
        pool_size = config.pool_size,
        url = %config.url,
        "Redis connection pool created"
    );

    Ok(pool)
}
