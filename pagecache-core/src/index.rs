//! Surrogate key indexes.
//!
//! An index maps a surrogate key to the cache keys tagged with it, which is
//! what lets a backend delete every entry sharing a tag.

use crate::error::CacheResult;
use crate::store::{CacheStore, SetStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Default TTL of an index entry, refreshed on every add.
pub const DEFAULT_INDEX_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Default namespace for index entries.
pub const DEFAULT_INDEX_PREFIX: &str = "_surrogate:";

/// Surrogate key to cache keys mapping.
#[async_trait]
pub trait SurrogateIndex: Send + Sync {
    /// Add a cache key to a surrogate key's index.
    async fn add(&self, surrogate_key: &str, cache_key: &str) -> CacheResult<()>;

    /// Get all cache keys associated with a surrogate key.
    async fn get_keys(&self, surrogate_key: &str) -> CacheResult<HashSet<String>>;

    /// Remove a surrogate key's entire index.
    async fn remove(&self, surrogate_key: &str) -> CacheResult<()>;
}

/// Index kept as a JSON list inside any [`CacheStore`].
///
/// `add` is a read-modify-write: concurrent adds to the same surrogate key
/// can lose updates. Prefer [`SetIndex`] when the store supports sets.
pub struct StoreIndex {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
    prefix: String,
}

impl StoreIndex {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_INDEX_TIMEOUT,
            prefix: DEFAULT_INDEX_PREFIX.to_string(),
        }
    }

    /// Set the TTL refreshed on every add.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the key namespace.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn index_key(&self, surrogate_key: &str) -> String {
        format!("{}{}", self.prefix, surrogate_key)
    }

    async fn read_list(&self, index_key: &str) -> CacheResult<Vec<String>> {
        let Some(raw) = self.store.get(index_key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(keys) => Ok(keys),
            Err(err) => {
                tracing::warn!(
                    key = %index_key,
                    error = %err,
                    "Discarding corrupted surrogate index"
                );
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl SurrogateIndex for StoreIndex {
    async fn add(&self, surrogate_key: &str, cache_key: &str) -> CacheResult<()> {
        let index_key = self.index_key(surrogate_key);
        let mut keys = self.read_list(&index_key).await?;
        if !keys.iter().any(|k| k == cache_key) {
            keys.push(cache_key.to_string());
        }

        let encoded = serde_json::to_string(&keys)?;
        self.store
            .set(&index_key, encoded, Some(self.timeout))
            .await
    }

    async fn get_keys(&self, surrogate_key: &str) -> CacheResult<HashSet<String>> {
        let keys = self.read_list(&self.index_key(surrogate_key)).await?;
        Ok(keys.into_iter().collect())
    }

    async fn remove(&self, surrogate_key: &str) -> CacheResult<()> {
        self.store.delete(&self.index_key(surrogate_key)).await?;
        Ok(())
    }
}

/// Index kept as a native set in a [`SetStore`].
///
/// Adding a member and refreshing the TTL happen in one atomic step. The
/// index goes through the same store as the cached data, so any key prefix
/// the store applies covers index keys too.
pub struct SetIndex {
    store: Arc<dyn SetStore>,
    timeout: Duration,
    prefix: String,
}

impl SetIndex {
    pub fn new(store: Arc<dyn SetStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_INDEX_TIMEOUT,
            prefix: DEFAULT_INDEX_PREFIX.to_string(),
        }
    }

    /// Set the TTL refreshed on every add.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the key namespace.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn index_key(&self, surrogate_key: &str) -> String {
        format!("{}{}", self.prefix, surrogate_key)
    }
}

#[async_trait]
impl SurrogateIndex for SetIndex {
    async fn add(&self, surrogate_key: &str, cache_key: &str) -> CacheResult<()> {
        self.store
            .add_to_set(&self.index_key(surrogate_key), cache_key, self.timeout)
            .await
    }

    async fn get_keys(&self, surrogate_key: &str) -> CacheResult<HashSet<String>> {
        self.store.members_of(&self.index_key(surrogate_key)).await
    }

    async fn remove(&self, surrogate_key: &str) -> CacheResult<()> {
        self.store.delete_key(&self.index_key(surrogate_key)).await?;
        Ok(())
    }
}

/// No-op index, for setups where invalidation happens out-of-band
/// (e.g. CDN purges through an API).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndex;

#[async_trait]
impl SurrogateIndex for NullIndex {
    async fn add(&self, _surrogate_key: &str, _cache_key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn get_keys(&self, _surrogate_key: &str) -> CacheResult<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn remove(&self, _surrogate_key: &str) -> CacheResult<()> {
        Ok(())
    }
}
