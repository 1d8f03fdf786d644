//! Key-value store contracts consumed by the cache backends.

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

/// Key-value store underneath a cache backend.
///
/// Values are strings; the backends encode responses, index lists and
/// counters into them. Implementations must make `add` and `increment`
/// atomic with respect to concurrent callers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the store.
    ///
    /// Returns `Ok(None)` if the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value, replacing any existing one.
    ///
    /// # Arguments
    ///
    /// * `key` - The store key
    /// * `value` - The encoded value
    /// * `ttl` - Optional time-to-live; `None` keeps the value until deleted
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Set a value only if the key is absent.
    ///
    /// Returns `true` if the value was stored.
    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Delete a key.
    ///
    /// Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Increment an integer value.
    ///
    /// Fails with [`CacheError::NotFound`] if the key does not exist; the
    /// store never creates the key as a side effect.
    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Set or update the expiration time for an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;

    /// Get a value, storing `default` first if the key is absent.
    ///
    /// If another writer wins the race the stored value is theirs.
    async fn get_or_set(
        &self,
        key: &str,
        default: String,
        ttl: Option<Duration>,
    ) -> CacheResult<String> {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        self.add(key, default.clone(), ttl).await?;
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Delete multiple keys in parallel.
    ///
    /// Returns the number of keys that existed.
    async fn delete_many(&self, keys: &[&str]) -> CacheResult<u64> {
        use futures::future::try_join_all;

        let futures = keys.iter().map(|key| self.delete(key));
        let deleted = try_join_all(futures).await?;
        Ok(deleted.into_iter().filter(|existed| *existed).count() as u64)
    }
}

/// Store with native set semantics.
///
/// Used by [`SetIndex`](crate::index::SetIndex) to keep surrogate indexes
/// without read-modify-write races.
#[async_trait]
pub trait SetStore: CacheStore {
    /// Add a member to the set at `key` and refresh the set's TTL, atomically.
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()>;

    /// Get all members of the set at `key` (empty if absent).
    async fn members_of(&self, key: &str) -> CacheResult<HashSet<String>>;

    /// Delete the set at `key`.
    async fn delete_key(&self, key: &str) -> CacheResult<bool>;
}

/// Parse a stored counter value.
pub(crate) fn parse_counter(key: &str, value: &str) -> CacheResult<i64> {
    value.trim().parse().map_err(|_| {
        CacheError::Deserialization(format!("value at '{}' is not an integer", key))
    })
}
