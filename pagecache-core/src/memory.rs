//! In-process store.

use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, SetStore, parse_counter};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Slot {
    Value(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct StoreEntry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn new(slot: Slot, ttl: Option<Duration>) -> Self {
        Self {
            slot,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory store with per-key expiry.
///
/// Supports both the plain and the set contract, so backends over it get the
/// native surrogate index. Expiry uses the tokio clock, which makes TTL
/// behaviour testable with a paused runtime.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, StoreEntry>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every key.
    pub async fn clear(&self) {
        self.data.write().await.clear();
    }

    /// Remaining TTL of a key, if it has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let data = self.data.read().await;
        let entry = data.get(key).filter(|entry| !entry.is_expired(now))?;
        entry.expires_at.map(|at| at - now)
    }

    fn wrong_type(key: &str) -> CacheError {
        CacheError::Store(format!("key '{}' holds the wrong kind of value", key))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let data = self.data.read().await;
        match data.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => match &entry.slot {
                Slot::Value(value) => Ok(Some(value.clone())),
                Slot::Set(_) => Err(Self::wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let entry = StoreEntry::new(Slot::Value(value), ttl);
        self.data.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get(key)
            && !entry.is_expired(Instant::now())
        {
            return Ok(false);
        }
        data.insert(key.to_string(), StoreEntry::new(Slot::Value(value), ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed = self.data.write().await.remove(key);
        Ok(removed.is_some_and(|entry| !entry.is_expired(Instant::now())))
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut data = self.data.write().await;
        let now = Instant::now();

        let entry = match data.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => entry,
            _ => return Err(CacheError::NotFound(key.to_string())),
        };

        let Slot::Value(value) = &mut entry.slot else {
            return Err(Self::wrong_type(key));
        };

        let new_value = parse_counter(key, value)?
            .checked_add(delta)
            .ok_or_else(|| CacheError::Store(format!("increment of '{}' overflows", key)))?;
        *value = new_value.to_string();
        Ok(new_value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[async_trait]
impl SetStore for MemoryStore {
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        let mut data = self.data.write().await;
        let now = Instant::now();

        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| StoreEntry::new(Slot::Set(HashSet::new()), None));
        if entry.is_expired(now) {
            entry.slot = Slot::Set(HashSet::new());
        }

        let Slot::Set(members) = &mut entry.slot else {
            return Err(Self::wrong_type(key));
        };
        members.insert(member.to_string());
        entry.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn members_of(&self, key: &str) -> CacheResult<HashSet<String>> {
        let data = self.data.read().await;
        match data.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => match &entry.slot {
                Slot::Set(members) => Ok(members.clone()),
                Slot::Value(_) => Err(Self::wrong_type(key)),
            },
            _ => Ok(HashSet::new()),
        }
    }

    async fn delete_key(&self, key: &str) -> CacheResult<bool> {
        self.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();

        store.set("a", "1".to_string(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("short", "v".to_string(), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("short").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_only_when_absent() {
        let store = MemoryStore::new();
        assert!(store.add("k", "first".into(), None).await.unwrap());
        assert!(!store.add("k", "second".into(), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_increment_requires_existing_key() {
        let store = MemoryStore::new();
        let err = store.increment("counter", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
        assert_eq!(store.get("counter").await.unwrap(), None);

        store.set("counter", "1".into(), None).await.unwrap();
        assert_eq!(store.increment("counter", 1).await.unwrap(), 2);
        assert_eq!(store.increment("counter", 5).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_increment_non_integer() {
        let store = MemoryStore::new();
        store.set("text", "abc".into(), None).await.unwrap();
        let err = store.increment("text", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_increment_overflow_is_an_error() {
        let store = MemoryStore::new();
        store.set("max", i64::MAX.to_string(), None).await.unwrap();

        let err = store.increment("max", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(_)));
        assert_eq!(store.get("max").await.unwrap(), Some(i64::MAX.to_string()));
    }

    #[tokio::test]
    async fn test_get_or_set() {
        let store = MemoryStore::new();
        let value = store
            .get_or_set("v", "1".into(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(value, "1");

        store.increment("v", 1).await.unwrap();
        let value = store.get_or_set("v", "1".into(), None).await.unwrap();
        assert_eq!(value, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_members_refresh_ttl() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);

        store.add_to_set("tags", "a", ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        store.add_to_set("tags", "b", ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        let members = store.members_of("tags").await.unwrap();
        assert_eq!(members.len(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.members_of("tags").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_access() {
        let store = MemoryStore::new();
        store
            .add_to_set("set", "m", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(store.get("set").await.is_err());

        store.set("plain", "v".into(), None).await.unwrap();
        assert!(store.members_of("plain").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_many_counts_existing() {
        let store = MemoryStore::new();
        store.set("a", "1".into(), None).await.unwrap();
        store.set("b", "2".into(), None).await.unwrap();

        let deleted = store.delete_many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(deleted, 2);
    }
}
