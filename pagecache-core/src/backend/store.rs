//! Single-store backend.

use super::codec::StoredResponse;
use super::header::SurrogateHeader;
use super::{CacheBackend, CacheEntry, GroupVersioning};
use crate::error::{CacheError, CacheResult};
use crate::index::{StoreIndex, SurrogateIndex};
use crate::store::{CacheStore, parse_counter};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use http::Response;
use std::sync::Arc;
use std::time::Duration;

/// Default namespace for version counters.
pub const DEFAULT_VERSION_PREFIX: &str = "_version:";

/// Default TTL for counters re-initialized by an increment (10 days).
pub const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(864_000);

/// Backend over one [`CacheStore`] plus a [`SurrogateIndex`].
///
/// Supports group versioning through the store's atomic counters.
pub struct StoreBackend {
    store: Arc<dyn CacheStore>,
    index: Arc<dyn SurrogateIndex>,
    version_prefix: String,
    version_timeout: Duration,
    header: Option<SurrogateHeader>,
}

impl StoreBackend {
    /// Create a backend using the generic in-store index.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        let index = Arc::new(StoreIndex::new(store.clone()));
        Self::with_index(store, index)
    }

    /// Create a backend with an explicit surrogate index.
    pub fn with_index(store: Arc<dyn CacheStore>, index: Arc<dyn SurrogateIndex>) -> Self {
        Self {
            store,
            index,
            version_prefix: DEFAULT_VERSION_PREFIX.to_string(),
            version_timeout: DEFAULT_VERSION_TIMEOUT,
            header: None,
        }
    }

    /// Set the namespace for version counters.
    pub fn version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = prefix.into();
        self
    }

    /// Set the TTL used when an increment re-initializes a counter.
    pub fn version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    /// Also emit the `Surrogate-Key` header from `prepare_response`.
    pub fn surrogate_header(mut self, header: SurrogateHeader) -> Self {
        self.header = Some(header);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// The surrogate index.
    pub fn index(&self) -> &Arc<dyn SurrogateIndex> {
        &self.index
    }

    fn version_key(&self, group: &str) -> String {
        format!("{}{}", self.version_prefix, group)
    }
}

#[async_trait]
impl CacheBackend for StoreBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Response<Bytes>>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        match StoredResponse::decode(&raw).and_then(StoredResponse::into_response) {
            Ok(response) => Ok(Some(response)),
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    error = %err,
                    "Treating undecodable cache entry as a miss"
                );
                Ok(None)
            }
        }
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        let encoded = StoredResponse::from_response(&entry.response).encode()?;
        self.store
            .set(&entry.key, encoded, Some(entry.timeout))
            .await?;

        for surrogate in &entry.surrogate_keys {
            self.index.add(surrogate, &entry.key).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.store.delete(key).await
    }

    async fn invalidate_by_surrogate(&self, surrogate_key: &str) -> CacheResult<u64> {
        let keys = self.index.get_keys(surrogate_key).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let deletes = keys.iter().map(|key| self.store.delete(key));
        let count = try_join_all(deletes)
            .await?
            .into_iter()
            .filter(|deleted| *deleted)
            .count() as u64;

        self.index.remove(surrogate_key).await?;
        tracing::debug!(tag = %surrogate_key, count, "Invalidated entries by surrogate key");
        Ok(count)
    }

    fn prepare_response(
        &self,
        response: Response<Bytes>,
        surrogate_keys: &[String],
    ) -> Response<Bytes> {
        match &self.header {
            Some(header) => header.apply(response, surrogate_keys),
            None => response,
        }
    }

    fn versioning(&self) -> Option<&dyn GroupVersioning> {
        Some(self)
    }
}

#[async_trait]
impl GroupVersioning for StoreBackend {
    async fn get_version(&self, group: &str, timeout: Duration) -> CacheResult<u64> {
        let key = self.version_key(group);
        let raw = self
            .store
            .get_or_set(&key, "1".to_string(), Some(timeout))
            .await?;
        to_version(&key, parse_counter(&key, &raw)?)
    }

    async fn increment_version(&self, group: &str) -> CacheResult<u64> {
        let key = self.version_key(group);
        match self.store.increment(&key, 1).await {
            Ok(version) => to_version(&key, version),
            Err(CacheError::NotFound(_)) => {
                self.store
                    .set(&key, "2".to_string(), Some(self.version_timeout))
                    .await?;
                Ok(2)
            }
            Err(err) => Err(err),
        }
    }
}

fn to_version(key: &str, value: i64) -> CacheResult<u64> {
    u64::try_from(value)
        .map_err(|_| CacheError::Deserialization(format!("negative version at '{}'", key)))
}
