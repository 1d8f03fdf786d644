//! Cache backends.
//!
//! A backend unifies storage, surrogate invalidation and (optionally) group
//! versioning behind [`CacheBackend`]. Backends compose: [`CompositeBackend`]
//! fans every operation out over a list of other backends.

mod codec;
mod composite;
mod header;
mod null;
mod store;

pub use codec::{CACHEABLE_HEADERS, DEFAULT_CONTENT_TYPE, StoredResponse};
pub use composite::CompositeBackend;
pub use header::{
    HeaderBackend, MAX_HEADER_SIZE, MAX_KEY_SIZE, SURROGATE_KEY_HEADER, SurrogateHeader,
};
pub use null::NullBackend;
pub use store::{DEFAULT_VERSION_PREFIX, DEFAULT_VERSION_TIMEOUT, StoreBackend};

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use std::time::Duration;

/// A response about to be stored, with its metadata.
#[derive(Debug)]
pub struct CacheEntry {
    /// Final cache key
    pub key: String,
    /// The response to store
    pub response: Response<Bytes>,
    /// How long the entry lives
    pub timeout: Duration,
    /// Surrogate keys to index the entry under
    pub surrogate_keys: Vec<String>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, response: Response<Bytes>, timeout: Duration) -> Self {
        Self {
            key: key.into(),
            response,
            timeout,
            surrogate_keys: Vec::new(),
        }
    }

    pub fn with_surrogate_keys(mut self, keys: Vec<String>) -> Self {
        self.surrogate_keys = keys;
        self
    }

    /// Take the response back out of the entry.
    pub fn into_response(self) -> Response<Bytes> {
        self.response
    }
}

/// Storage strategy for cached responses.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Retrieve a cached response by key.
    ///
    /// Entries that cannot be decoded are reported as a miss.
    async fn get(&self, key: &str) -> CacheResult<Option<Response<Bytes>>>;

    /// Store a response and index it under its surrogate keys.
    async fn set(&self, entry: &CacheEntry) -> CacheResult<()>;

    /// Delete a single entry. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Invalidate every entry tagged with `surrogate_key`.
    ///
    /// Returns the number of entries invalidated (0 for an unknown key).
    async fn invalidate_by_surrogate(&self, surrogate_key: &str) -> CacheResult<u64>;

    /// Invalidate every entry tagged with any of `surrogate_keys`.
    async fn invalidate_by_surrogates(&self, surrogate_keys: &[String]) -> CacheResult<u64> {
        let mut total = 0;
        for key in surrogate_keys {
            total += self.invalidate_by_surrogate(key).await?;
        }
        Ok(total)
    }

    /// Adjust the response before it is stored and sent.
    fn prepare_response(
        &self,
        response: Response<Bytes>,
        _surrogate_keys: &[String],
    ) -> Response<Bytes> {
        response
    }

    /// Group versioning capability, if the backend has one.
    fn versioning(&self) -> Option<&dyn GroupVersioning> {
        None
    }

    /// Get or create the version counter for a group.
    async fn get_group_version(&self, group: &str, timeout: Duration) -> CacheResult<u64> {
        match self.versioning() {
            Some(versioning) => versioning.get_version(group, timeout).await,
            None => Err(unsupported_versioning()),
        }
    }

    /// Increment the version counter for a group, making every entry keyed
    /// on the previous version unreachable.
    async fn increment_group_version(&self, group: &str) -> CacheResult<u64> {
        match self.versioning() {
            Some(versioning) => versioning.increment_version(group).await,
            None => Err(unsupported_versioning()),
        }
    }
}

/// Per-group version counters.
#[async_trait]
pub trait GroupVersioning: Send + Sync {
    /// Return the current version, initializing it to 1 with `timeout` if absent.
    async fn get_version(&self, group: &str, timeout: Duration) -> CacheResult<u64>;

    /// Atomically increment and return the new version.
    ///
    /// A counter that does not exist (never read, or expired) is
    /// re-initialized to 2.
    async fn increment_version(&self, group: &str) -> CacheResult<u64>;
}

pub(crate) fn unsupported_versioning() -> CacheError {
    CacheError::Unsupported("group versioning not supported by this backend".to_string())
}
