//! `Surrogate-Key` response header support.

use super::{CacheBackend, CacheEntry};
use crate::error::CacheResult;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, Response};

/// Name of the surrogate key header read by CDNs.
pub const SURROGATE_KEY_HEADER: &str = "Surrogate-Key";

/// Maximum total header size in bytes.
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

/// Maximum size of a single key in bytes.
pub const MAX_KEY_SIZE: usize = 1024;

/// Writes surrogate keys into the `Surrogate-Key` header within a byte budget.
///
/// Keys larger than `max_key_size` are skipped. Keys are appended in order
/// until the next one would push the header past `max_header_size`; the
/// header then stops there and keeps what it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurrogateHeader {
    pub max_header_size: usize,
    pub max_key_size: usize,
}

impl Default for SurrogateHeader {
    fn default() -> Self {
        Self {
            max_header_size: MAX_HEADER_SIZE,
            max_key_size: MAX_KEY_SIZE,
        }
    }
}

impl SurrogateHeader {
    pub fn new(max_header_size: usize, max_key_size: usize) -> Self {
        Self {
            max_header_size,
            max_key_size,
        }
    }

    /// Build the header value, or `None` if no key fits.
    ///
    /// Keys that are oversized or not valid header text are skipped.
    pub fn value_for(&self, surrogate_keys: &[String]) -> Option<String> {
        let mut accepted: Vec<&str> = Vec::new();
        let mut total = 0;

        for key in surrogate_keys {
            let size = key.len();
            if size > self.max_key_size || HeaderValue::from_str(key).is_err() {
                continue;
            }
            // Each key is counted with its separator.
            if total + size + 1 > self.max_header_size {
                break;
            }
            accepted.push(key);
            total += size + 1;
        }

        if accepted.is_empty() {
            None
        } else {
            Some(accepted.join(" "))
        }
    }

    /// Attach the header to `response`. Responses are left untouched when no
    /// key fits.
    pub fn apply(
        &self,
        mut response: Response<Bytes>,
        surrogate_keys: &[String],
    ) -> Response<Bytes> {
        let Some(value) = self.value_for(surrogate_keys) else {
            return response;
        };

        match HeaderValue::from_str(&value) {
            Ok(value) => {
                response.headers_mut().insert(SURROGATE_KEY_HEADER, value);
            }
            Err(err) => {
                tracing::warn!(error = %err, "Skipping invalid Surrogate-Key header");
            }
        }
        response
    }
}

/// Backend for CDN-fronted deployments.
///
/// Stores nothing. Every response passing through gets its surrogate keys in
/// the `Surrogate-Key` header so the edge can cache and purge by tag.
#[derive(Debug, Clone, Default)]
pub struct HeaderBackend {
    header: SurrogateHeader,
}

impl HeaderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom header budgets.
    pub fn with_limits(max_header_size: usize, max_key_size: usize) -> Self {
        Self {
            header: SurrogateHeader::new(max_header_size, max_key_size),
        }
    }

    pub fn header(&self) -> &SurrogateHeader {
        &self.header
    }
}

#[async_trait]
impl CacheBackend for HeaderBackend {
    async fn get(&self, _key: &str) -> CacheResult<Option<Response<Bytes>>> {
        Ok(None)
    }

    async fn set(&self, _entry: &CacheEntry) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    async fn invalidate_by_surrogate(&self, _surrogate_key: &str) -> CacheResult<u64> {
        Ok(0)
    }

    fn prepare_response(
        &self,
        response: Response<Bytes>,
        surrogate_keys: &[String],
    ) -> Response<Bytes> {
        self.header.apply(response, surrogate_keys)
    }
}
