use super::{CacheBackend, CacheEntry};
use crate::error::CacheResult;
use async_trait::async_trait;
use bytes::Bytes;
use http::Response;

/// Backend that caches nothing. Useful to switch caching off by configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

#[async_trait]
impl CacheBackend for NullBackend {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_null_backend() {
        let backend = NullBackend;
        let entry = CacheEntry::new("k", Response::new(Bytes::new()), Duration::from_secs(1));
        backend.set(&entry).await.unwrap();

        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.invalidate_by_surrogate("t").await.unwrap(), 0);
        assert!(
            backend
                .get_group_version("t", Duration::from_secs(1))
                .await
                .unwrap_err()
                .is_unsupported()
        );
    }
}
