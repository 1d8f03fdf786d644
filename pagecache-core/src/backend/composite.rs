//! Fan-out over several backends.

use super::{CacheBackend, CacheEntry, GroupVersioning, unsupported_versioning};
use crate::error::CacheResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use http::Response;
use std::sync::Arc;
use std::time::Duration;

/// Backend writing to every child and reading from one.
///
/// `get` goes to the child at `read_from` only; an index outside the list is
/// a miss. Writes, deletes and invalidations go to every child.
pub struct CompositeBackend {
    backends: Vec<Arc<dyn CacheBackend>>,
    read_from: Option<usize>,
}

impl CompositeBackend {
    /// Create a composite reading from `backends[read_from]`.
    ///
    /// A negative `read_from` is accepted and always misses.
    pub fn new(backends: Vec<Arc<dyn CacheBackend>>, read_from: i64) -> Self {
        Self {
            backends,
            read_from: usize::try_from(read_from).ok(),
        }
    }

    /// The child backends, in order.
    pub fn backends(&self) -> &[Arc<dyn CacheBackend>] {
        &self.backends
    }

    fn reader(&self) -> Option<&Arc<dyn CacheBackend>> {
        self.read_from.and_then(|index| self.backends.get(index))
    }

    fn versioned(&self) -> impl Iterator<Item = &dyn GroupVersioning> {
        self.backends.iter().filter_map(|backend| backend.versioning())
    }
}

#[async_trait]
impl CacheBackend for CompositeBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Response<Bytes>>> {
        match self.reader() {
            Some(backend) => backend.get(key).await,
            None => Ok(None),
        }
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        try_join_all(self.backends.iter().map(|backend| backend.set(entry))).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let deleted = try_join_all(self.backends.iter().map(|backend| backend.delete(key))).await?;
        Ok(deleted.into_iter().any(|d| d))
    }

    async fn invalidate_by_surrogate(&self, surrogate_key: &str) -> CacheResult<u64> {
        let counts = try_join_all(
            self.backends
                .iter()
                .map(|backend| backend.invalidate_by_surrogate(surrogate_key)),
        )
        .await?;
        Ok(counts.into_iter().sum())
    }

    async fn invalidate_by_surrogates(&self, surrogate_keys: &[String]) -> CacheResult<u64> {
        let counts = try_join_all(
            self.backends
                .iter()
                .map(|backend| backend.invalidate_by_surrogates(surrogate_keys)),
        )
        .await?;
        Ok(counts.into_iter().sum())
    }

    fn prepare_response(
        &self,
        response: Response<Bytes>,
        surrogate_keys: &[String],
    ) -> Response<Bytes> {
        self.backends
            .iter()
            .fold(response, |response, backend| {
                backend.prepare_response(response, surrogate_keys)
            })
    }

    fn versioning(&self) -> Option<&dyn GroupVersioning> {
        if self.versioned().next().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl GroupVersioning for CompositeBackend {
    async fn get_version(&self, group: &str, timeout: Duration) -> CacheResult<u64> {
        match self.versioned().next() {
            Some(versioning) => versioning.get_version(group, timeout).await,
            None => Err(unsupported_versioning()),
        }
    }

    async fn increment_version(&self, group: &str) -> CacheResult<u64> {
        let mut first = None;
        for versioning in self.versioned() {
            let version = versioning.increment_version(group).await?;
            first.get_or_insert(version);
        }
        first.ok_or_else(unsupported_versioning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeaderBackend, NullBackend, StoreBackend};
    use crate::memory::MemoryStore;
    use crate::store::CacheStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records calls and reports a fixed invalidation count.
    #[derive(Default)]
    struct MockBackend {
        sets: AtomicUsize,
        invalidated: u64,
    }

    #[async_trait]
    impl CacheBackend for MockBackend {
        async fn get(&self, _key: &str) -> CacheResult<Option<Response<Bytes>>> {
            Ok(None)
        }

        async fn set(&self, _entry: &CacheEntry) -> CacheResult<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Ok(false)
        }

        async fn invalidate_by_surrogate(&self, _surrogate_key: &str) -> CacheResult<u64> {
            Ok(self.invalidated)
        }
    }

    fn entry(key: &str, tags: &[&str]) -> CacheEntry {
        CacheEntry::new(key, Response::new(Bytes::from_static(b"test")), Duration::from_secs(300))
            .with_surrogate_keys(tags.iter().map(|t| t.to_string()).collect())
    }

    fn store_backend() -> Arc<StoreBackend> {
        Arc::new(StoreBackend::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_set_fans_out() {
        let a = store_backend();
        let b = store_backend();
        let composite = CompositeBackend::new(vec![a.clone(), b.clone()], 0);

        composite.set(&entry("k", &[])).await.unwrap();
        assert!(a.get("k").await.unwrap().is_some());
        assert!(b.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_reads_only_designated_backend() {
        let a = store_backend();
        let b = store_backend();
        b.set(&entry("only-b", &[])).await.unwrap();

        let from_a = CompositeBackend::new(vec![a.clone(), b.clone()], 0);
        assert!(from_a.get("only-b").await.unwrap().is_none());

        let from_b = CompositeBackend::new(vec![a, b], 1);
        assert!(from_b.get("only-b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_read_is_miss() {
        let a = store_backend();
        a.set(&entry("k", &[])).await.unwrap();

        assert!(CompositeBackend::new(vec![a.clone()], 5).get("k").await.unwrap().is_none());
        assert!(CompositeBackend::new(vec![a], -1).get("k").await.unwrap().is_none());
        assert!(CompositeBackend::new(vec![], 0).get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_true_if_any() {
        let a = store_backend();
        let b = store_backend();
        b.set(&entry("k", &[])).await.unwrap();

        let composite = CompositeBackend::new(vec![a, b], 0);
        assert!(composite.delete("k").await.unwrap());
        assert!(!composite.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidation_counts_are_summed() {
        let mock = Arc::new(MockBackend {
            invalidated: 3,
            ..Default::default()
        });
        let real = store_backend();
        real.set(&entry("k", &["t"])).await.unwrap();

        let composite = CompositeBackend::new(vec![mock.clone(), real], 0);
        assert_eq!(composite.invalidate_by_surrogate("t").await.unwrap(), 4);

        let tags = vec!["t".to_string(), "u".to_string()];
        assert_eq!(composite.invalidate_by_surrogates(&tags).await.unwrap(), 6);

        composite.set(&entry("k2", &[])).await.unwrap();
        assert_eq!(mock.sets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prepare_response_chains() {
        let composite = CompositeBackend::new(
            vec![Arc::new(NullBackend), Arc::new(HeaderBackend::new())],
            0,
        );
        let response = composite.prepare_response(
            Response::new(Bytes::new()),
            &["a".to_string(), "b".to_string()],
        );
        assert_eq!(response.headers()["surrogate-key"], "a b");
    }

    #[tokio::test]
    async fn test_versioning_unsupported_without_capable_child() {
        let composite = CompositeBackend::new(
            vec![Arc::new(NullBackend), Arc::new(HeaderBackend::new())],
            0,
        );
        assert!(composite.versioning().is_none());
        let err = composite.increment_group_version("g").await.unwrap_err();
        assert!(err.is_unsupported());
        let err = composite
            .get_group_version("g", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn test_get_group_version_uses_first_capable() {
        let first_store = Arc::new(MemoryStore::new());
        first_store
            .set("_version:g", "7".to_string(), None)
            .await
            .unwrap();
        let first = Arc::new(StoreBackend::new(first_store));
        let second = store_backend();

        let composite =
            CompositeBackend::new(vec![Arc::new(NullBackend), first, second.clone()], 0);
        let version = composite
            .get_group_version("g", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(version, 7);

        // The second store was never asked.
        let untouched = second.store().get("_version:g").await.unwrap();
        assert!(untouched.is_none());
    }

    #[tokio::test]
    async fn test_increment_advances_all_and_returns_first() {
        let first_store = Arc::new(MemoryStore::new());
        first_store
            .set("_version:g", "4".to_string(), None)
            .await
            .unwrap();
        let first = Arc::new(StoreBackend::new(first_store.clone()));
        let second_store = Arc::new(MemoryStore::new());
        let second = Arc::new(StoreBackend::new(second_store.clone()));

        let composite = CompositeBackend::new(vec![first, second], 0);
        assert_eq!(composite.increment_group_version("g").await.unwrap(), 5);
        assert_eq!(second_store.get("_version:g").await.unwrap(), Some("2".to_string()));
    }
}
