//! Integration tests against a live Redis (`REDIS_URL`, default localhost).

use bytes::Bytes;
use http::Response;
use pagecache_core::prelude::*;
use pagecache_redis::{RedisConfig, RedisStore};
use std::sync::Arc;
use std::time::Duration;

async fn store(prefix: &str) -> Arc<RedisStore> {
    let config = RedisConfig::from_env()
        .key_prefix(format!("pagecache-test-{}-{}", prefix, std::process::id()))
        .build();
    Arc::new(RedisStore::new(config).await.unwrap())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_basic_operations() {
    let store = store("basic").await;

    store.set("k", "v".into(), Some(Duration::from_secs(30))).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

    assert!(!store.add("k", "other".into(), None).await.unwrap());
    assert!(store.delete("k").await.unwrap());
    assert!(!store.delete("k").await.unwrap());
    assert!(store.add("k", "other".into(), Some(Duration::from_secs(30))).await.unwrap());
    store.delete("k").await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_increment_requires_existing_key() {
    let store = store("incr").await;

    assert!(matches!(
        store.increment("counter", 1).await,
        Err(CacheError::NotFound(_))
    ));
    assert_eq!(store.get("counter").await.unwrap(), None);

    store.set("counter", "1".into(), Some(Duration::from_secs(30))).await.unwrap();
    assert_eq!(store.increment("counter", 1).await.unwrap(), 2);
    store.delete("counter").await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_sets() {
    let store = store("sets").await;

    store.add_to_set("s", "a", Duration::from_secs(30)).await.unwrap();
    store.add_to_set("s", "b", Duration::from_secs(30)).await.unwrap();
    assert_eq!(store.members_of("s").await.unwrap().len(), 2);

    assert!(store.delete_key("s").await.unwrap());
    assert!(store.members_of("s").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_backend_over_redis() {
    let store = store("backend").await;
    let registry = BackendRegistry::builder()
        .set_store("default", store)
        .build()
        .unwrap();
    let backend = registry.resolve_default("default").unwrap();

    let response = Response::new(Bytes::from_static(b"x"));
    let entry = CacheEntry::new("page", response, Duration::from_secs(30))
        .with_surrogate_keys(vec!["catalog".to_string()]);
    backend.set(&entry).await.unwrap();
    assert!(backend.get("page").await.unwrap().is_some());

    assert_eq!(backend.invalidate_by_surrogate("catalog").await.unwrap(), 1);
    assert!(backend.get("page").await.unwrap().is_none());

    let version = backend.get_group_version("catalog", Duration::from_secs(30)).await.unwrap();
    assert_eq!(backend.increment_group_version("catalog").await.unwrap(), version + 1);
}
