//! Integration tests for common page caching workflows.
//!
//! These tests drive a page through the public API the way an application
//! would: build a registry, wrap a handler, invalidate by tag.

use bytes::Bytes;
use http::request::Parts;
use http::{Request, Response, StatusCode, header};
use pagecache::backend::SURROGATE_KEY_HEADER;
use pagecache::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn path_key(parts: &Parts) -> String {
    parts.uri.path().to_string()
}

fn get(uri: &str) -> Request<()> {
    Request::get(uri).body(()).unwrap()
}

fn memory_registry(config: PageCacheConfig) -> Arc<BackendRegistry> {
    Arc::new(
        BackendRegistry::builder()
            .config(config)
            .set_store("default", Arc::new(MemoryStore::new()))
            .build()
            .unwrap(),
    )
}

async fn render(page: &CachePage, uri: &str, calls: &Arc<AtomicUsize>) -> Response<Bytes> {
    let calls = calls.clone();
    page.run(get(uri), move |req| async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Response::new(Bytes::from(format!("{} render {}", req.uri().path(), n)))
    })
    .await
    .unwrap()
}

// =============================================================================
// Versioned Tag Tests
// =============================================================================

#[tokio::test]
async fn test_versioned_tag_invalidation() {
    let registry = memory_registry(PageCacheConfig::new());
    let page = CachePage::builder(Duration::from_secs(300), path_key)
        .tag(Tag::versioned("catalog"))
        .registry(registry.clone())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    // First request renders and stores
    let first = render(&page, "/products/7", &calls).await;
    assert_eq!(first.body(), "/products/7 render 1");
    assert_eq!(first.headers()[header::CACHE_CONTROL], "max-age=300");
    assert!(first.headers().contains_key(header::EXPIRES));

    // Second request is served from the cache
    let second = render(&page, "/products/7", &calls).await;
    assert_eq!(second.body(), "/products/7 render 1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Bumping the version makes the stored page unreachable
    assert_eq!(invalidate_tag(&registry, "catalog", None).await.unwrap(), 2);
    let third = render(&page, "/products/7", &calls).await;
    assert_eq!(third.body(), "/products/7 render 2");

    // Pages that do not carry the tag are unaffected
    let other = CachePage::builder(Duration::from_secs(300), path_key)
        .registry(registry.clone())
        .build()
        .unwrap();
    render(&other, "/about", &calls).await;
    invalidate_tag(&registry, "catalog", None).await.unwrap();
    let about = render(&other, "/about", &calls).await;
    assert_eq!(about.body(), "/about render 3");
}

#[tokio::test]
async fn test_cache_key_changes_with_version() {
    let registry = memory_registry(PageCacheConfig::new());
    let page = CachePage::builder(Duration::from_secs(60), path_key)
        .tag(Tag::versioned("catalog"))
        .prefix("shop")
        .registry(registry.clone())
        .build()
        .unwrap();
    let (parts, _) = get("/products/7").into_parts();

    let before = page.cache_key(&parts).await.unwrap();
    assert_eq!(before, page.cache_key(&parts).await.unwrap());

    invalidate_tags(&registry, &["catalog"], None).await.unwrap();
    assert_ne!(before, page.cache_key(&parts).await.unwrap());
}

// =============================================================================
// Surrogate Key Tests
// =============================================================================

#[tokio::test]
async fn test_surrogate_invalidation_counts() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(StoreBackend::new(store));
    let page = CachePage::builder(Duration::from_secs(300), path_key)
        .tag("products")
        .tag(Tag::dynamic(|parts: &Parts| parts.uri.path().to_string()))
        .backend(backend.clone())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    for uri in ["/products/1", "/products/2", "/products/3"] {
        render(&page, uri, &calls).await;
    }

    assert_eq!(backend.invalidate_by_surrogate("products").await.unwrap(), 3);
    assert_eq!(backend.invalidate_by_surrogate("products").await.unwrap(), 0);

    render(&page, "/products/1", &calls).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_surrogate_header_is_budgeted() {
    let config = PageCacheConfig::new()
        .backend("edge", BackendConfig::new("header").option("max_header_size", 12))
        .default_backend("edge");
    let registry = memory_registry(config);
    let page = CachePage::builder(Duration::from_secs(300), path_key)
        .tags(["alpha", "beta", "gamma"])
        .registry(registry.clone())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let response = render(&page, "/tagged", &calls).await;
    assert_eq!(response.headers()[SURROGATE_KEY_HEADER], "alpha beta");

    // The header backend stores nothing
    render(&page, "/tagged", &calls).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Composite Backend Tests
// =============================================================================

#[tokio::test]
async fn test_composite_store_and_edge() {
    let config = PageCacheConfig::new()
        .backend("primary", BackendConfig::new("store"))
        .backend("edge", BackendConfig::new("header"))
        .backend(
            "both",
            BackendConfig::new("composite").option("backends", vec!["primary", "edge"]),
        )
        .default_backend("both");
    let registry = memory_registry(config);
    let page = CachePage::builder(Duration::from_secs(300), path_key)
        .tag(Tag::versioned("catalog"))
        .tag("products")
        .registry(registry.clone())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let first = render(&page, "/products/7", &calls).await;
    assert_eq!(first.headers()[SURROGATE_KEY_HEADER], "catalog products");

    // Reads come from the primary store
    render(&page, "/products/7", &calls).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The primary store's counter is bumped through the composite
    assert_eq!(invalidate_tag(&registry, "catalog", None).await.unwrap(), 2);
    render(&page, "/products/7", &calls).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Caching Decision Tests
// =============================================================================

#[tokio::test]
async fn test_unsuccessful_responses_are_not_stored() {
    let registry = memory_registry(PageCacheConfig::new());
    let page = CachePage::builder(Duration::from_secs(300), path_key)
        .registry(registry)
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = calls.clone();
        let response = page
            .run(get("/missing"), move |_req| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Bytes::from_static(b"not found"))
                    .unwrap()
            })
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key(header::CACHE_CONTROL));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bypass_and_bust() {
    let registry = memory_registry(PageCacheConfig::new());
    let page = CachePage::builder(Duration::from_secs(300), path_key)
        .registry(registry)
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    render(&page, "/page", &calls).await;

    let handler = |calls: Arc<AtomicUsize>| {
        move |_req: Request<()>| async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Response::new(Bytes::from(format!("render {}", n)))
        }
    };

    let mut bypass = get("/page");
    bypass.extensions_mut().insert(DoNotCache);
    let response = page.run(bypass, handler(calls.clone())).await.unwrap();
    assert_eq!(response.body(), "render 2");

    let mut bust = get("/page");
    bust.extensions_mut().insert(BustCache);
    let response = page.run(bust, handler(calls.clone())).await.unwrap();
    assert_eq!(response.body(), "render 3");

    // The busted render replaced the stored page
    let cached = render(&page, "/page", &calls).await;
    assert_eq!(cached.body(), "render 3");
}

#[tokio::test]
async fn test_deferred_response_is_stored_after_rendering() {
    let registry = memory_registry(PageCacheConfig::new());
    let page = CachePage::builder(Duration::from_secs(300), path_key)
        .registry(registry)
        .build()
        .unwrap();

    let response = page
        .run(get("/report"), |_req| async {
            let (parts, ()) = Response::new(()).into_parts();
            DeferredResponse::new(parts, async { Bytes::from_static(b"report") })
        })
        .await
        .unwrap();
    assert_eq!(response.body(), "report");

    let cached = page
        .run(get("/report"), |_req| async { Response::new(Bytes::from_static(b"stale")) })
        .await
        .unwrap();
    assert_eq!(cached.body(), "report");
}
