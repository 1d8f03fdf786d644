//! Response caching around a request handler.
//!
//! [`CachePage`] decides per request whether to bypass the cache, serve a
//! cached response, or run the handler and store what it produced.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use pagecache_core::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = Arc::new(StoreBackend::new(Arc::new(MemoryStore::new())));
//! let page = CachePage::builder(Duration::from_secs(300), |parts| parts.uri.path().to_string())
//!     .tag(Tag::versioned("catalog"))
//!     .backend(backend)
//!     .build()
//!     .unwrap();
//!
//! let request = Request::get("/products/7").body(()).unwrap();
//! let response = page
//!     .run(request, |_req| async { Response::new(Bytes::from_static(b"product 7")) })
//!     .await
//!     .unwrap();
//! assert_eq!(response.body(), "product 7");
//! # }
//! ```

use crate::backend::{CacheBackend, CacheEntry};
use crate::error::{CacheError, CacheResult};
use crate::expiry::patch_response_headers;
use crate::keys::build_key;
use crate::registry::{BackendRegistry, DEFAULT_STORE};
use crate::surrogates::{IntoTagNames, SurrogateKeySet};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::request::Parts;
use http::{Request, Response, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default TTL of a versioned tag's counter (10 days).
pub const DEFAULT_VERSIONED_TIMEOUT: Duration = Duration::from_secs(864_000);

/// Request extension: skip caching entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoNotCache;

/// Request extension: ignore any cached entry and store a fresh one.
#[derive(Debug, Clone, Copy, Default)]
pub struct BustCache;

type PartsFn<T> = Arc<dyn Fn(&Parts) -> T + Send + Sync>;

/// Name of a versioned tag.
#[derive(Clone)]
pub enum TagName {
    Static(String),
    Dynamic(PartsFn<String>),
}

impl TagName {
    fn resolve(&self, parts: &Parts) -> String {
        match self {
            Self::Static(name) => name.clone(),
            Self::Dynamic(f) => f(parts),
        }
    }
}

/// A tag attached to cached pages.
#[derive(Clone)]
pub enum Tag {
    /// Fixed surrogate key
    Static(String),
    /// Surrogate keys computed from the request
    Dynamic(PartsFn<Vec<String>>),
    /// Tag whose counter is part of the cache key
    Versioned { name: TagName, timeout: Duration },
}

impl Tag {
    /// Tag computed from the request. The function may return one name,
    /// several, or none.
    pub fn dynamic<F, T>(f: F) -> Self
    where
        F: Fn(&Parts) -> T + Send + Sync + 'static,
        T: IntoTagNames,
    {
        Self::Dynamic(Arc::new(move |parts| f(parts).into_tag_names()))
    }

    /// Versioned tag with a fixed name.
    ///
    /// Invalidating it bumps its counter, so every page keyed on the previous
    /// version becomes unreachable at once.
    pub fn versioned(name: impl Into<String>) -> Self {
        Self::Versioned {
            name: TagName::Static(name.into()),
            timeout: DEFAULT_VERSIONED_TIMEOUT,
        }
    }

    /// Versioned tag whose name is computed from the request.
    pub fn versioned_fn<F>(f: F) -> Self
    where
        F: Fn(&Parts) -> String + Send + Sync + 'static,
    {
        Self::Versioned {
            name: TagName::Dynamic(Arc::new(f)),
            timeout: DEFAULT_VERSIONED_TIMEOUT,
        }
    }

    /// Set the counter TTL of a versioned tag. Other tags are unchanged.
    pub fn with_timeout(self, ttl: Duration) -> Self {
        match self {
            Self::Versioned { name, .. } => Self::Versioned { name, timeout: ttl },
            other => other,
        }
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Self::Static(name.to_string())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Self::Static(name)
    }
}

/// Tags of one request, resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTags {
    /// Surrogate keys to index the entry under, versioned names included
    pub surrogates: SurrogateKeySet,
    /// Raw versioned tag names with their counter TTL, in declaration order
    pub versioned: Vec<(String, Duration)>,
}

/// Resolve a tag list against a request.
pub fn resolve_tags(parts: &Parts, tags: &[Tag]) -> ResolvedTags {
    let mut resolved = ResolvedTags::default();

    for tag in tags {
        match tag {
            Tag::Static(name) => {
                resolved.surrogates.add(name);
            }
            Tag::Dynamic(f) => {
                resolved.surrogates.extend(f(parts));
            }
            Tag::Versioned { name, timeout } => {
                let name = name.resolve(parts);
                resolved.surrogates.add(&name);
                resolved.versioned.push((name, *timeout));
            }
        }
    }

    resolved
}

/// Lifetime of a stored page.
#[derive(Clone)]
pub enum Timeout {
    Fixed(Duration),
    Computed(Arc<dyn Fn(&Response<Bytes>) -> Duration + Send + Sync>),
}

impl Timeout {
    /// Timeout computed from the finished response.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> Duration + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    pub fn resolve(&self, response: &Response<Bytes>) -> Duration {
        match self {
            Self::Fixed(timeout) => *timeout,
            Self::Computed(f) => f(response),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(timeout: Duration) -> Self {
        Self::Fixed(timeout)
    }
}

/// Cache key prefix.
#[derive(Clone)]
pub enum Prefix {
    Static(String),
    Dynamic(PartsFn<String>),
}

impl Prefix {
    fn resolve(&self, parts: &Parts) -> String {
        match self {
            Self::Static(prefix) => prefix.clone(),
            Self::Dynamic(f) => f(parts),
        }
    }
}

impl From<&str> for Prefix {
    fn from(prefix: &str) -> Self {
        Self::Static(prefix.to_string())
    }
}

impl From<String> for Prefix {
    fn from(prefix: String) -> Self {
        Self::Static(prefix)
    }
}

/// Which backend a page is cached in.
#[derive(Clone)]
pub enum BackendSelector {
    /// The registry's default backend over the named store
    Default { cache_name: String },
    /// A named backend from the registry
    Named(String),
    /// A concrete backend
    Instance(Arc<dyn CacheBackend>),
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::Default {
            cache_name: DEFAULT_STORE.to_string(),
        }
    }
}

/// Response whose body is still being rendered.
pub struct DeferredResponse {
    pub parts: http::response::Parts,
    pub body: BoxFuture<'static, Bytes>,
}

impl DeferredResponse {
    pub fn new<F>(parts: http::response::Parts, body: F) -> Self
    where
        F: Future<Output = Bytes> + Send + 'static,
    {
        Self {
            parts,
            body: Box::pin(body),
        }
    }

    /// Wait for the body and assemble the response.
    pub async fn render(self) -> Response<Bytes> {
        let body = self.body.await;
        Response::from_parts(self.parts, body)
    }
}

/// What a handler produces: a finished response, or one rendered later.
pub enum Rendered {
    Ready(Response<Bytes>),
    Deferred(DeferredResponse),
}

impl Rendered {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ready(response) => response.status(),
            Self::Deferred(deferred) => deferred.parts.status,
        }
    }

    /// Finish rendering.
    pub async fn finish(self) -> Response<Bytes> {
        match self {
            Self::Ready(response) => response,
            Self::Deferred(deferred) => deferred.render().await,
        }
    }
}

impl From<Response<Bytes>> for Rendered {
    fn from(response: Response<Bytes>) -> Self {
        Self::Ready(response)
    }
}

impl From<DeferredResponse> for Rendered {
    fn from(deferred: DeferredResponse) -> Self {
        Self::Deferred(deferred)
    }
}

/// Caching policy for one kind of page.
pub struct CachePage {
    timeout: Timeout,
    key_fn: PartsFn<String>,
    tags: Vec<Tag>,
    prefix: Option<Prefix>,
    backend: BackendSelector,
    only_if: Option<PartsFn<bool>>,
    registry: Option<Arc<BackendRegistry>>,
}

impl CachePage {
    /// Start a page policy with its timeout and request key function.
    pub fn builder<F>(timeout: impl Into<Timeout>, key_fn: F) -> CachePageBuilder
    where
        F: Fn(&Parts) -> String + Send + Sync + 'static,
    {
        CachePageBuilder {
            timeout: timeout.into(),
            key_fn: Arc::new(key_fn),
            tags: Vec::new(),
            prefix: None,
            backend: BackendSelector::default(),
            only_if: None,
            registry: None,
        }
    }

    /// The backend this page is cached in.
    pub fn resolve_backend(&self) -> CacheResult<Arc<dyn CacheBackend>> {
        match (&self.backend, &self.registry) {
            (BackendSelector::Instance(backend), _) => Ok(backend.clone()),
            (BackendSelector::Named(name), Some(registry)) => registry.resolve(name),
            (BackendSelector::Default { cache_name }, Some(registry)) => {
                registry.resolve_default(cache_name)
            }
            (_, None) => Err(CacheError::Config(
                "a registry is required to resolve a backend by name".to_string(),
            )),
        }
    }

    /// Compute the final cache key for a request.
    pub async fn cache_key(&self, parts: &Parts) -> CacheResult<String> {
        let backend = self.resolve_backend()?;
        let tags = resolve_tags(parts, &self.tags);
        self.key_for(parts, &tags, backend.as_ref()).await
    }

    async fn key_for(
        &self,
        parts: &Parts,
        tags: &ResolvedTags,
        backend: &dyn CacheBackend,
    ) -> CacheResult<String> {
        let mut version_parts = Vec::with_capacity(tags.versioned.len());
        for (name, ttl) in &tags.versioned {
            let version = backend.get_group_version(name, *ttl).await?;
            version_parts.push(format!("{}:{}", name, version));
        }

        let prefix = self.prefix.as_ref().map(|p| p.resolve(parts));
        Ok(build_key(
            prefix.as_deref(),
            &version_parts,
            &(self.key_fn)(parts),
        ))
    }

    /// Serve `request` from the cache, or run `handler` and store its response.
    ///
    /// Only `200 OK` responses are stored. Store errors are returned to the
    /// caller; an entry that fails to decode counts as a miss.
    pub async fn run<B, F, Fut, R>(
        &self,
        request: Request<B>,
        handler: F,
    ) -> CacheResult<Response<Bytes>>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = R>,
        R: Into<Rendered>,
    {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();

        let rejected = self.only_if.as_ref().is_some_and(|only_if| !only_if(&parts));
        if parts.extensions.get::<DoNotCache>().is_some() || rejected {
            debug!(path = %path, "Bypassing page cache");
            let rendered: Rendered = handler(Request::from_parts(parts, body)).await.into();
            return Ok(rendered.finish().await);
        }

        let backend = self.resolve_backend()?;
        let tags = resolve_tags(&parts, &self.tags);
        let key = self.key_for(&parts, &tags, backend.as_ref()).await?;

        if parts.extensions.get::<BustCache>().is_none() {
            if let Some(cached) = backend.get(&key).await? {
                debug!(key = %key, path = %path, "Page cache hit");
                return Ok(cached);
            }
            debug!(key = %key, path = %path, "Page cache miss");
        } else {
            debug!(key = %key, path = %path, "Refreshing cached page");
        }

        let rendered: Rendered = handler(Request::from_parts(parts, body)).await.into();
        if rendered.status() != StatusCode::OK {
            debug!(key = %key, status = %rendered.status(), "Not caching unsuccessful response");
            return Ok(rendered.finish().await);
        }

        let mut response = rendered.finish().await;
        let timeout = self.timeout.resolve(&response);
        patch_response_headers(&mut response, timeout);

        let surrogate_keys = tags.surrogates.keys();
        let response = backend.prepare_response(response, &surrogate_keys);
        let entry = CacheEntry::new(key, response, timeout).with_surrogate_keys(surrogate_keys);
        backend.set(&entry).await?;
        debug!(key = %entry.key, timeout_secs = timeout.as_secs(), "Stored page");

        Ok(entry.into_response())
    }
}

/// Builder for [`CachePage`].
pub struct CachePageBuilder {
    timeout: Timeout,
    key_fn: PartsFn<String>,
    tags: Vec<Tag>,
    prefix: Option<Prefix>,
    backend: BackendSelector,
    only_if: Option<PartsFn<bool>>,
    registry: Option<Arc<BackendRegistry>>,
}

impl CachePageBuilder {
    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add several tags.
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn prefix(mut self, prefix: impl Into<Prefix>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Prefix computed from the request.
    pub fn prefix_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts) -> String + Send + Sync + 'static,
    {
        self.prefix = Some(Prefix::Dynamic(Arc::new(f)));
        self
    }

    /// Cache only requests accepted by `predicate`.
    pub fn only_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Parts) -> bool + Send + Sync + 'static,
    {
        self.only_if = Some(Arc::new(predicate));
        self
    }

    /// Registry used to resolve named and default backends.
    pub fn registry(mut self, registry: Arc<BackendRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a concrete backend.
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = BackendSelector::Instance(backend);
        self
    }

    /// Use a named backend from the registry.
    pub fn backend_name(mut self, name: impl Into<String>) -> Self {
        self.backend = BackendSelector::Named(name.into());
        self
    }

    /// Use the registry's default backend over the named store.
    pub fn cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.backend = BackendSelector::Default {
            cache_name: cache_name.into(),
        };
        self
    }

    pub fn build(self) -> CacheResult<CachePage> {
        if self.registry.is_none() && !matches!(self.backend, BackendSelector::Instance(_)) {
            return Err(CacheError::Config(
                "a registry is required unless a backend instance is given".to_string(),
            ));
        }

        Ok(CachePage {
            timeout: self.timeout,
            key_fn: self.key_fn,
            tags: self.tags,
            prefix: self.prefix,
            backend: self.backend,
            only_if: self.only_if,
            registry: self.registry,
        })
    }
}
