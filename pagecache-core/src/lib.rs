//! HTTP response caching with tag-based invalidation.
//!
//! Pages are cached under a digest of their prefix, the versions of their
//! versioned tags and a request-derived key. Entries can be invalidated two
//! ways:
//!
//! - **Surrogate keys**: every entry is indexed under its tags, and
//!   invalidating a tag deletes all entries indexed under it.
//! - **Versioned tags**: the tag's counter is part of the cache key, so
//!   bumping it makes every older entry unreachable in one step.
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
//! # async fn main() -> Result<(), CacheError> {
//! let registry = Arc::new(
//!     BackendRegistry::builder()
//!         .set_store("default", Arc::new(MemoryStore::new()))
//!         .build()?,
//! );
//!
//! let page = CachePage::builder(Duration::from_secs(300), |parts| parts.uri.path().to_string())
//!     .tag(Tag::versioned("catalog"))
//!     .tag("products")
//!     .registry(registry.clone())
//!     .build()?;
//!
//! let request = Request::get("/products/7").body(()).unwrap();
//! page.run(request, |_req| async { Response::new(Bytes::from_static(b"product 7")) })
//!     .await?;
//!
//! // Bumps the "catalog" version; the next request renders afresh.
//! assert_eq!(invalidate_tag(&registry, "catalog", None).await?, 2);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod expiry;
pub mod index;
pub mod invalidate;
pub mod keys;
pub mod memory;
pub mod page;
pub mod registry;
pub mod store;
pub mod surrogates;

pub use error::{CacheError, CacheResult};

/// Commonly used types.
pub mod prelude {
    pub use crate::backend::{
        CacheBackend, CacheEntry, CompositeBackend, GroupVersioning, HeaderBackend, NullBackend,
        StoreBackend,
    };
    pub use crate::config::{BackendConfig, PageCacheConfig};
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::index::{NullIndex, SetIndex, StoreIndex, SurrogateIndex};
    pub use crate::invalidate::{invalidate_tag, invalidate_tags};
    pub use crate::memory::MemoryStore;
    pub use crate::page::{
        BustCache, CachePage, DeferredResponse, DoNotCache, Rendered, Tag, Timeout,
    };
    pub use crate::registry::BackendRegistry;
    pub use crate::store::{CacheStore, SetStore};
    pub use crate::surrogates::{CacheUser, SurrogateKeySet};
}
