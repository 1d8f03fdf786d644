//! Tag invalidation entry points.

use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};
use crate::registry::BackendRegistry;
use tracing::debug;

/// Invalidate every page tagged with `tag`.
///
/// Bumps the tag's version counter when the backend supports versioning and
/// returns the new version. Otherwise deletes the tagged entries and returns
/// how many were removed. `backend` names a registry backend; `None` uses the
/// default one.
pub async fn invalidate_tag(
    registry: &BackendRegistry,
    tag: &str,
    backend: Option<&str>,
) -> CacheResult<u64> {
    let backend = registry.resolve_or_default(backend)?;
    invalidate_tag_on(backend.as_ref(), tag).await
}

/// Invalidate every page tagged with any of `tags`, summing the per-tag
/// results of [`invalidate_tag`].
pub async fn invalidate_tags<S: AsRef<str>>(
    registry: &BackendRegistry,
    tags: &[S],
    backend: Option<&str>,
) -> CacheResult<u64> {
    let backend = registry.resolve_or_default(backend)?;

    let mut total = 0;
    for tag in tags {
        total += invalidate_tag_on(backend.as_ref(), tag.as_ref()).await?;
    }
    Ok(total)
}

/// [`invalidate_tag`] against a concrete backend.
pub async fn invalidate_tag_on(backend: &dyn CacheBackend, tag: &str) -> CacheResult<u64> {
    match backend.increment_group_version(tag).await {
        Ok(version) => {
            debug!(tag = %tag, version, "Bumped tag version");
            Ok(version)
        }
        Err(CacheError::Unsupported(_)) => backend.invalidate_by_surrogate(tag).await,
        Err(err) => Err(err),
    }
}
