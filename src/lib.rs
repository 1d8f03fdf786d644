//! HTTP response caching with surrogate-key and versioned-tag invalidation.
//!
//! This crate re-exports [`pagecache_core`]. Enable the `redis` feature for
//! the Redis store.

pub use pagecache_core::*;

#[cfg(feature = "redis")]
pub use pagecache_redis as redis;
