//! # pagecache Redis store
//!
//! A [`RedisStore`] implementing both store traits of `pagecache-core`, so
//! backends built over it use the native-set surrogate index and atomic
//! version counters.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pagecache_core::prelude::*;
//! use pagecache_redis::{RedisConfig, RedisStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::from_env().key_prefix("pages").build();
//!     let store = Arc::new(RedisStore::new(config).await?);
//!
//!     let registry = BackendRegistry::builder()
//!         .set_store("default", store)
//!         .build()?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod store;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{RedisPool, build_pool};
pub use store::RedisStore;

// Re-export redis crate for convenience
pub use redis;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::store::RedisStore;
}
