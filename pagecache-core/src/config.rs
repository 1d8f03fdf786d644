//! Declarative backend configuration.
//!
//! # Examples
//!
//! ```
//! use pagecache_core::config::PageCacheConfig;
//!
//! let config = PageCacheConfig::from_toml_str(r#"
//!     default_backend = "primary"
//!
//!     [backends.primary]
//!     backend = "store"
//!     options = { store = "default", surrogate_index = "auto" }
//!
//!     [backends.edge]
//!     backend = "header"
//!
//!     [backends.both]
//!     backend = "composite"
//!     options = { backends = ["primary", "edge"] }
//! "#).unwrap();
//!
//! assert_eq!(config.default_backend.as_deref(), Some("primary"));
//! assert_eq!(config.backends.len(), 3);
//! ```

use crate::error::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable overriding the default backend name.
pub const DEFAULT_BACKEND_ENV: &str = "PAGECACHE_DEFAULT_BACKEND";

/// Alias of the single-store backend, used when `backend` is omitted.
pub const DEFAULT_BACKEND_TYPE: &str = "store";

/// Named backends plus an optional default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageCacheConfig {
    /// Backend used when a page names none
    #[serde(default)]
    pub default_backend: Option<String>,

    /// Backend definitions by name
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

/// One named backend definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Builtin alias or registered factory name
    #[serde(default = "default_backend_type")]
    pub backend: String,

    /// Type-specific construction options
    #[serde(default)]
    pub options: Map<String, Value>,
}

fn default_backend_type() -> String {
    DEFAULT_BACKEND_TYPE.to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_type(),
            options: Map::new(),
        }
    }
}

impl BackendConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            options: Map::new(),
        }
    }

    /// Add an option.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Decode the options into a typed struct.
    pub fn decode_options<T: DeserializeOwned>(&self) -> CacheResult<T> {
        serde_json::from_value(Value::Object(self.options.clone())).map_err(|e| {
            CacheError::Config(format!("invalid options for '{}' backend: {}", self.backend, e))
        })
    }
}

impl PageCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named backend.
    pub fn backend(mut self, name: impl Into<String>, config: BackendConfig) -> Self {
        self.backends.insert(name.into(), config);
        self
    }

    /// Set the default backend name.
    pub fn default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = Some(name.into());
        self
    }

    pub fn from_toml_str(content: &str) -> CacheResult<Self> {
        toml::from_str(content)
            .map_err(|e| CacheError::Config(format!("TOML parse error: {}", e)))
    }

    pub fn from_json_str(content: &str) -> CacheResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| CacheError::Config(format!("JSON parse error: {}", e)))
    }

    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CacheError::Config("No file extension found".to_string()))?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        match ext.to_lowercase().as_str() {
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(CacheError::Config(format!("Unsupported format: {}", other))),
        }
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(name) = lookup(DEFAULT_BACKEND_ENV).filter(|n| !n.is_empty()) {
            self.default_backend = Some(name);
        }
        self
    }
}
