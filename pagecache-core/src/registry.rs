//! Named backend construction.
//!
//! A [`BackendRegistry`] is assembled once at startup from a
//! [`PageCacheConfig`], the stores the application owns and any custom
//! backend factories. Backends are constructed on first use and cached for
//! the registry's lifetime.

use crate::backend::{
    CacheBackend, CompositeBackend, DEFAULT_VERSION_PREFIX, HeaderBackend, MAX_HEADER_SIZE,
    MAX_KEY_SIZE, NullBackend, StoreBackend, SurrogateHeader,
};
use crate::config::{BackendConfig, PageCacheConfig};
use crate::error::{CacheError, CacheResult};
use crate::index::{
    DEFAULT_INDEX_PREFIX, DEFAULT_INDEX_TIMEOUT, NullIndex, SetIndex, StoreIndex, SurrogateIndex,
};
use crate::store::{CacheStore, SetStore};
use parking_lot::RwLock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Store name used when none is given.
pub const DEFAULT_STORE: &str = "default";

/// Builtin backend types.
const STORE_ALIASES: [&str; 2] = ["store", "default"];
const COMPOSITE: &str = "composite";
const HEADER: &str = "header";
const NULL: &str = "null";

/// Constructor for a custom backend type.
pub type BackendFactory =
    Arc<dyn Fn(&BackendSpec<'_>) -> CacheResult<Arc<dyn CacheBackend>> + Send + Sync>;

/// What a [`BackendFactory`] gets to build from.
pub struct BackendSpec<'a> {
    /// Configured backend name
    pub name: &'a str,
    /// The backend's configuration
    pub config: &'a BackendConfig,
    stores: &'a HashMap<String, RegisteredStore>,
}

impl BackendSpec<'_> {
    /// Decode the options into a typed struct.
    pub fn options<T: DeserializeOwned>(&self) -> CacheResult<T> {
        self.config.decode_options()
    }

    /// Look up a registered store.
    pub fn store(&self, name: &str) -> CacheResult<Arc<dyn CacheStore>> {
        lookup_store(self.stores, name).map(|s| s.store.clone())
    }
}

#[derive(Clone)]
struct RegisteredStore {
    store: Arc<dyn CacheStore>,
    sets: Option<Arc<dyn SetStore>>,
}

fn lookup_store<'a>(
    stores: &'a HashMap<String, RegisteredStore>,
    name: &str,
) -> CacheResult<&'a RegisteredStore> {
    stores
        .get(name)
        .ok_or_else(|| CacheError::Config(format!("no store registered as '{}'", name)))
}

/// Which surrogate index a store backend uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Native sets when the store was registered with them, else `Store`
    #[default]
    Auto,
    /// JSON list kept in the store
    Store,
    /// Native sets; the store must support them
    Set,
    /// No index
    Null,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StoreOptions {
    #[serde(alias = "cache_name")]
    store: String,
    surrogate_index: IndexKind,
    surrogate_index_timeout: u64,
    surrogate_prefix: String,
    version_prefix: String,
    version_timeout: u64,
    surrogate_header: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            store: DEFAULT_STORE.to_string(),
            surrogate_index: IndexKind::Auto,
            surrogate_index_timeout: DEFAULT_INDEX_TIMEOUT.as_secs(),
            surrogate_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            version_prefix: DEFAULT_VERSION_PREFIX.to_string(),
            version_timeout: crate::backend::DEFAULT_VERSION_TIMEOUT.as_secs(),
            surrogate_header: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompositeOptions {
    backends: Vec<String>,
    #[serde(default)]
    read_from: i64,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HeaderOptions {
    max_header_size: usize,
    max_key_size: usize,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            max_header_size: MAX_HEADER_SIZE,
            max_key_size: MAX_KEY_SIZE,
        }
    }
}

fn is_builtin(kind: &str) -> bool {
    STORE_ALIASES.contains(&kind) || matches!(kind, COMPOSITE | HEADER | NULL)
}

/// Builder for [`BackendRegistry`].
#[derive(Default)]
pub struct BackendRegistryBuilder {
    config: PageCacheConfig,
    stores: HashMap<String, RegisteredStore>,
    factories: HashMap<String, BackendFactory>,
    instances: HashMap<String, Arc<dyn CacheBackend>>,
}

impl BackendRegistryBuilder {
    pub fn config(mut self, config: PageCacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a plain key-value store.
    pub fn store(mut self, name: impl Into<String>, store: Arc<dyn CacheStore>) -> Self {
        self.stores
            .insert(name.into(), RegisteredStore { store, sets: None });
        self
    }

    /// Register a store with native sets, enabling the set index.
    pub fn set_store<S: SetStore + 'static>(
        mut self,
        name: impl Into<String>,
        store: Arc<S>,
    ) -> Self {
        self.stores.insert(
            name.into(),
            RegisteredStore {
                store: store.clone(),
                sets: Some(store),
            },
        );
        self
    }

    /// Register a constructor for a custom backend type.
    pub fn factory<F>(mut self, type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&BackendSpec<'_>) -> CacheResult<Arc<dyn CacheBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
        self
    }

    /// Register an already constructed backend under a name.
    pub fn instance(mut self, name: impl Into<String>, backend: Arc<dyn CacheBackend>) -> Self {
        self.instances.insert(name.into(), backend);
        self
    }

    /// Validate the configuration and build the registry.
    ///
    /// Fails on unknown backend types, unknown composite references, an
    /// unknown default backend or invalid builtin options.
    pub fn build(self) -> CacheResult<BackendRegistry> {
        let known = |name: &str| {
            self.config.backends.contains_key(name) || self.instances.contains_key(name)
        };

        for (name, config) in &self.config.backends {
            let kind = config.backend.as_str();
            if is_builtin(kind) {
                if self.factories.contains_key(kind) {
                    return Err(CacheError::Config(format!(
                        "factory '{}' shadows a builtin backend type",
                        kind
                    )));
                }
            } else if !self.factories.contains_key(kind) {
                return Err(CacheError::Config(format!(
                    "backend '{}' has unknown type '{}'",
                    name, kind
                )));
            }

            if STORE_ALIASES.contains(&kind) {
                let options: StoreOptions = config.decode_options()?;
                let registered = lookup_store(&self.stores, &options.store)?;
                if options.surrogate_index == IndexKind::Set && registered.sets.is_none() {
                    return Err(CacheError::Config(format!(
                        "store '{}' does not support the set index",
                        options.store
                    )));
                }
            } else if kind == COMPOSITE {
                let options: CompositeOptions = config.decode_options()?;
                if let Some(missing) = options.backends.iter().find(|b| !known(b.as_str())) {
                    return Err(CacheError::UnknownBackend(missing.clone()));
                }
            } else if kind == HEADER {
                config.decode_options::<HeaderOptions>()?;
            }
        }

        if let Some(default) = &self.config.default_backend
            && !known(default.as_str())
        {
            return Err(CacheError::UnknownBackend(default.clone()));
        }

        Ok(BackendRegistry {
            config: self.config,
            stores: self.stores,
            factories: self.factories,
            instances: self.instances,
            cache: RwLock::new(HashMap::new()),
        })
    }
}

/// Name to backend resolution with a per-registry instance cache.
pub struct BackendRegistry {
    config: PageCacheConfig,
    stores: HashMap<String, RegisteredStore>,
    factories: HashMap<String, BackendFactory>,
    instances: HashMap<String, Arc<dyn CacheBackend>>,
    cache: RwLock<HashMap<String, Arc<dyn CacheBackend>>>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// The configuration the registry was built from.
    pub fn config(&self) -> &PageCacheConfig {
        &self.config
    }

    /// Resolve a backend by name, constructing it on first use.
    pub fn resolve(&self, name: &str) -> CacheResult<Arc<dyn CacheBackend>> {
        let mut stack = Vec::new();
        self.resolve_inner(name, &mut stack)
    }

    /// Resolve the configured default backend.
    ///
    /// Without a configured default, a store backend over `store_name` is
    /// built directly. That instance is not cached.
    pub fn resolve_default(&self, store_name: &str) -> CacheResult<Arc<dyn CacheBackend>> {
        if let Some(name) = &self.config.default_backend {
            return self.resolve(name);
        }

        let options = StoreOptions {
            store: store_name.to_string(),
            ..StoreOptions::default()
        };
        Ok(Arc::new(self.build_store_backend(options)?))
    }

    /// Resolve `name` if given, else the default backend over the default store.
    pub fn resolve_or_default(&self, name: Option<&str>) -> CacheResult<Arc<dyn CacheBackend>> {
        match name {
            Some(name) => self.resolve(name),
            None => self.resolve_default(DEFAULT_STORE),
        }
    }

    /// Drop every constructed backend. Registered instances and stored data
    /// are kept.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    fn resolve_inner(
        &self,
        name: &str,
        stack: &mut Vec<String>,
    ) -> CacheResult<Arc<dyn CacheBackend>> {
        if let Some(backend) = self.instances.get(name) {
            return Ok(backend.clone());
        }
        if let Some(backend) = self.cache.read().get(name) {
            return Ok(backend.clone());
        }

        if stack.iter().any(|entry| entry == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(CacheError::Config(format!(
                "backend reference cycle: {}",
                cycle.join(" -> ")
            )));
        }

        let config = self
            .config
            .backends
            .get(name)
            .ok_or_else(|| CacheError::UnknownBackend(name.to_string()))?;

        stack.push(name.to_string());
        let built = self.construct(name, config, stack);
        stack.pop();
        let built = built?;

        info!(backend = %name, kind = %config.backend, "Constructed cache backend");

        // Another caller may have raced us here; keep the first instance.
        let mut cache = self.cache.write();
        Ok(cache.entry(name.to_string()).or_insert(built).clone())
    }

    fn construct(
        &self,
        name: &str,
        config: &BackendConfig,
        stack: &mut Vec<String>,
    ) -> CacheResult<Arc<dyn CacheBackend>> {
        let kind = config.backend.as_str();

        if STORE_ALIASES.contains(&kind) {
            return Ok(Arc::new(self.build_store_backend(config.decode_options()?)?));
        }

        match kind {
            COMPOSITE => {
                let options: CompositeOptions = config.decode_options()?;
                let children = options
                    .backends
                    .iter()
                    .map(|child| self.resolve_inner(child, stack))
                    .collect::<CacheResult<Vec<_>>>()?;
                Ok(Arc::new(CompositeBackend::new(children, options.read_from)))
            }
            HEADER => {
                let options: HeaderOptions = config.decode_options()?;
                Ok(Arc::new(HeaderBackend::with_limits(
                    options.max_header_size,
                    options.max_key_size,
                )))
            }
            NULL => Ok(Arc::new(NullBackend)),
            custom => {
                let factory = self.factories.get(custom).ok_or_else(|| {
                    CacheError::Config(format!("backend '{}' has unknown type '{}'", name, custom))
                })?;
                factory(&BackendSpec {
                    name,
                    config,
                    stores: &self.stores,
                })
            }
        }
    }

    fn build_store_backend(&self, options: StoreOptions) -> CacheResult<StoreBackend> {
        let registered = lookup_store(&self.stores, &options.store)?;
        let timeout = Duration::from_secs(options.surrogate_index_timeout);
        let prefix = options.surrogate_prefix;

        let index: Arc<dyn SurrogateIndex> = match (options.surrogate_index, &registered.sets) {
            (IndexKind::Auto | IndexKind::Set, Some(sets)) => Arc::new(
                SetIndex::new(sets.clone())
                    .with_timeout(timeout)
                    .with_prefix(prefix),
            ),
            (IndexKind::Set, None) => {
                return Err(CacheError::Config(format!(
                    "store '{}' does not support the set index",
                    options.store
                )));
            }
            (IndexKind::Auto | IndexKind::Store, _) => Arc::new(
                StoreIndex::new(registered.store.clone())
                    .with_timeout(timeout)
                    .with_prefix(prefix),
            ),
            (IndexKind::Null, _) => Arc::new(NullIndex),
        };

        let mut backend = StoreBackend::with_index(registered.store.clone(), index)
            .version_prefix(options.version_prefix)
            .version_timeout(Duration::from_secs(options.version_timeout));
        if options.surrogate_header {
            backend = backend.surrogate_header(SurrogateHeader::default());
        }
        Ok(backend)
    }
}
