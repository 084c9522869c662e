//! Static mapping from [`BackendKind`] to a constructor.
//!
//! Backends are resolved from a typed identifier at startup; there is no
//! string-driven type lookup at runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use qcache_core::{BackendKind, CacheDefinitions, Clock, ConfigError, QcacheResult};

use super::filesystem::FilesystemCacheStore;
use super::memory::MemoryCacheBackend;
use super::traits::CacheBackend;

/// Builds an unconnected backend from the definitions.
pub type BackendConstructor =
    fn(&CacheDefinitions, Arc<dyn Clock>) -> QcacheResult<Box<dyn CacheBackend>>;

#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<BackendKind, BackendConstructor>,
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the filesystem and in-process backends.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(BackendKind::Filesystem, build_filesystem);
        registry.register(BackendKind::Memory, build_memory);
        registry
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register(&mut self, kind: BackendKind, constructor: BackendConstructor) -> &mut Self {
        self.constructors.insert(kind, constructor);
        self
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.constructors.keys().copied()
    }

    /// Validate the definitions, construct the configured backend and
    /// connect it.
    ///
    /// A failed connect is not an error here: it is logged and the backend
    /// is returned disabled, so the caller keeps working uncached.
    pub fn build(
        &self,
        definitions: &CacheDefinitions,
        clock: Arc<dyn Clock>,
    ) -> QcacheResult<Box<dyn CacheBackend>> {
        definitions.validate()?;
        let constructor = self.constructors.get(&definitions.backend).ok_or_else(|| {
            ConfigError::BackendNotRegistered {
                backend: definitions.backend.to_string(),
            }
        })?;

        let backend = constructor(definitions, clock)?;
        if let Err(e) = backend.connect() {
            tracing::error!(backend = backend.name(), error = %e, "cache backend failed to connect, caching disabled");
        }
        Ok(backend)
    }
}

fn build_filesystem(
    definitions: &CacheDefinitions,
    clock: Arc<dyn Clock>,
) -> QcacheResult<Box<dyn CacheBackend>> {
    Ok(Box::new(
        FilesystemCacheStore::new(definitions.filesystem.clone(), clock)
            .with_debug(definitions.debug),
    ))
}

fn build_memory(
    definitions: &CacheDefinitions,
    clock: Arc<dyn Clock>,
) -> QcacheResult<Box<dyn CacheBackend>> {
    Ok(Box::new(
        MemoryCacheBackend::new(&definitions.memory, clock).with_debug(definitions.debug),
    ))
}
