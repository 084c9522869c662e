//! Query-level front end over one backend.
//!
//! Turns SQL text and bound parameters into keys, applies the default ttl and
//! downgrades write failures to a logged `false`. Nothing here ever fails the
//! caller's query.

use std::collections::BTreeMap;
use std::sync::Arc;

use qcache_core::{
    CacheDefinitions, CacheEnvelope, CacheKey, CachedResult, Clock, HealthCheck, KeyGenerator,
    QcacheResult, SystemClock,
};

use super::registry::BackendRegistry;
use super::traits::{CacheBackend, CacheLookup, CacheStats, FlushSummary, StatsRecorder};

pub struct QueryCache {
    backend: Box<dyn CacheBackend>,
    keys: KeyGenerator,
    default_ttl: u64,
    stats: StatsRecorder,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("backend", &self.backend.name())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl QueryCache {
    /// Build the configured backend from the builtin registry on the system
    /// clock.
    pub fn from_definitions(definitions: &CacheDefinitions) -> QcacheResult<Self> {
        Self::with_registry(&BackendRegistry::builtin(), definitions, Arc::new(SystemClock))
    }

    pub fn with_registry(
        registry: &BackendRegistry,
        definitions: &CacheDefinitions,
        clock: Arc<dyn Clock>,
    ) -> QcacheResult<Self> {
        let backend = registry.build(definitions, clock)?;
        Ok(Self::new(
            backend,
            KeyGenerator::new(definitions.key_scope.clone()),
            definitions.default_ttl,
        ))
    }

    /// Wrap an already connected backend.
    pub fn new(backend: Box<dyn CacheBackend>, keys: KeyGenerator, default_ttl: u64) -> Self {
        Self {
            backend,
            keys,
            default_ttl,
            stats: StatsRecorder::default(),
        }
    }

    pub fn backend(&self) -> &dyn CacheBackend {
        self.backend.as_ref()
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    pub fn key_for(&self, sql: &str, params: Option<&[serde_json::Value]>) -> CacheKey {
        self.keys.generate(sql, params)
    }

    pub fn get(&self, sql: &str, params: Option<&[serde_json::Value]>) -> CacheLookup {
        self.lookup(&self.key_for(sql, params))
    }

    /// Read by a precomputed key.
    pub fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let lookup = self.backend.read(key);
        self.stats.record_lookup(&lookup);
        lookup
    }

    /// Cache `envelope` for the query. `ttl` of `None` uses the default.
    ///
    /// Returns whether the entry was stored.
    pub fn put(
        &self,
        sql: &str,
        params: Option<&[serde_json::Value]>,
        envelope: &CacheEnvelope,
        ttl: Option<u64>,
    ) -> bool {
        let key = self.key_for(sql, params);
        let ttl = ttl.unwrap_or(self.default_ttl);
        let stored = match self.backend.write(&key, envelope, ttl) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(backend = self.backend.name(), key = %key, error = %e, "query result not cached");
                false
            }
        };
        self.stats.record_write(stored);
        stored
    }

    /// Read-through: serve a fresh entry, otherwise run `execute`, cache what
    /// it returns and hand that back.
    ///
    /// Errors from `execute` are returned untouched and nothing is cached.
    pub fn cache_execute<F, E>(
        &self,
        sql: &str,
        params: Option<&[serde_json::Value]>,
        ttl: Option<u64>,
        execute: F,
    ) -> Result<CachedResult, E>
    where
        F: FnOnce() -> Result<CacheEnvelope, E>,
    {
        if let Some(hit) = self.get(sql, params).into_hit() {
            return Ok(hit);
        }
        let envelope = execute()?;
        self.put(sql, params, &envelope, ttl);
        Ok(envelope.into_result())
    }

    /// Flush the entry for one query, or everything when `sql` is `None`.
    pub fn flush_query(&self, sql: Option<&str>, params: Option<&[serde_json::Value]>) {
        match sql {
            Some(sql) => {
                self.backend.flush_one(&self.key_for(sql, params));
                self.stats.record_flush();
            }
            None => {
                self.flush_all();
            }
        }
    }

    pub fn flush_all(&self) -> FlushSummary {
        let summary = self.backend.flush_all();
        self.stats.record_flush();
        summary
    }

    pub fn info(&self) -> BTreeMap<String, String> {
        self.backend.info()
    }

    pub fn health(&self) -> HealthCheck {
        self.backend.health()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
