//! In-process backend.
//!
//! Stores the same encoded envelope bytes the filesystem store writes, so a
//! lookup goes through the same decode and staleness path. Bounded: when full,
//! the entry with the oldest `time_created` is evicted.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use qcache_core::{CacheEnvelope, CacheKey, Clock, MemoryConfig, QcacheResult, StoreError};

use super::staleness::{Staleness, StalenessGate};
use super::traits::{
    log_outcome, Availability, CacheBackend, CacheLookup, FlushSummary, MissReason,
};

pub const BACKEND_NAME: &str = "memory";

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Vec<u8>,
    time_created: i64,
}

pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<CacheKey, StoredEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    gate: StalenessGate,
    availability: Availability,
    debug: bool,
}

impl std::fmt::Debug for MemoryCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheBackend")
            .field("entries", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl MemoryCacheBackend {
    pub fn new(config: &MemoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: config.max_entries.max(1),
            clock,
            gate: StalenessGate::default(),
            availability: Availability::default(),
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.gate = StalenessGate::seeded(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}

/// Drop the entry created longest ago. Ties go to the smallest key so the
/// choice does not depend on hash order.
fn evict_oldest(entries: &mut HashMap<CacheKey, StoredEntry>) -> Option<CacheKey> {
    let victim = entries
        .iter()
        .min_by(|(ka, a), (kb, b)| {
            a.time_created
                .cmp(&b.time_created)
                .then_with(|| ka.as_str().cmp(kb.as_str()))
        })
        .map(|(key, _)| key.clone())?;
    entries.remove(&victim);
    Some(victim)
}

impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn connect(&self) -> QcacheResult<()> {
        if self.availability.enable() {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                backend: BACKEND_NAME.to_string(),
            }
            .into())
        }
    }

    fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    fn read(&self, key: &CacheKey) -> CacheLookup {
        if !self.is_available() {
            return CacheLookup::Miss(MissReason::Unavailable);
        }

        let bytes = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) => entry.bytes.clone(),
                None => return CacheLookup::Miss(MissReason::NotFound),
            }
        };

        let envelope = match CacheEnvelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(backend = BACKEND_NAME, key = %key, error = %e, "cache read failed");
                return CacheLookup::Miss(MissReason::Corrupt(e.to_string()));
            }
        };

        match self.gate.judge(&envelope, self.clock.now_unix()) {
            Staleness::Fresh { .. } => {
                log_outcome(
                    BACKEND_NAME,
                    self.debug,
                    true,
                    format_args!("cache hit for {}", key),
                    "",
                );
                CacheLookup::Hit(envelope.into_result())
            }
            Staleness::ForcedMiss { remaining } => {
                CacheLookup::Miss(MissReason::Stampede { remaining })
            }
            Staleness::Expired { .. } => CacheLookup::Miss(MissReason::Expired),
        }
    }

    fn write(&self, key: &CacheKey, envelope: &CacheEnvelope, ttl: u64) -> QcacheResult<()> {
        if !self.is_available() {
            return Err(StoreError::Unavailable {
                backend: BACKEND_NAME.to_string(),
            }
            .into());
        }

        let now = self.clock.now_unix();
        let bytes = envelope.stamped(key, now, ttl).encode().inspect_err(|e| {
            tracing::error!(backend = BACKEND_NAME, key = %key, error = %e, "cache write failed");
        })?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            if let Some(evicted) = evict_oldest(&mut entries) {
                if self.debug {
                    tracing::debug!(backend = BACKEND_NAME, key = %evicted, "evicted cache entry");
                }
            }
        }
        entries.insert(
            key.clone(),
            StoredEntry {
                bytes,
                time_created: now,
            },
        );
        log_outcome(
            BACKEND_NAME,
            self.debug,
            true,
            format_args!("stored {} (ttl={}s)", key, ttl),
            "",
        );
        Ok(())
    }

    fn flush_one(&self, key: &CacheKey) {
        if !self.is_available() {
            return;
        }
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed && self.debug {
            tracing::debug!(backend = BACKEND_NAME, key = %key, "flushed cache entry");
        }
    }

    fn flush_all(&self) -> FlushSummary {
        if !self.is_available() {
            return FlushSummary::default();
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.len() as u64;
        entries.clear();
        drop(entries);
        if self.debug {
            tracing::debug!(backend = BACKEND_NAME, entries = removed, "flushed all cache entries");
        }
        FlushSummary {
            files_removed: removed,
            ..FlushSummary::default()
        }
    }

    fn info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        info.insert("backend".to_string(), BACKEND_NAME.to_string());
        info.insert("available".to_string(), self.is_available().to_string());
        info.insert("entries".to_string(), self.len().to_string());
        info.insert("capacity".to_string(), self.max_entries.to_string());
        info
    }
}
