//! Sharded, file-per-key cache with advisory locking.
//!
//! Writers open the entry for append, take an exclusive lock, then truncate
//! and rewrite it. Readers take a shared lock. A reader therefore sees either
//! the previous complete envelope or the new one, never a mix.
//!
//! Failure to create the root or a shard directory disables the instance for
//! the rest of its lifetime.

pub mod flush;
pub mod layout;
pub mod lock;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use qcache_core::{
    CacheEnvelope, CacheKey, Clock, FilesystemConfig, HealthCheck, QcacheResult, StoreError,
};

use super::staleness::{Staleness, StalenessGate};
use super::traits::{
    log_outcome, Availability, CacheBackend, CacheLookup, FlushSummary, MissReason,
};
pub use layout::{CacheLayout, LayoutScan};
pub use lock::{FileLock, LockMode};

pub const BACKEND_NAME: &str = "filesystem";

/// File-per-key cache store rooted at one directory.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use qcache_core::{FilesystemConfig, SystemClock};
/// use qcache_storage::cache::FilesystemCacheStore;
///
/// let store = FilesystemCacheStore::open(
///     FilesystemConfig::new("/var/cache/qcache"),
///     Arc::new(SystemClock),
/// );
/// store.write(&key, &CacheEnvelope::rows("SELECT 1", "[[1]]"), 60)?;
/// let lookup = store.read(&key);
/// ```
pub struct FilesystemCacheStore {
    config: FilesystemConfig,
    layout: CacheLayout,
    clock: Arc<dyn Clock>,
    gate: StalenessGate,
    availability: Availability,
    debug: bool,
    set_mode: fn(&Path, u32) -> io::Result<()>,
}

impl std::fmt::Debug for FilesystemCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemCacheStore")
            .field("root", &self.layout.root())
            .field("available", &self.availability.is_available())
            .field("debug", &self.debug)
            .finish()
    }
}

impl FilesystemCacheStore {
    /// Create an unconnected store. Call [`CacheBackend::connect`] before use.
    pub fn new(config: FilesystemConfig, clock: Arc<dyn Clock>) -> Self {
        let layout = CacheLayout::new(&config.cache_directory, config.directory_permissions);
        Self {
            config,
            layout,
            clock,
            gate: StalenessGate::default(),
            availability: Availability::default(),
            debug: false,
            set_mode: layout::set_mode,
        }
    }

    /// Create and connect. A failed connect is logged and leaves the store
    /// disabled.
    pub fn open(config: FilesystemConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Self::new(config, clock);
        let _ = store.connect();
        store
    }

    /// Log successful operations at DEBUG.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Seed the stampede check's random source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.gate = StalenessGate::seeded(seed);
        self
    }

    pub fn config(&self) -> &FilesystemConfig {
        &self.config
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.layout.entry_path(key)
    }

    fn unavailable(&self) -> StoreError {
        StoreError::Unavailable {
            backend: BACKEND_NAME.to_string(),
        }
    }

    fn disable(&self, err: &StoreError) {
        tracing::error!(backend = BACKEND_NAME, error = %err, "disabling filesystem cache");
        self.availability.disable(err.to_string());
    }

    /// Truncate and rewrite `path` under an exclusive lock.
    fn write_locked(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let io_error = |e: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(io_error)?;

        {
            let guard = FileLock::acquire(&file, path, LockMode::Exclusive)?;
            let mut handle = guard.file();
            handle.set_len(0).map_err(io_error)?;
            handle.write_all(bytes).map_err(io_error)?;
            handle.flush().map_err(io_error)?;
        }
        drop(file);

        // The entry is complete; a file owned by another user cannot be chmodded.
        if let Err(e) = (self.set_mode)(path, self.config.file_permissions) {
            tracing::warn!(
                backend = BACKEND_NAME,
                path = %path.display(),
                error = %e,
                "could not set cache file permissions"
            );
        }
        Ok(())
    }

    /// Read all of `path` under a shared lock. `None` if it does not exist.
    fn read_locked(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        let io_error = |e: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };

        let guard = FileLock::acquire(&file, path, LockMode::Shared)?;
        let mut handle = guard.file();
        let mut content = Vec::new();
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        loop {
            match handle.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => content.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error(e)),
            }
        }
        Ok(Some(content))
    }

    fn miss(&self, key: &CacheKey, reason: MissReason) -> CacheLookup {
        match &reason {
            MissReason::Corrupt(_) | MissReason::Io(_) => {
                tracing::error!(backend = BACKEND_NAME, key = %key, reason = %reason, "cache read failed");
            }
            _ => {
                if self.debug {
                    tracing::debug!(backend = BACKEND_NAME, key = %key, reason = %reason, "cache miss");
                }
            }
        }
        CacheLookup::Miss(reason)
    }
}

impl CacheBackend for FilesystemCacheStore {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn connect(&self) -> QcacheResult<()> {
        if self.layout.root().as_os_str().is_empty() {
            let err = StoreError::NotConnected {
                backend: BACKEND_NAME.to_string(),
                reason: "cache directory is not configured".to_string(),
            };
            self.disable(&err);
            return Err(err.into());
        }

        if let Err(err) = self.layout.ensure_root() {
            self.disable(&err);
            return Err(err.into());
        }

        if !self.availability.enable() {
            return Err(self.unavailable().into());
        }
        log_outcome(
            BACKEND_NAME,
            self.debug,
            true,
            format_args!("connected to {}", self.layout.root().display()),
            "",
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    fn read(&self, key: &CacheKey) -> CacheLookup {
        if !self.is_available() {
            return CacheLookup::Miss(MissReason::Unavailable);
        }

        let path = self.layout.entry_path(key);
        let bytes = match self.read_locked(&path) {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => return self.miss(key, MissReason::NotFound),
            Err(e) => return self.miss(key, MissReason::Io(e.to_string())),
        };

        let envelope = match CacheEnvelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => return self.miss(key, MissReason::Corrupt(e.to_string())),
        };
        if envelope.key.as_ref().is_some_and(|stored| stored != key) {
            return self.miss(
                key,
                MissReason::Corrupt("entry was written for another key".to_string()),
            );
        }

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
                self.miss(key, MissReason::Stampede { remaining })
            }
            Staleness::Expired { .. } => self.miss(key, MissReason::Expired),
        }
    }

    fn write(&self, key: &CacheKey, envelope: &CacheEnvelope, ttl: u64) -> QcacheResult<()> {
        if !self.is_available() {
            let err = self.unavailable();
            tracing::error!(backend = BACKEND_NAME, key = %key, error = %err, "cache write skipped");
            return Err(err.into());
        }

        let bytes = envelope
            .stamped(key, self.clock.now_unix(), ttl)
            .encode()
            .inspect_err(|e| {
                tracing::error!(backend = BACKEND_NAME, key = %key, error = %e, "cache write failed");
            })?;

        if let Err(err) = self.layout.ensure_shard(key) {
            self.disable(&err);
            return Err(err.into());
        }

        let path = self.layout.entry_path(key);
        let result = self.write_locked(&path, &bytes);
        log_outcome(
            BACKEND_NAME,
            self.debug,
            result.is_ok(),
            format_args!("wrote {} (ttl={}s)", path.display(), ttl),
            format_args!(
                "failed writing {}: {}",
                path.display(),
                result.as_ref().err().map(ToString::to_string).unwrap_or_default()
            ),
        );
        result.map_err(Into::into)
    }

    fn flush_one(&self, key: &CacheKey) {
        if !self.is_available() {
            return;
        }
        let path = self.layout.entry_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                if self.debug {
                    tracing::debug!(backend = BACKEND_NAME, path = %path.display(), "flushed cache entry");
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(backend = BACKEND_NAME, path = %path.display(), error = %e, "failed flushing cache entry");
            }
        }
    }

    fn flush_all(&self) -> FlushSummary {
        if !self.is_available() {
            return FlushSummary::default();
        }
        let summary = flush::flush_tree(self.layout.root());
        if self.debug {
            tracing::debug!(
                backend = BACKEND_NAME,
                files = summary.files_removed,
                dirs = summary.dirs_removed,
                failures = summary.failures,
                "flushed cache tree"
            );
        }
        summary
    }

    fn info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        info.insert("backend".to_string(), BACKEND_NAME.to_string());
        info.insert(
            "root".to_string(),
            self.layout.root().display().to_string(),
        );
        info.insert("available".to_string(), self.is_available().to_string());
        if let Some(reason) = self.availability.disabled_reason() {
            info.insert("disabled_reason".to_string(), reason);
        }
        if self.is_available() {
            match self.layout.scan() {
                Ok(scan) => {
                    info.insert("shards".to_string(), scan.shards.to_string());
                    info.insert("entries".to_string(), scan.entries.to_string());
                    info.insert("bytes".to_string(), scan.bytes.to_string());
                }
                Err(e) => {
                    info.insert("scan_error".to_string(), e.to_string());
                }
            }
        }
        info
    }

    fn health(&self) -> HealthCheck {
        let root = self.layout.root().display().to_string();
        if self.is_available() {
            HealthCheck::healthy(BACKEND_NAME).with_metadata("root", root)
        } else {
            let reason = self
                .availability
                .disabled_reason()
                .unwrap_or_else(|| "not connected".to_string());
            HealthCheck::unhealthy(BACKEND_NAME, reason).with_metadata("root", root)
        }
    }
}
