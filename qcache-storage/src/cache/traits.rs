//! The backend contract and the types it trades in.
//!
//! Every backend (filesystem, in-process, or an external service adapter)
//! implements [`CacheBackend`]. Failures are recovered inside the backend:
//! reads fold them into [`CacheLookup::Miss`], writes return an error the
//! caller is expected to log and ignore.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use qcache_core::{CacheEnvelope, CacheKey, CachedResult, HealthCheck, QcacheResult};

/// Cache backend trait for pluggable cache implementations.
///
/// All operations are synchronous and run on the calling thread. A backend
/// whose `connect()` failed stays disabled for its lifetime: reads report
/// [`MissReason::Unavailable`], writes fail, flushes do nothing.
pub trait CacheBackend: Send + Sync {
    /// Registry name, also used as the `backend` field of log events.
    fn name(&self) -> &'static str;

    /// Establish readiness. Failure disables the instance permanently.
    fn connect(&self) -> QcacheResult<()>;

    fn is_available(&self) -> bool;

    /// Look up `key`. Never fails; every problem is a miss.
    fn read(&self, key: &CacheKey) -> CacheLookup;

    /// Persist `envelope` under `key`, stamped with the current time and
    /// `ttl` seconds (0 keeps it until flushed).
    fn write(&self, key: &CacheKey, envelope: &CacheEnvelope, ttl: u64) -> QcacheResult<()>;

    /// Remove one entry. Absence is not an error.
    fn flush_one(&self, key: &CacheKey);

    /// Remove every entry. Individual failures are logged and counted.
    fn flush_all(&self) -> FlushSummary;

    /// Diagnostic snapshot; empty if the backend has nothing to report.
    fn info(&self) -> BTreeMap<String, String>;

    fn health(&self) -> HealthCheck {
        if self.is_available() {
            HealthCheck::healthy(self.name())
        } else {
            HealthCheck::unhealthy(self.name(), "caching is disabled for this backend")
        }
    }
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(CachedResult),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        !self.is_hit()
    }

    pub fn hit(&self) -> Option<&CachedResult> {
        match self {
            CacheLookup::Hit(result) => Some(result),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn into_hit(self) -> Option<CachedResult> {
        match self {
            CacheLookup::Hit(result) => Some(result),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn miss_reason(&self) -> Option<&MissReason> {
        match self {
            CacheLookup::Hit(_) => None,
            CacheLookup::Miss(reason) => Some(reason),
        }
    }

    /// Payload of a row-bearing hit.
    pub fn payload(&self) -> Option<&str> {
        self.hit().and_then(CachedResult::payload)
    }
}

/// Why a read produced no value. Every variant is an ordinary miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No entry stored under the key
    NotFound,
    /// Stored bytes did not decode
    Corrupt(String),
    /// Past its ttl
    Expired,
    /// Randomly expired early, `remaining` seconds before its deadline
    Stampede { remaining: i64 },
    /// Backend disabled
    Unavailable,
    /// The entry could not be read
    Io(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NotFound => f.write_str("not found"),
            MissReason::Corrupt(reason) => write!(f, "corrupt entry: {}", reason),
            MissReason::Expired => f.write_str("expired"),
            MissReason::Stampede { remaining } => {
                write!(f, "early expiry with {}s remaining", remaining)
            }
            MissReason::Unavailable => f.write_str("caching unavailable"),
            MissReason::Io(reason) => write!(f, "read failed: {}", reason),
        }
    }
}

/// Counts from a bulk flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub files_removed: u64,
    pub dirs_removed: u64,
    pub failures: u64,
}

impl FlushSummary {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub flushes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    flushes: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_lookup(&self, lookup: &CacheLookup) {
        let counter = if lookup.is_hit() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, success: bool) {
        let counter = if success {
            &self.writes
        } else {
            &self.write_failures
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

/// Connection state of a backend instance.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionState {
    Pending,
    Available,
    Disabled(String),
}

/// Tracks whether a backend may serve requests.
///
/// `Disabled` is terminal: once a backend is disabled it never comes back.
#[derive(Debug)]
pub(crate) struct Availability {
    state: RwLock<ConnectionState>,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Pending),
        }
    }
}

impl Availability {
    pub(crate) fn is_available(&self) -> bool {
        self.state
            .read()
            .map(|state| *state == ConnectionState::Available)
            .unwrap_or(false)
    }

    pub(crate) fn disabled_reason(&self) -> Option<String> {
        match self.state.read() {
            Ok(state) => match &*state {
                ConnectionState::Disabled(reason) => Some(reason.clone()),
                _ => None,
            },
            Err(_) => Some("connection state lock poisoned".to_string()),
        }
    }

    /// Mark available unless already disabled. Returns the resulting state.
    pub(crate) fn enable(&self) -> bool {
        if let Ok(mut state) = self.state.write() {
            if *state == ConnectionState::Pending {
                *state = ConnectionState::Available;
            }
            return *state == ConnectionState::Available;
        }
        false
    }

    pub(crate) fn disable(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            if !matches!(*state, ConnectionState::Disabled(_)) {
                *state = ConnectionState::Disabled(reason.into());
            }
        }
    }
}

/// Log a success/failure pair: success at DEBUG when `debug` is on,
/// failure at ERROR always.
pub(crate) fn log_outcome(
    backend: &'static str,
    debug: bool,
    success: bool,
    success_message: impl fmt::Display,
    fail_message: impl fmt::Display,
) {
    if success {
        if debug {
            tracing::debug!(backend, "{}", success_message);
        }
    } else {
        tracing::error!(backend, "{}", fail_message);
    }
}
