//! Cache backends behind one synchronous contract.
//!
//! Caching is a best-effort accelerator. Every failure inside a backend is
//! recovered locally and logged: reads degrade to [`CacheLookup::Miss`],
//! writes report failure, and a backend that cannot reach its storage
//! disables itself instead of surfacing errors to the query path.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::from_definitions(&CacheDefinitions::filesystem("/var/cache/qcache"))?;
//!
//! let result = cache.cache_execute("SELECT * FROM users WHERE id = ?", Some(&[json!(7)]), None, || {
//!     run_query().map(|rows| CacheEnvelope::rows("SELECT * FROM users WHERE id = ?", rows))
//! })?;
//! ```

pub mod filesystem;
pub mod memory;
pub mod query_cache;
pub mod registry;
pub mod staleness;
pub mod traits;

pub use filesystem::{CacheLayout, FileLock, FilesystemCacheStore, LayoutScan, LockMode};
pub use memory::MemoryCacheBackend;
pub use query_cache::QueryCache;
pub use registry::{BackendConstructor, BackendRegistry};
pub use staleness::{
    forced_miss_probability, remaining_life, StalenessGate, StampedePolicy, Staleness,
};
pub use traits::{CacheBackend, CacheLookup, CacheStats, FlushSummary, MissReason};
