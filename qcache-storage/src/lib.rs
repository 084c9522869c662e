//! qcache Storage - Backend Contract and Implementations
//!
//! The [`CacheBackend`] trait, the sharded filesystem store, the in-process
//! backend, the static backend registry and the [`QueryCache`] front end.

pub mod cache;
pub mod telemetry;

pub use cache::{
    BackendConstructor, BackendRegistry, CacheBackend, CacheLookup, CacheStats,
    FilesystemCacheStore, FlushSummary, MemoryCacheBackend, MissReason, QueryCache,
    StalenessGate, StampedePolicy, Staleness,
};
pub use telemetry::init_tracing;
