//! qcache Core - Data Types
//!
//! Pure data structures and pure functions shared by every backend:
//! the cache envelope, content-addressed keys, configuration, errors and the
//! time source. All other crates depend on this. No storage I/O lives here.

pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    parse_mode, BackendKind, CacheDefinitions, FilesystemConfig, MemoryConfig,
    DEFAULT_DIRECTORY_PERMISSIONS, DEFAULT_FILE_PERMISSIONS, DEFAULT_MEMORY_MAX_ENTRIES,
    DEFAULT_READ_CHUNK_SIZE, DEFAULT_TTL_SECS,
};
pub use envelope::{
    CacheEnvelope, CachedResult, CachedRows, EmptyRecordset, InsertId, Operation,
};
pub use error::{ConfigError, EnvelopeError, KeyError, QcacheError, QcacheResult, StoreError};
pub use health::{HealthCheck, HealthStatus};
pub use key::{normalize_sql, CacheKey, KeyGenerator, KeyScope, KEY_HEX_LEN, SHARD_PREFIX_LEN};
