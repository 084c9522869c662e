//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default permission bits for shard directories.
pub const DEFAULT_DIRECTORY_PERMISSIONS: u32 = 0o771;

/// Default permission bits for cache files.
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// Default block size for reading cache files.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 128_000;

/// Default ttl in seconds when the caller does not give one.
pub const DEFAULT_TTL_SECS: u64 = 2400;

/// Default capacity of the in-process backend.
pub const DEFAULT_MEMORY_MAX_ENTRIES: usize = 10_000;

/// Identifier of a backend in the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Sharded files under a local directory
    #[default]
    Filesystem,
    /// In-process map
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Filesystem => "filesystem",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "filesystem" | "file" => Ok(BackendKind::Filesystem),
            "memory" => Ok(BackendKind::Memory),
            _ => Err(ConfigError::UnknownBackend {
                name: s.to_string(),
            }),
        }
    }
}

/// Settings consumed by the filesystem store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Root of the shard tree. Empty means "not configured".
    pub cache_directory: PathBuf,
    pub directory_permissions: u32,
    pub file_permissions: u32,
    pub read_chunk_size: usize,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            cache_directory: PathBuf::new(),
            directory_permissions: DEFAULT_DIRECTORY_PERMISSIONS,
            file_permissions: DEFAULT_FILE_PERMISSIONS,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl FilesystemConfig {
    pub fn new(cache_directory: impl Into<PathBuf>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            ..Self::default()
        }
    }
}

/// Settings consumed by the in-process backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
        }
    }
}

/// Everything needed to construct a cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheDefinitions {
    pub backend: BackendKind,
    /// Emit DEBUG events for successful operations
    pub debug: bool,
    pub default_ttl: u64,
    pub filesystem: FilesystemConfig,
    pub memory: MemoryConfig,
    pub key_scope: KeyScope,
}

impl Default for CacheDefinitions {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            debug: false,
            default_ttl: DEFAULT_TTL_SECS,
            filesystem: FilesystemConfig::default(),
            memory: MemoryConfig::default(),
            key_scope: KeyScope::default(),
        }
    }
}

impl CacheDefinitions {
    /// Definitions for a filesystem cache rooted at `cache_directory`.
    pub fn filesystem(cache_directory: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Filesystem,
            filesystem: FilesystemConfig::new(cache_directory),
            ..Self::default()
        }
    }

    /// Definitions for the in-process cache.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    /// Parse definitions from a TOML document. Missing fields take defaults.
    pub fn from_toml_str(raw: &str) -> QcacheResult<Self> {
        let definitions: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        definitions.validate()?;
        Ok(definitions)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `QCACHE_BACKEND`: `filesystem` or `memory` (default: filesystem)
    /// - `QCACHE_DEBUG`: `true`/`1` to log successful operations
    /// - `QCACHE_TTL`: default ttl in seconds (default: 2400)
    /// - `QCACHE_DIR`: filesystem cache root
    /// - `QCACHE_DIR_PERMISSIONS`: octal, e.g. `0771`
    /// - `QCACHE_FILE_PERMISSIONS`: octal, e.g. `0644`
    /// - `QCACHE_READ_CHUNK_SIZE`: bytes per read (default: 128000)
    /// - `QCACHE_MEMORY_MAX_ENTRIES`: in-process capacity (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok();

        Self {
            backend: var("QCACHE_BACKEND")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backend),
            debug: var("QCACHE_DEBUG")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.debug),
            default_ttl: var("QCACHE_TTL")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_ttl),
            filesystem: FilesystemConfig {
                cache_directory: var("QCACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.filesystem.cache_directory),
                directory_permissions: var("QCACHE_DIR_PERMISSIONS")
                    .and_then(|s| parse_mode(&s))
                    .unwrap_or(defaults.filesystem.directory_permissions),
                file_permissions: var("QCACHE_FILE_PERMISSIONS")
                    .and_then(|s| parse_mode(&s))
                    .unwrap_or(defaults.filesystem.file_permissions),
                read_chunk_size: var("QCACHE_READ_CHUNK_SIZE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.filesystem.read_chunk_size),
            },
            memory: MemoryConfig {
                max_entries: var("QCACHE_MEMORY_MAX_ENTRIES")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.memory.max_entries),
            },
            key_scope: defaults.key_scope,
        }
    }

    /// Validate the configuration.
    ///
    /// An empty cache directory is not rejected here; the filesystem store
    /// reports it from `connect()` and disables itself.
    pub fn validate(&self) -> QcacheResult<()> {
        if self.filesystem.read_chunk_size == 0 {
            return Err(QcacheError::Config(ConfigError::InvalidValue {
                field: "filesystem.read_chunk_size".to_string(),
                value: "0".to_string(),
                reason: "read_chunk_size must be greater than 0".to_string(),
            }));
        }

        for (field, mode) in [
            (
                "filesystem.directory_permissions",
                self.filesystem.directory_permissions,
            ),
            ("filesystem.file_permissions", self.filesystem.file_permissions),
        ] {
            if mode > 0o7777 {
                return Err(QcacheError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:o}", mode),
                    reason: "permission bits must not exceed 0o7777".to_string(),
                }));
            }
        }

        if self.memory.max_entries == 0 {
            return Err(QcacheError::Config(ConfigError::InvalidValue {
                field: "memory.max_entries".to_string(),
                value: "0".to_string(),
                reason: "max_entries must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}

/// Parse permission bits written in octal (`0771`, `771` or `0o771`).
pub fn parse_mode(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let digits = raw.strip_prefix("0o").unwrap_or(raw);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 8).ok().filter(|mode| *mode <= 0o7777)
}
