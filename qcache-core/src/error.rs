//! Error types for qcache operations

use std::path::PathBuf;
use thiserror::Error;

/// Storage layer errors raised by cache backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Could not create directory {path}: {reason}")]
    DirectoryCreate { path: PathBuf, reason: String },

    #[error("Failed acquiring lock for {path}: {reason}")]
    LockFailed { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Caching is not available for backend {backend}")]
    Unavailable { backend: String },

    #[error("Backend {backend} failed to connect: {reason}")]
    NotConnected { backend: String, reason: String },
}

/// Envelope (de)serialization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Unable to encode cache envelope: {reason}")]
    Encode { reason: String },

    #[error("Unable to decode cache envelope: {reason}")]
    Decode { reason: String },
}

/// Cache key errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown cache backend: {name}")]
    UnknownBackend { name: String },

    #[error("No constructor registered for backend {backend}")]
    BackendNotRegistered { backend: String },

    #[error("Configuration parse error: {reason}")]
    Parse { reason: String },
}

/// Master error type for all qcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QcacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for qcache operations.
pub type QcacheResult<T> = Result<T, QcacheError>;

// =============================================================================
// TESTS
// =============================================================================
