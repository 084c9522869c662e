//! Content-addressed cache keys.
//!
//! A [`CacheKey`] is the lowercase hex SHA-256 of the normalized query text,
//! its bound parameters and the connection [`KeyScope`]. The same logical
//! query always yields the same key, across processes and across backends,
//! so every backend can address the same entry by it.

use crate::KeyError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a cache key in hex characters.
pub const KEY_HEX_LEN: usize = 64;

/// Number of leading hex characters that select the shard directory.
pub const SHARD_PREFIX_LEN: usize = 2;

/// A validated, fixed-length cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse a key produced elsewhere (e.g. another process or a log line).
    ///
    /// Accepts exactly [`KEY_HEX_LEN`] hex digits; uppercase is folded.
    pub fn parse(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        if raw.len() != KEY_HEX_LEN {
            return Err(KeyError::InvalidKey {
                reason: format!("expected {} hex characters, got {}", KEY_HEX_LEN, raw.len()),
                key: raw,
            });
        }
        if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(KeyError::InvalidKey {
                key: raw,
                reason: "key must be hexadecimal".to_string(),
            });
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// The key as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The shard bucket: the first two hex characters of the key.
    pub fn shard(&self) -> &str {
        &self.0[..SHARD_PREFIX_LEN]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CacheKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Connection context mixed into every key.
///
/// Two connections to different databases (or with a different fetch mode)
/// must never share an entry for the same SQL text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyScope {
    pub database_type: String,
    pub database: String,
    pub user: String,
    pub fetch_mode: i32,
}

/// Deterministic key generator. Pure: holds only the scope it hashes in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyGenerator {
    scope: KeyScope,
}

impl KeyGenerator {
    pub fn new(scope: KeyScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &KeyScope {
        &self.scope
    }

    /// Compute the key for a query and its bound parameters.
    ///
    /// `None` and an empty parameter list hash identically.
    pub fn generate(&self, sql: &str, params: Option<&[serde_json::Value]>) -> CacheKey {
        let normalized = normalize_sql(sql);
        let params = match params {
            Some(values) if !values.is_empty() => {
                // serde_json maps are ordered, so this rendering is canonical
                serde_json::Value::Array(values.to_vec()).to_string()
            }
            _ => String::new(),
        };

        let mut hasher = Sha256::new();
        for field in [
            normalized.as_str(),
            params.as_str(),
            self.scope.database_type.as_str(),
            self.scope.database.as_str(),
            self.scope.user.as_str(),
        ] {
            update_field(&mut hasher, field.as_bytes());
        }
        hasher.update(self.scope.fetch_mode.to_le_bytes());

        CacheKey(hex::encode(hasher.finalize()))
    }
}

/// Length-prefix each field so adjacent fields cannot alias.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Normalize query text for hashing.
///
/// Outside quoted sections and comments, whitespace runs collapse to one space
/// and letters are lowercased. Quoted literals and identifiers (`'`, `"`,
/// `` ` ``) are kept byte-for-byte and close at the next matching quote, so a
/// doubled quote reads as close-then-reopen. `--` and `/* */` comments are
/// kept verbatim, and a line comment keeps the newline that ends it.
pub fn normalize_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.trim().chars().peekable();
    let mut pending_space = false;

    while let Some(ch) = chars.next() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }

        match ch {
            '\'' | '"' | '`' => {
                out.push(ch);
                for c in chars.by_ref() {
                    out.push(c);
                    if c == ch {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(ch);
                while let Some(c) = chars.next() {
                    out.push(c);
                    if c == '\n' {
                        // The newline already separates what follows.
                        while chars.next_if(|c| c.is_whitespace()).is_some() {}
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push(ch);
                out.extend(chars.next());
                let mut prev = None;
                for c in chars.by_ref() {
                    out.push(c);
                    if prev == Some('*') && c == '/' {
                        break;
                    }
                    prev = Some(c);
                }
            }
            _ => out.extend(ch.to_lowercase()),
        }
    }

    out
}
