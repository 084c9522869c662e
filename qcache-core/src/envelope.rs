//! The per-key record persisted by every backend.
//!
//! One canonical JSON encoding is used everywhere:
//!
//! ```text
//! {
//!   "key": "<hex>",
//!   "operation": "VALID" | "EMPTY_RESULT",
//!   "timeCreated": <unix-seconds>,
//!   "ttl": <seconds>,
//!   "sql": "<original query text>",
//!   "affectedrows": <int>,
//!   "insertid": <string|int>,
//!   "recordSet": "<opaque serialized payload>"
//! }
//! ```
//!
//! `recordSet` is omitted for `EMPTY_RESULT`. The legacy line-oriented format
//! is not read.

use crate::{CacheKey, EnvelopeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of result an envelope caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// A result set with rows; the payload is present.
    #[serde(rename = "VALID")]
    Valid,
    /// The query legitimately returned nothing (or was a write statement).
    #[serde(rename = "EMPTY_RESULT")]
    EmptyResult,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Valid => f.write_str("VALID"),
            Operation::EmptyResult => f.write_str("EMPTY_RESULT"),
        }
    }
}

/// Last insert id as reported by the driver; some drivers return strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InsertId {
    Int(i64),
    Text(String),
}

impl Default for InsertId {
    fn default() -> Self {
        InsertId::Int(0)
    }
}

impl From<i64> for InsertId {
    fn from(value: i64) -> Self {
        InsertId::Int(value)
    }
}

impl From<&str> for InsertId {
    fn from(value: &str) -> Self {
        InsertId::Text(value.to_string())
    }
}

/// Payload plus the metadata needed to judge validity without parsing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CacheKey>,
    pub operation: Operation,
    #[serde(rename = "timeCreated", default)]
    pub time_created: i64,
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub sql: String,
    #[serde(rename = "affectedrows", default)]
    pub affected_rows: i64,
    #[serde(rename = "insertid", default)]
    pub insert_id: InsertId,
    #[serde(rename = "recordSet", default, skip_serializing_if = "Option::is_none")]
    pub record_set: Option<String>,
}

impl CacheEnvelope {
    /// Envelope for a result set with rows.
    pub fn rows(sql: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: None,
            operation: Operation::Valid,
            time_created: 0,
            ttl: 0,
            sql: sql.into(),
            affected_rows: 0,
            insert_id: InsertId::default(),
            record_set: Some(payload.into()),
        }
    }

    /// Envelope for a zero-row result or a write statement.
    pub fn empty_result(
        sql: impl Into<String>,
        affected_rows: i64,
        insert_id: impl Into<InsertId>,
    ) -> Self {
        Self {
            key: None,
            operation: Operation::EmptyResult,
            time_created: 0,
            ttl: 0,
            sql: sql.into(),
            affected_rows,
            insert_id: insert_id.into(),
            record_set: None,
        }
    }

    /// Copy of this envelope as it is persisted by a write at `now`.
    pub fn stamped(&self, key: &CacheKey, now: i64, ttl: u64) -> Self {
        let mut stamped = self.clone();
        stamped.key = Some(key.clone());
        stamped.time_created = now;
        stamped.ttl = ttl;
        if stamped.operation == Operation::EmptyResult {
            stamped.record_set = None;
        }
        stamped
    }

    /// Unix second after which the entry is stale, `None` for ttl 0.
    pub fn expires_at(&self) -> Option<i64> {
        if self.ttl == 0 {
            None
        } else {
            let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
            Some(self.time_created.saturating_add(ttl))
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        self.check_payload()
            .map_err(|reason| EnvelopeError::Encode { reason })?;
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Encode {
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Decode {
            reason: e.to_string(),
        })?;
        envelope
            .check_payload()
            .map_err(|reason| EnvelopeError::Decode { reason })?;
        Ok(envelope)
    }

    fn check_payload(&self) -> Result<(), String> {
        match (self.operation, &self.record_set) {
            (Operation::Valid, None) => Err("VALID envelope without recordSet".to_string()),
            _ => Ok(()),
        }
    }

    /// Turn a decoded envelope into the result handed back to the caller.
    ///
    /// `EMPTY_RESULT` becomes a zero-row result carrying the statement
    /// metadata.
    pub fn into_result(self) -> CachedResult {
        match (self.operation, self.record_set) {
            (Operation::Valid, Some(payload)) => CachedResult::Rows(CachedRows {
                sql: self.sql,
                payload,
                time_created: self.time_created,
            }),
            _ => CachedResult::Empty(EmptyRecordset {
                sql: self.sql,
                affected_rows: self.affected_rows,
                insert_id: self.insert_id,
                time_created: self.time_created,
            }),
        }
    }
}

/// A cached result set with rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRows {
    pub sql: String,
    pub payload: String,
    pub time_created: i64,
}

/// A reconstructed zero-row result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyRecordset {
    pub sql: String,
    pub affected_rows: i64,
    pub insert_id: InsertId,
    pub time_created: i64,
}

/// What a cache hit yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedResult {
    Rows(CachedRows),
    Empty(EmptyRecordset),
}

impl CachedResult {
    /// The opaque payload, `None` for an empty result.
    pub fn payload(&self) -> Option<&str> {
        match self {
            CachedResult::Rows(rows) => Some(&rows.payload),
            CachedResult::Empty(_) => None,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            CachedResult::Rows(rows) => &rows.sql,
            CachedResult::Empty(empty) => &empty.sql,
        }
    }

    pub fn time_created(&self) -> i64 {
        match self {
            CachedResult::Rows(rows) => rows.time_created,
            CachedResult::Empty(empty) => empty.time_created,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CachedResult::Empty(_))
    }
}
