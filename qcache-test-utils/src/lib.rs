//! qcache Test Utilities
//!
//! Shared test infrastructure for the qcache workspace:
//! - Proptest generators for queries, parameters and envelopes
//! - Fixtures that stand up a store in a temporary directory
//! - Assertions over cache lookups

pub use qcache_core::{
    CacheDefinitions, CacheEnvelope, CacheKey, CachedResult, FilesystemConfig, InsertId,
    KeyGenerator, KeyScope, ManualClock, Operation,
};
pub use qcache_storage::{CacheBackend, CacheLookup, FilesystemCacheStore, MissReason};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for qcache inputs.

    use super::*;
    use proptest::prelude::*;

    /// A SQL-ish statement with mixed case, runs of whitespace and quoted
    /// literals.
    pub fn arb_sql() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_sql_token(), 1..12).prop_map(|tokens| tokens.concat())
    }

    fn arb_sql_token() -> impl Strategy<Value = String> {
        prop_oneof![
            "(SELECT|select|Select|FROM|from|WHERE|where|AND|and|ORDER BY|order by|LIMIT|limit)",
            "[a-z_][a-z0-9_]{0,8}",
            "[ \t\n]{1,3}",
            "'[A-Za-z0-9 ]{0,6}'",
            "[0-9]{1,4}",
            Just(", ".to_string()),
            Just(" = ?".to_string()),
        ]
    }

    /// A bound parameter value.
    pub fn arb_param() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[ -~]{0,12}".prop_map(serde_json::Value::from),
        ]
    }

    pub fn arb_params() -> impl Strategy<Value = Vec<serde_json::Value>> {
        prop::collection::vec(arb_param(), 0..5)
    }

    pub fn arb_key_scope() -> impl Strategy<Value = KeyScope> {
        (
            "(mysqli|postgres|sqlite3|oci8)",
            "[a-z]{0,8}",
            "[a-z]{0,8}",
            0i32..4,
        )
            .prop_map(|(database_type, database, user, fetch_mode)| KeyScope {
                database_type,
                database,
                user,
                fetch_mode,
            })
    }

    /// An opaque serialized result set.
    pub fn arb_payload() -> impl Strategy<Value = String> {
        "[ -~]{0,256}"
    }

    pub fn arb_insert_id() -> impl Strategy<Value = InsertId> {
        prop_oneof![
            any::<i64>().prop_map(InsertId::Int),
            "[a-z0-9]{0,8}".prop_map(InsertId::Text),
        ]
    }

    /// An unstamped envelope of either kind.
    pub fn arb_envelope() -> impl Strategy<Value = CacheEnvelope> {
        prop_oneof![
            (arb_sql(), arb_payload()).prop_map(|(sql, payload)| CacheEnvelope::rows(sql, payload)),
            (arb_sql(), any::<i64>(), arb_insert_id()).prop_map(|(sql, affected, insert_id)| {
                CacheEnvelope::empty_result(sql, affected, insert_id)
            }),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores for common testing scenarios.

    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// A fixed, recognisable start time.
    pub const EPOCH: i64 = 1_700_000_000;

    /// A connected filesystem store in its own temporary directory, driven
    /// by a manual clock. The directory is removed on drop.
    pub struct TempStore {
        pub dir: TempDir,
        pub clock: Arc<ManualClock>,
        pub store: FilesystemCacheStore,
    }

    impl TempStore {
        pub fn new() -> Self {
            Self::with_config(|_| {})
        }

        pub fn seeded(seed: u64) -> Self {
            let mut fixture = Self::new();
            fixture.store = fixture.reopen().with_seed(seed);
            fixture
        }

        /// Adjust the default config before the store is opened.
        pub fn with_config(adjust: impl FnOnce(&mut FilesystemConfig)) -> Self {
            let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {}", e));
            let clock = Arc::new(ManualClock::new(EPOCH));
            let mut config = FilesystemConfig::new(dir.path());
            adjust(&mut config);
            let store = FilesystemCacheStore::open(config, clock.clone());
            assert!(store.is_available(), "fixture store failed to connect");
            Self { dir, clock, store }
        }

        /// A second store instance over the same directory and clock, as
        /// another process would see it.
        pub fn reopen(&self) -> FilesystemCacheStore {
            FilesystemCacheStore::open(self.store.config().clone(), self.clock.clone())
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }
    }

    impl Default for TempStore {
        fn default() -> Self {
            Self::new()
        }
    }

    pub fn key(sql: &str) -> CacheKey {
        KeyGenerator::default().generate(sql, None)
    }

    pub fn rows(sql: &str, payload: &str) -> CacheEnvelope {
        CacheEnvelope::rows(sql, payload)
    }

    /// Count regular files anywhere under `root`.
    pub fn count_files(root: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(root) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| match entry.file_type() {
                Ok(t) if t.is_dir() => count_files(&entry.path()),
                Ok(_) => 1,
                Err(_) => 0,
            })
            .sum()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache lookups.

    use super::*;

    pub fn assert_hit_with_payload(lookup: &CacheLookup, payload: &str) {
        assert_eq!(
            lookup.payload(),
            Some(payload),
            "expected hit with payload {:?}, got {:?}",
            payload,
            lookup
        );
    }

    pub fn assert_miss(lookup: &CacheLookup) {
        assert!(lookup.is_miss(), "expected miss, got {:?}", lookup);
    }

    pub fn assert_miss_reason(lookup: &CacheLookup, expected: &MissReason) {
        assert_eq!(
            lookup.miss_reason(),
            Some(expected),
            "unexpected lookup {:?}",
            lookup
        );
    }
}
