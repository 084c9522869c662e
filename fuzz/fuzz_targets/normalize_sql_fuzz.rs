//! Fuzz target for query normalization and key generation
//!
//! Any UTF-8 query text must normalize without panicking, normalization must
//! be idempotent, and the key must be the same for the raw and normalized
//! text.
//!
//! Run with: cargo +nightly fuzz run normalize_sql_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use qcache_core::{normalize_sql, CacheKey, KeyGenerator, KEY_HEX_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        let once = normalize_sql(sql);
        assert_eq!(normalize_sql(&once), once, "normalization is idempotent");

        let generator = KeyGenerator::default();
        let key = generator.generate(sql, None);
        assert_eq!(key.as_str().len(), KEY_HEX_LEN);
        assert_eq!(generator.generate(&once, None), key);
        assert_eq!(CacheKey::parse(key.as_str()).ok(), Some(key));
    }
});
