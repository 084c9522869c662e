//! Property-Based Tests for Stampede Avoidance
//!
//! For an entry written with ttl 10 and read at a simulated `now`, the
//! forced-miss rate follows the early-expiry ramp, and outside the ramp reads
//! are deterministic.

use proptest::prelude::*;
use qcache_storage::cache::forced_miss_probability;
use qcache_storage::{CacheBackend, MissReason};
use qcache_test_utils::fixtures::{key, rows, TempStore, EPOCH};
use qcache_test_utils::generators::arb_envelope;

const SAMPLES: u32 = 10_000;
const TTL: u64 = 10;

/// Fraction of `SAMPLES` reads at `remaining` seconds before expiry that
/// were turned into misses.
fn observed_miss_rate(fixture: &TempStore, remaining: i64) -> f64 {
    let k = key("SELECT * FROM hot_table");
    fixture.clock.set(EPOCH);
    fixture
        .store
        .write(&k, &rows("SELECT * FROM hot_table", "[[1]]"), TTL)
        .expect("write");

    fixture.clock.set(EPOCH + TTL as i64 - remaining);
    let misses = (0..SAMPLES)
        .filter(|_| fixture.store.read(&k).is_miss())
        .count();
    misses as f64 / f64::from(SAMPLES)
}

#[test]
fn test_miss_rate_inside_window() {
    let fixture = TempStore::seeded(0xC0FFEE);
    for remaining in [4, 3, 2, 1] {
        let expected = forced_miss_probability(remaining);
        let observed = observed_miss_rate(&fixture, remaining);
        let sigma = (expected * (1.0 - expected) / f64::from(SAMPLES)).sqrt();
        assert!(
            (observed - expected).abs() < 5.0 * sigma,
            "remaining={} observed={} expected={}",
            remaining,
            observed,
            expected
        );
    }
}

#[test]
fn test_miss_rate_at_and_past_deadline() {
    let fixture = TempStore::seeded(1);
    for remaining in [0, -1, -6] {
        assert_eq!(observed_miss_rate(&fixture, remaining), 1.0);
    }
}

#[test]
fn test_miss_rate_before_window() {
    let fixture = TempStore::seeded(2);
    for remaining in [5, 7, 10] {
        assert_eq!(observed_miss_rate(&fixture, remaining), 0.0);
    }
}

#[test]
fn test_forced_miss_is_reported_as_stampede() {
    let fixture = TempStore::seeded(3);
    let k = key("SELECT 1");
    fixture.store.write(&k, &rows("SELECT 1", "x"), TTL).expect("write");
    fixture.clock.set(EPOCH + TTL as i64 - 1);

    let reasons: Vec<_> = (0..200)
        .filter_map(|_| fixture.store.read(&k).miss_reason().cloned())
        .collect();
    assert!(!reasons.is_empty());
    assert!(reasons
        .iter()
        .all(|reason| *reason == MissReason::Stampede { remaining: 1 }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_fresh_entry_round_trips(envelope in arb_envelope(), ttl in prop_oneof![Just(0u64), 5u64..100_000]) {
        let fixture = TempStore::new();
        let k = key(&envelope.sql);
        fixture.store.write(&k, &envelope, ttl).expect("write");

        let hit = fixture.store.read(&k).into_hit();
        prop_assert!(hit.is_some());
        let hit = hit.expect("hit");
        prop_assert_eq!(hit.sql(), envelope.sql.as_str());
        prop_assert_eq!(hit.payload(), envelope.record_set.as_deref());
        prop_assert_eq!(hit.time_created(), EPOCH);
    }
}
