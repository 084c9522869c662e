//! Early-expiry policy that spreads regeneration of a popular entry.
//!
//! When many readers share one entry, they would all see it expire at the
//! same instant and all re-run the query. Instead, readers in the last few
//! seconds before the deadline are sent to the origin with a probability
//! that doubles as the deadline approaches:
//!
//! | seconds remaining | forced-miss probability |
//! |-------------------|-------------------------|
//! | > 4               | 0                       |
//! | 4 or 3            | 1/32                    |
//! | 2                 | 1/16                    |
//! | 1                 | 1/4                     |
//! | <= 0              | 1                       |
//!
//! The check is skipped for ttl 0 (cache forever) and for entries stamped at
//! time 0.

use std::sync::{Mutex, PoisonError};

use qcache_core::CacheEnvelope;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Verdict for one read of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Serve the entry. `remaining` is `None` when the entry never expires.
    Fresh { remaining: Option<i64> },
    /// Serve a miss even though the entry is still valid.
    ForcedMiss { remaining: i64 },
    /// The deadline has passed.
    Expired { remaining: i64 },
}

impl Staleness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Staleness::Fresh { .. })
    }
}

/// Seconds left before `time_created + ttl`, or `None` if the entry has no
/// deadline.
pub fn remaining_life(time_created: i64, ttl: u64, now: i64) -> Option<i64> {
    if ttl == 0 || time_created == 0 {
        return None;
    }
    let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
    Some(time_created.saturating_add(ttl).saturating_sub(now))
}

/// Bit mask applied to a random `u32`; a zero result forces the miss.
fn miss_mask(remaining: i64) -> Option<u32> {
    match remaining {
        3 | 4 => Some(31),
        2 => Some(15),
        1 => Some(3),
        _ => None,
    }
}

/// Probability that a read at `remaining` seconds is turned into a miss.
pub fn forced_miss_probability(remaining: i64) -> f64 {
    if remaining <= 0 {
        return 1.0;
    }
    match miss_mask(remaining) {
        Some(mask) => 1.0 / f64::from(mask + 1),
        None => 0.0,
    }
}

/// The stampede-avoidance check applied by every backend's read path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StampedePolicy;

impl StampedePolicy {
    pub fn evaluate<R: Rng>(
        &self,
        time_created: i64,
        ttl: u64,
        now: i64,
        rng: &mut R,
    ) -> Staleness {
        let Some(remaining) = remaining_life(time_created, ttl, now) else {
            return Staleness::Fresh { remaining: None };
        };

        if remaining <= 0 {
            return Staleness::Expired { remaining };
        }

        match miss_mask(remaining) {
            Some(mask) if rng.random::<u32>() & mask == 0 => Staleness::ForcedMiss { remaining },
            _ => Staleness::Fresh {
                remaining: Some(remaining),
            },
        }
    }
}

/// [`StampedePolicy`] bound to the random source of one backend instance.
#[derive(Debug)]
pub struct StalenessGate {
    policy: StampedePolicy,
    rng: Mutex<StdRng>,
}

impl Default for StalenessGate {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

impl StalenessGate {
    pub fn from_os_rng() -> Self {
        Self {
            policy: StampedePolicy,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic gate for reproducible forced-miss sequences.
    pub fn seeded(seed: u64) -> Self {
        Self {
            policy: StampedePolicy,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Judge a decoded envelope against `now`.
    pub fn judge(&self, envelope: &CacheEnvelope, now: i64) -> Staleness {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.policy
            .evaluate(envelope.time_created, envelope.ttl, now, &mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcache_core::KeyGenerator;

    fn forced_rate(remaining: i64, samples: u32) -> f64 {
        let policy = StampedePolicy;
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let created = 1_000;
        let ttl = 10;
        let now = created + ttl as i64 - remaining;
        let misses = (0..samples)
            .filter(|_| !policy.evaluate(created, ttl, now, &mut rng).is_fresh())
            .count();
        misses as f64 / f64::from(samples)
    }

    #[test]
    fn test_remaining_life() {
        assert_eq!(remaining_life(100, 10, 107), Some(3));
        assert_eq!(remaining_life(100, 10, 115), Some(-5));
        assert_eq!(remaining_life(100, 0, 1_000_000), None);
        assert_eq!(remaining_life(0, 10, 5), None);
    }

    #[test]
    fn test_forced_miss_probability_table() {
        assert_eq!(forced_miss_probability(10), 0.0);
        assert_eq!(forced_miss_probability(5), 0.0);
        assert_eq!(forced_miss_probability(4), 1.0 / 32.0);
        assert_eq!(forced_miss_probability(3), 1.0 / 32.0);
        assert_eq!(forced_miss_probability(2), 1.0 / 16.0);
        assert_eq!(forced_miss_probability(1), 1.0 / 4.0);
        assert_eq!(forced_miss_probability(0), 1.0);
        assert_eq!(forced_miss_probability(-6), 1.0);
    }

    #[test]
    fn test_expired_is_always_a_miss() {
        let mut rng = StdRng::seed_from_u64(1);
        for now in [110, 111, 200] {
            assert!(matches!(
                StampedePolicy.evaluate(100, 10, now, &mut rng),
                Staleness::Expired { .. }
            ));
        }
    }

    #[test]
    fn test_no_deadline_is_always_fresh() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            StampedePolicy.evaluate(100, 0, i64::MAX, &mut rng),
            Staleness::Fresh { remaining: None }
        );
    }

    #[test]
    fn test_outside_window_never_forced() {
        assert_eq!(forced_rate(5, 10_000), 0.0);
        assert_eq!(forced_rate(9, 10_000), 0.0);
    }

    #[test]
    fn test_window_rates_match_table() {
        for (remaining, expected) in [(4, 1.0 / 32.0), (3, 1.0 / 32.0), (2, 1.0 / 16.0), (1, 0.25)] {
            let observed = forced_rate(remaining, 20_000);
            assert!(
                (observed - expected).abs() < expected * 0.25,
                "remaining={} observed={} expected={}",
                remaining,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_gate_judges_envelope_metadata() {
        let key = KeyGenerator::default().generate("SELECT 1", None);
        let envelope = CacheEnvelope::rows("SELECT 1", "[[1]]").stamped(&key, 1_000, 5);
        let gate = StalenessGate::seeded(7);
        assert!(gate.judge(&envelope, 1_000).is_fresh());
        assert!(matches!(
            gate.judge(&envelope, 1_011),
            Staleness::Expired { remaining: -6 }
        ));
    }

    #[test]
    fn test_seeded_gates_agree() {
        let key = KeyGenerator::default().generate("SELECT 1", None);
        let envelope = CacheEnvelope::rows("SELECT 1", "[[1]]").stamped(&key, 1_000, 10);
        let a = StalenessGate::seeded(42);
        let b = StalenessGate::seeded(42);
        for _ in 0..200 {
            assert_eq!(a.judge(&envelope, 1_009), b.judge(&envelope, 1_009));
        }
    }
}
