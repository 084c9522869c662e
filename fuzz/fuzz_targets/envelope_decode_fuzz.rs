//! Fuzz target for cache envelope decoding
//!
//! Cache files can be truncated, hand-edited or left over from another
//! format. Decoding arbitrary bytes must return `Ok` or `Err`, never panic.
//!
//! Run with: cargo +nightly fuzz run envelope_decode_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use qcache_core::{CacheEnvelope, Operation};

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = CacheEnvelope::decode(data) {
        // A decoded VALID envelope always carries its payload.
        if envelope.operation == Operation::Valid {
            assert!(envelope.record_set.is_some());
        }

        // Whatever decodes must encode and decode to the same value.
        let bytes = envelope.encode().expect("decoded envelope re-encodes");
        let again = CacheEnvelope::decode(&bytes).expect("re-encoded envelope decodes");
        assert_eq!(again, envelope);

        let _ = envelope.into_result();
    }
});
