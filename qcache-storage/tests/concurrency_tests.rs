//! Concurrent writers, readers and directory creators against one cache root.
//!
//! Each thread uses its own store instance over the same directory, the way
//! separate processes would.

use std::sync::Barrier;
use std::thread;

use qcache_storage::{CacheBackend, CacheLookup};
use qcache_test_utils::fixtures::{key, rows, TempStore};

const PAYLOAD_LEN: usize = 256 * 1024;

#[test]
fn test_writers_never_interleave() {
    let fixture = TempStore::new();
    let k = key("SELECT * FROM contended");
    let payload_a = "a".repeat(PAYLOAD_LEN);
    let payload_b = "b".repeat(PAYLOAD_LEN);

    fixture
        .store
        .write(&k, &rows("SELECT * FROM contended", &payload_a), 0)
        .expect("seed write");

    let writer_a = fixture.reopen();
    let writer_b = fixture.reopen();
    let reader = fixture.reopen();

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..50 {
                writer_a
                    .write(&k, &rows("SELECT * FROM contended", &payload_a), 0)
                    .expect("writer a");
            }
        });
        s.spawn(|| {
            for _ in 0..50 {
                writer_b
                    .write(&k, &rows("SELECT * FROM contended", &payload_b), 0)
                    .expect("writer b");
            }
        });
        s.spawn(|| {
            for _ in 0..200 {
                match reader.read(&k) {
                    CacheLookup::Hit(hit) => {
                        let payload = hit.payload().expect("rows");
                        assert!(
                            payload == payload_a || payload == payload_b,
                            "reader observed a mixed payload of {} bytes",
                            payload.len()
                        );
                    }
                    CacheLookup::Miss(reason) => panic!("unexpected miss: {}", reason),
                }
            }
        });
    });

    let last = fixture.store.read(&k);
    let payload = last.payload().expect("final entry");
    assert!(payload == payload_a || payload == payload_b);
}

#[test]
fn test_concurrent_shard_creation() {
    const THREADS: usize = 8;
    let fixture = TempStore::new();
    let k = key("SELECT * FROM fresh_shard");
    assert!(!fixture.store.layout().shard_dir(&k).exists());

    let stores: Vec<_> = (0..THREADS).map(|_| fixture.reopen()).collect();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for store in &stores {
            let barrier = &barrier;
            let k = &k;
            s.spawn(move || {
                barrier.wait();
                store.layout().ensure_shard(k).expect("shard creation");
                store
                    .write(k, &rows("SELECT * FROM fresh_shard", "[[1]]"), 0)
                    .expect("write");
            });
        }
    });

    assert!(fixture.store.layout().shard_dir(&k).is_dir());
    for store in &stores {
        assert!(store.is_available());
    }
    assert_eq!(fixture.store.read(&k).payload(), Some("[[1]]"));
}

#[test]
fn test_parallel_distinct_keys() {
    let fixture = TempStore::new();
    let stores: Vec<_> = (0..4).map(|_| fixture.reopen()).collect();

    thread::scope(|s| {
        for (worker, store) in stores.iter().enumerate() {
            s.spawn(move || {
                for i in 0..25 {
                    let sql = format!("SELECT {} FROM worker_{}", i, worker);
                    store.write(&key(&sql), &rows(&sql, &sql), 0).expect("write");
                }
            });
        }
    });

    for worker in 0..4 {
        for i in 0..25 {
            let sql = format!("SELECT {} FROM worker_{}", i, worker);
            assert_eq!(fixture.store.read(&key(&sql)).payload(), Some(sql.as_str()));
        }
    }
}
