//! End-to-end tests of the query front end over each builtin backend.

use std::sync::Arc;

use qcache_core::{BackendKind, CacheDefinitions, CacheEnvelope, ManualClock};
use qcache_storage::{BackendRegistry, CacheBackend, MissReason, QueryCache};
use serde_json::json;
use tempfile::TempDir;

fn build(definitions: &CacheDefinitions, clock: Arc<ManualClock>) -> QueryCache {
    QueryCache::with_registry(&BackendRegistry::builtin(), definitions, clock).expect("build")
}

fn definitions_for(kind: BackendKind, dir: &TempDir) -> CacheDefinitions {
    match kind {
        BackendKind::Filesystem => CacheDefinitions::filesystem(dir.path().join("cache")),
        BackendKind::Memory => CacheDefinitions::memory(),
    }
}

#[test]
fn test_same_behaviour_on_every_backend() {
    for kind in BackendRegistry::builtin().kinds() {
        let dir = TempDir::new().expect("tempdir");
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let mut definitions = definitions_for(kind, &dir);
        definitions.default_ttl = 5;
        let cache = build(&definitions, clock.clone());
        assert_eq!(cache.backend().name(), kind.as_str());
        assert!(cache.health().is_healthy());

        let sql = "SELECT name FROM users WHERE id = ?";
        let params = [json!(7)];
        let first = cache
            .cache_execute(sql, Some(&params[..]), None, || {
                Ok::<_, String>(CacheEnvelope::rows(sql, "[[\"alice\"]]"))
            })
            .expect("first");
        assert_eq!(first.payload(), Some("[[\"alice\"]]"));

        let hit = cache.get(sql, Some(&params[..]));
        assert_eq!(hit.payload(), Some("[[\"alice\"]]"), "backend {}", kind);

        clock.advance(11);
        assert_eq!(
            cache.get(sql, Some(&params[..])).miss_reason(),
            Some(&MissReason::Expired),
            "backend {}",
            kind
        );

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.writes, 1);

        cache.flush_query(None, None);
        assert_eq!(
            cache.get(sql, Some(&params[..])).miss_reason(),
            Some(&MissReason::NotFound)
        );
    }
}

#[test]
fn test_empty_result_is_cached_as_sentinel() {
    let dir = TempDir::new().expect("tempdir");
    let cache = build(
        &CacheDefinitions::filesystem(dir.path()),
        Arc::new(ManualClock::new(1_700_000_000)),
    );
    let sql = "SELECT * FROM orders WHERE 1 = 0";

    let mut runs = 0;
    for _ in 0..3 {
        let result = cache
            .cache_execute(sql, None, Some(60), || {
                runs += 1;
                Ok::<_, String>(CacheEnvelope::empty_result(sql, 0, 0))
            })
            .expect("execute");
        assert!(result.is_empty());
    }
    assert_eq!(runs, 1);
}

#[test]
fn test_definitions_from_toml() {
    let dir = TempDir::new().expect("tempdir");
    let raw = format!(
        r#"
        backend = "filesystem"
        default_ttl = 30

        [filesystem]
        cache_directory = "{}"
        read_chunk_size = 4096

        [key_scope]
        database_type = "postgres"
        database = "sales"
        "#,
        dir.path().display()
    );
    let definitions = CacheDefinitions::from_toml_str(&raw).expect("toml");
    let cache = QueryCache::from_definitions(&definitions).expect("build");

    assert_eq!(cache.default_ttl(), 30);
    assert!(cache.put("SELECT 1", None, &CacheEnvelope::rows("SELECT 1", "[[1]]"), None));
    assert_eq!(cache.get("SELECT 1", None).payload(), Some("[[1]]"));

    let info = cache.info();
    assert_eq!(info.get("backend").map(String::as_str), Some("filesystem"));
    assert_eq!(info.get("entries").map(String::as_str), Some("1"));
}

#[test]
fn test_key_scope_isolates_databases() {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let mut sales = CacheDefinitions::filesystem(dir.path());
    sales.key_scope.database = "sales".to_string();
    let mut hr = sales.clone();
    hr.key_scope.database = "hr".to_string();

    let sales_cache = build(&sales, clock.clone());
    let hr_cache = build(&hr, clock);

    sales_cache.put("SELECT * FROM staff", None, &CacheEnvelope::rows("SELECT * FROM staff", "sales"), None);
    assert!(hr_cache.get("SELECT * FROM staff", None).is_miss());
    assert_ne!(
        sales_cache.key_for("SELECT * FROM staff", None),
        hr_cache.key_for("SELECT * FROM staff", None)
    );
}

#[test]
fn test_unusable_directory_degrades_gracefully() {
    let dir = TempDir::new().expect("tempdir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").expect("write");

    let cache = build(
        &CacheDefinitions::filesystem(blocker.join("cache")),
        Arc::new(ManualClock::new(1_700_000_000)),
    );
    assert!(!cache.backend().is_available());
    assert!(!cache.health().is_healthy());

    let result = cache
        .cache_execute("SELECT 1", None, None, || {
            Ok::<_, String>(CacheEnvelope::rows("SELECT 1", "[[1]]"))
        })
        .expect("query still succeeds");
    assert_eq!(result.payload(), Some("[[1]]"));
    assert_eq!(
        cache.get("SELECT 1", None).miss_reason(),
        Some(&MissReason::Unavailable)
    );
    assert_eq!(cache.flush_all().files_removed, 0);
}
