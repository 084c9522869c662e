//! Property-Based Tests for Cache Key Generation
//!
//! For any query, the generated key is a pure function of the normalized
//! text, the bound parameters and the key scope.

use proptest::prelude::*;
use qcache_core::{normalize_sql, CacheEnvelope, CacheKey, KeyGenerator, KeyScope};

// ============================================================================
// STRATEGIES
// ============================================================================

fn word_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_*=?(),.]{1,10}"
}

fn whitespace_strategy() -> impl Strategy<Value = String> {
    "[ \t\r\n]{1,4}"
}

/// Unquoted statement words plus a whitespace run to follow each one.
fn spaced_words_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((word_strategy(), whitespace_strategy()), 1..10)
}

fn scope_strategy() -> impl Strategy<Value = KeyScope> {
    ("[a-z0-9]{0,6}", "[a-z0-9]{0,6}", "[a-z0-9]{0,6}", 0i32..4).prop_map(
        |(database_type, database, user, fetch_mode)| KeyScope {
            database_type,
            database,
            user,
            fetch_mode,
        },
    )
}

// ============================================================================
// REGRESSIONS
// ============================================================================

#[test]
fn test_trailing_backslash_literal_keeps_later_literal_case() {
    let generator = KeyGenerator::default();
    assert_ne!(
        generator.generate(r"SELECT * FROM files WHERE path = 'C:\' AND owner = 'Bob'", None),
        generator.generate(r"SELECT * FROM files WHERE path = 'C:\' AND owner = 'bob'", None)
    );
}

#[test]
fn test_line_comment_end_is_significant() {
    let generator = KeyGenerator::default();
    assert_ne!(
        generator.generate("SELECT 1 -- note\n, 2", None),
        generator.generate("SELECT 1 -- note , 2", None)
    );
    assert_eq!(
        generator.generate("SELECT 1 -- note\n, 2", None),
        generator.generate("select   1 -- note\n\t  , 2", None)
    );
}

#[test]
fn test_block_comment_is_kept_verbatim() {
    let generator = KeyGenerator::default();
    assert_ne!(
        generator.generate("SELECT /* Tag  A */ 1", None),
        generator.generate("SELECT /* tag a */ 1", None)
    );
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_key_is_deterministic(sql in ".{0,80}", scope in scope_strategy()) {
        let a = KeyGenerator::new(scope.clone()).generate(&sql, None);
        let b = KeyGenerator::new(scope).generate(&sql, None);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(CacheKey::parse(a.as_str()).ok(), Some(a));
    }

    #[test]
    fn prop_whitespace_and_case_do_not_change_key(words in spaced_words_strategy()) {
        let canonical = words
            .iter()
            .map(|(word, _)| word.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let messy: String = words
            .iter()
            .map(|(word, ws)| format!("{}{}", word.to_uppercase(), ws))
            .collect();

        let generator = KeyGenerator::default();
        prop_assert_eq!(
            generator.generate(&canonical, None),
            generator.generate(&format!("  {}", messy), None)
        );
    }

    #[test]
    fn prop_normalize_is_idempotent(sql in "[ -~\t\n]{0,80}") {
        let once = normalize_sql(&sql);
        prop_assert_eq!(normalize_sql(&once), once);
    }

    #[test]
    fn prop_comment_text_changes_key(text in "[A-Za-z ]{1,12}") {
        prop_assume!(text.to_uppercase() != text.to_lowercase());
        let generator = KeyGenerator::default();
        prop_assert_ne!(
            generator.generate(&format!("SELECT 1 -- {}\n, 2", text.to_uppercase()), None),
            generator.generate(&format!("SELECT 1 -- {}\n, 2", text.to_lowercase()), None)
        );
    }

    #[test]
    fn prop_quoted_literals_keep_case(literal in "[A-Za-z]{1,12}") {
        let generator = KeyGenerator::default();
        let upper = generator.generate(&format!("SELECT * FROM t WHERE a = '{}'", literal.to_uppercase()), None);
        let lower = generator.generate(&format!("SELECT * FROM t WHERE a = '{}'", literal.to_lowercase()), None);
        prop_assert_eq!(upper == lower, literal.to_uppercase() == literal.to_lowercase());
    }

    #[test]
    fn prop_params_distinguish_keys(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let generator = KeyGenerator::default();
        let sql = "SELECT * FROM t WHERE id = ?";
        prop_assert_ne!(
            generator.generate(sql, Some(&[serde_json::json!(a)])),
            generator.generate(sql, Some(&[serde_json::json!(b)]))
        );
    }

    #[test]
    fn prop_scope_separates_databases(sql in "[a-z ]{1,40}", db_a in "[a-z]{1,6}", db_b in "[a-z]{1,6}") {
        prop_assume!(db_a != db_b);
        let scope = |database: &str| KeyScope {
            database: database.to_string(),
            ..KeyScope::default()
        };
        prop_assert_ne!(
            KeyGenerator::new(scope(&db_a)).generate(&sql, None),
            KeyGenerator::new(scope(&db_b)).generate(&sql, None)
        );
    }

    #[test]
    fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = CacheEnvelope::decode(&bytes);
    }
}
