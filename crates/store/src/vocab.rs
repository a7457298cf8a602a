use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use duckdb::{Connection, ToSql, params};
use eavlog_core::error::{EavlogError, Result};
use eavlog_core::model::field::FieldKind;
use lru::LruCache;
use tracing::debug;

use crate::Store;

const MAX_RESOLVE_ATTEMPTS: u32 = 5;

/// What a cached id stands for. Vocabulary entries and field entries share
/// one cache, so the key carries the role next to the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    Vocab(String),
    Field {
        kind: FieldKind,
        name_id: i64,
        value: StoredValue,
    },
}

/// A field value as it is written to its field table. Text values are
/// replaced by their vocabulary id, floats are keyed by their bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum StoredValue {
    Int(i64),
    Float(u64),
    VocabRef(i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

/// Process-local memo of vocabulary and field ids, bounded by LRU eviction.
///
/// The cache only saves round-trips. The unique constraints in the database
/// decide which id a value gets; an evicted entry is simply looked up again.
pub struct VocabCache {
    entries: Mutex<LruCache<CacheKey, i64>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl VocabCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<i64> {
        let found = self
            .entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.get(key).copied());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub(crate) fn put(&self, key: CacheKey, id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, id);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.entries.lock().map(|e| e.len()).unwrap_or(0),
        }
    }
}

impl Store {
    /// Returns the vocabulary id for `text`, creating the entry on first use.
    pub fn resolve_vocab(&self, text: &str, kind: FieldKind) -> Result<i64> {
        let conn = self.pool().acquire()?;
        resolve_vocab(&conn, self.cache(), text, kind)
    }
}

pub(crate) fn resolve_vocab(
    conn: &Connection,
    cache: &VocabCache,
    text: &str,
    kind: FieldKind,
) -> Result<i64> {
    let key = CacheKey::Vocab(text.to_string());
    if let Some(id) = cache.get(&key) {
        return Ok(id);
    }

    let id = get_or_insert(
        conn,
        "vocab",
        "SELECT id FROM vocab WHERE value = ?",
        params![text],
        "INSERT INTO vocab (value, \"type\") VALUES (?, ?) ON CONFLICT DO NOTHING RETURNING id",
        params![text, kind.as_str()],
    )?;
    cache.put(key, id);
    Ok(id)
}

/// Read, then insert-or-ignore, then read again.
///
/// A writer that loses the insert race to another connection sees either an
/// empty `RETURNING` or a constraint/transaction conflict; in both cases the
/// winning row is re-read. Any other insert error is returned at once.
pub(crate) fn get_or_insert(
    conn: &Connection,
    table: &str,
    select_sql: &str,
    select_params: &[&dyn ToSql],
    insert_sql: &str,
    insert_params: &[&dyn ToSql],
) -> Result<i64> {
    let mut last_err = None;
    for attempt in 0..MAX_RESOLVE_ATTEMPTS {
        if let Some(id) = select_id(conn, table, select_sql, select_params)? {
            return Ok(id);
        }

        match optional(conn.query_row(insert_sql, insert_params, |row| row.get::<_, i64>(0))) {
            Ok(Some(id)) => return Ok(id),
            Ok(None) => {}
            Err(e) if is_lost_race(&e) => {
                debug!(table, attempt, error = %e, "insert lost a race, re-reading");
                last_err = Some(e);
            }
            Err(e) => {
                return Err(EavlogError::Store(format!("insert into {table} failed: {e}")));
            }
        }

        if let Some(id) = select_id(conn, table, select_sql, select_params)? {
            return Ok(id);
        }
        std::thread::sleep(Duration::from_millis(1 << attempt));
    }

    Err(EavlogError::Store(format!(
        "get-or-create on {table} gave up after {MAX_RESOLVE_ATTEMPTS} attempts: {}",
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "row never became visible".to_string())
    )))
}

/// DuckDB reports unique-key violations as `Constraint Error` and concurrent
/// writers to the same rows as `TransactionContext Error: ... conflict`.
fn is_lost_race(err: &duckdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("Constraint Error") || msg.to_ascii_lowercase().contains("conflict")
}

fn select_id(
    conn: &Connection,
    table: &str,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Option<i64>> {
    optional(conn.query_row(sql, params, |row| row.get::<_, i64>(0)))
        .map_err(|e| EavlogError::Store(format!("lookup in {table} failed: {e}")))
}

pub(crate) fn optional<T>(res: duckdb::Result<T>) -> duckdb::Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use duckdb::params;
    use eavlog_core::error::EavlogError;
    use eavlog_core::model::field::FieldKind;

    use super::{get_or_insert, is_lost_race};
    use crate::{Store, StoreOptions};

    fn vocab_rows(store: &Store, value: &str) -> i64 {
        store
            .count("SELECT COUNT(*) FROM vocab WHERE value = ?", params![value])
            .unwrap()
    }

    #[test]
    fn resolving_twice_returns_same_id() {
        let store = Store::open_in_memory().unwrap();
        let a = store.resolve_vocab("host", FieldKind::Text).unwrap();
        let b = store.resolve_vocab("host", FieldKind::Text).unwrap();
        assert_eq!(a, b);
        assert_eq!(vocab_rows(&store, "host"), 1);

        let stats = store.cache().stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.len, 1);
    }

    #[test]
    fn non_conflict_insert_error_fails_without_retrying() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.pool().acquire().unwrap();

        let err = get_or_insert(
            &conn,
            "vocab",
            "SELECT id FROM vocab WHERE value = ?",
            params!["missing"],
            "INSERT INTO no_such_table (value) VALUES (?) RETURNING id",
            params!["missing"],
        )
        .unwrap_err();

        let EavlogError::Store(msg) = err else {
            panic!("expected a storage error, got {err:?}");
        };
        assert!(msg.starts_with("insert into vocab failed"), "{msg}");
        assert!(!msg.contains("gave up"), "{msg}");
    }

    #[test]
    fn lost_races_are_told_apart_from_other_failures() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.pool().acquire().unwrap();
        conn.execute("INSERT INTO vocab (value, \"type\") VALUES ('dup', 'text')", [])
            .unwrap();

        let duplicate = conn
            .execute("INSERT INTO vocab (value, \"type\") VALUES ('dup', 'text')", [])
            .unwrap_err();
        assert!(is_lost_race(&duplicate), "{duplicate}");

        let missing = conn
            .execute("INSERT INTO no_such_table VALUES (1)", [])
            .unwrap_err();
        assert!(!is_lost_race(&missing), "{missing}");
    }

    #[test]
    fn distinct_values_get_distinct_ids() {
        let store = Store::open_in_memory().unwrap();
        let a = store.resolve_vocab("a", FieldKind::Int).unwrap();
        let b = store.resolve_vocab("b", FieldKind::Int).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn eviction_falls_back_to_the_stored_row() {
        let store = Store::open_in_memory_with(StoreOptions {
            pool_size: 1,
            vocab_cache_capacity: 1,
        })
        .unwrap();

        let first = store.resolve_vocab("alpha", FieldKind::Text).unwrap();
        store.resolve_vocab("beta", FieldKind::Text).unwrap();
        let again = store.resolve_vocab("alpha", FieldKind::Text).unwrap();

        assert_eq!(first, again);
        assert_eq!(vocab_rows(&store, "alpha"), 1);
        assert_eq!(store.cache().stats().len, 1);
    }

    #[test]
    fn independent_caches_agree_through_the_store() {
        let store = Store::open_in_memory().unwrap();
        let other = store.with_fresh_cache(16);

        let a = store.resolve_vocab("shared", FieldKind::Text).unwrap();
        let b = other.resolve_vocab("shared", FieldKind::Text).unwrap();
        assert_eq!(a, b);
        assert_eq!(vocab_rows(&store, "shared"), 1);
    }

    #[test]
    fn concurrent_resolution_creates_one_row() {
        let store = Arc::new(
            Store::open_in_memory_with(StoreOptions {
                pool_size: 4,
                vocab_cache_capacity: 1024,
            })
            .unwrap(),
        );

        let ids = std::thread::scope(|s| {
            let handles = (0..8)
                .map(|i| {
                    // Half the workers use their own cache so they always miss.
                    let store = if i % 2 == 0 {
                        (*store).clone()
                    } else {
                        store.with_fresh_cache(16)
                    };
                    s.spawn(move || store.resolve_vocab("contended", FieldKind::Text).unwrap())
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(vocab_rows(&store, "contended"), 1);
    }
}
