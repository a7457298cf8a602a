use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use eavlog_core::error::{EavlogError, Result};
use eavlog_core::query::{StatusResponse, TableCounts};
use tracing::info;

use crate::pool::ConnectionPool;
use crate::schema::SCHEMA_SQL;
use crate::vocab::VocabCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub pool_size: usize,
    pub vocab_cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pool_size: 2,
            vocab_cache_capacity: 1 << 20,
        }
    }
}

/// Handle to the log database. Clones share the connection pool and the
/// vocabulary cache.
#[derive(Clone)]
pub struct Store {
    pool: Arc<ConnectionPool>,
    cache: Arc<VocabCache>,
    db_path: String,
}

impl Store {
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EavlogError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| EavlogError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=4;")
            .map_err(|e| EavlogError::Store(format!("failed to set pragmas: {e}")))?;
        Self::init(conn, path.display().to_string(), options)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EavlogError::Store(format!("failed to open in-memory db: {e}")))?;
        Self::init(conn, ":memory:".to_string(), options)
    }

    fn init(conn: Connection, db_path: String, options: StoreOptions) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| EavlogError::Store(format!("failed to initialize schema: {e}")))?;
        let pool = ConnectionPool::new(conn, options.pool_size)?;
        info!(
            db_path = %db_path,
            pool_size = pool.size(),
            vocab_cache_capacity = options.vocab_cache_capacity,
            "store opened"
        );

        Ok(Self {
            pool: Arc::new(pool),
            cache: Arc::new(VocabCache::new(options.vocab_cache_capacity)),
            db_path,
        })
    }

    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn cache(&self) -> &VocabCache {
        &self.cache
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Releases every pooled connection. Any later operation on this store
    /// or its clones fails with a storage error.
    pub fn close(&self) -> usize {
        let closed = self.pool.close();
        info!(db_path = %self.db_path, connections = closed, "store closed");
        closed
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let conn = self.pool.acquire()?;

        let counts = TableCounts {
            logs: scalar_usize(&conn, "SELECT COUNT(*) FROM logs")?,
            vocab: scalar_usize(&conn, "SELECT COUNT(*) FROM vocab")?,
            field_int: scalar_usize(&conn, "SELECT COUNT(*) FROM field_int")?,
            field_float: scalar_usize(&conn, "SELECT COUNT(*) FROM field_float")?,
            field_text: scalar_usize(&conn, "SELECT COUNT(*) FROM field_text")?,
            log_field_int: scalar_usize(&conn, "SELECT COUNT(*) FROM log_field_int")?,
            log_field_float: scalar_usize(&conn, "SELECT COUNT(*) FROM log_field_float")?,
            log_field_text: scalar_usize(&conn, "SELECT COUNT(*) FROM log_field_text")?,
        };

        let oldest_ts = scalar_ts(&conn, "SELECT MIN(\"time\") FROM logs")?;
        let newest_ts = scalar_ts(&conn, "SELECT MAX(\"time\") FROM logs")?;

        let db_size_bytes = if self.db_path == ":memory:" {
            0
        } else {
            fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StatusResponse {
            db_path: self.db_path.clone(),
            db_size_bytes,
            counts,
            oldest_ts,
            newest_ts,
            pipeline: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_fresh_cache(&self, capacity: usize) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            cache: Arc::new(VocabCache::new(capacity)),
            db_path: self.db_path.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn count(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<i64> {
        let conn = self.pool.acquire()?;
        conn.query_row(sql, params, |row| row.get::<_, i64>(0))
            .map_err(|e| EavlogError::Store(format!("query failed: {e}")))
    }
}

fn scalar_usize(conn: &Connection, sql: &str) -> Result<usize> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|v| v as usize)
        .map_err(|e| EavlogError::Store(format!("query failed: {e}")))
}

fn scalar_ts(conn: &Connection, sql: &str) -> Result<Option<DateTime<Utc>>> {
    conn.query_row(sql, [], |row| row.get::<_, Option<NaiveDateTime>>(0))
        .map(|opt| opt.map(|dt| dt.and_utc()))
        .map_err(|e| EavlogError::Store(format!("query failed: {e}")))
}
