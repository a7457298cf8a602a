use duckdb::{Connection, params};
use eavlog_core::error::{EavlogError, Result};
use eavlog_core::model::record::ParsedRecord;
use tracing::debug;

use crate::Store;
use crate::normalize::normalize_field;

impl Store {
    /// Writes every record of `batch` with its attributes and returns how
    /// many log rows were inserted.
    ///
    /// Statements run in autocommit mode. A failure part way leaves the rows
    /// written so far in place and returns the error; the caller keeps the
    /// batch and writes it again, so delivery is at least once.
    pub fn write_batch(&self, batch: &[ParsedRecord]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let conn = self.pool().acquire()?;
        for record in batch {
            let log_id = insert_log(&conn, record)?;
            for (name, value) in &record.attributes {
                normalize_field(&conn, self.cache(), log_id, name, value)?;
            }
        }
        debug!(records = batch.len(), "batch written");
        Ok(batch.len())
    }
}

fn insert_log(conn: &Connection, record: &ParsedRecord) -> Result<i64> {
    let correlation_id = record.correlation_id.map(|id| id.to_string());
    conn.query_row(
        "INSERT INTO logs (\"time\", message, correlation_id)
         VALUES (?, ?, CAST(? AS UUID))
         RETURNING id",
        params![record.ts.naive_utc(), record.message, correlation_id],
        |row| row.get::<_, i64>(0),
    )
    .map_err(|e| EavlogError::Store(format!("insert log failed: {e}")))
}
