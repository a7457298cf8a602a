use chrono::NaiveDateTime;
use duckdb::{Connection, params};
use eavlog_core::error::{EavlogError, Result};
use eavlog_core::model::field::FieldValue;
use eavlog_core::model::log::{Field, LogEntry};
use uuid::Uuid;

use crate::Store;
use crate::vocab::optional;

const INT_FIELDS_SQL: &str = "SELECT n.value, f.value
     FROM log_field_int l
     JOIN field_int f ON f.id = l.field_id
     JOIN vocab n ON n.id = f.name
     WHERE l.log_id = ?
     ORDER BY n.value";

const FLOAT_FIELDS_SQL: &str = "SELECT n.value, f.value
     FROM log_field_float l
     JOIN field_float f ON f.id = l.field_id
     JOIN vocab n ON n.id = f.name
     WHERE l.log_id = ?
     ORDER BY n.value";

const TEXT_FIELDS_SQL: &str = "SELECT n.value, t.value
     FROM log_field_text l
     JOIN field_text f ON f.id = l.field_id
     JOIN vocab n ON n.id = f.name
     JOIN vocab t ON t.id = f.value
     WHERE l.log_id = ?
     ORDER BY n.value";

const LOG_COLUMNS: &str = "\"time\", id, message, correlation_id::VARCHAR";

impl Store {
    /// Reassembles the attributes of one log row: integer fields first, then
    /// floats, then text, each group ordered by name. Unknown ids yield an
    /// empty list.
    pub fn get_extra_data(&self, log_id: i64) -> Result<Vec<Field>> {
        let conn = self.pool().acquire()?;
        extra_data(&conn, log_id)
    }

    pub fn get_log(&self, log_id: i64) -> Result<Option<LogEntry>> {
        let conn = self.pool().acquire()?;
        let row = optional(conn.query_row(
            &format!("SELECT {LOG_COLUMNS} FROM logs WHERE id = ?"),
            params![log_id],
            map_log_row,
        ))
        .map_err(|e| EavlogError::Store(format!("query log failed: {e}")))?;

        row.map(|raw| into_entry(raw).and_then(|entry| with_fields(&conn, entry)))
            .transpose()
    }

    /// All log rows sharing `correlation_id`, oldest first.
    pub fn logs_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<LogEntry>> {
        let conn = self.pool().acquire()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM logs
                 WHERE correlation_id = CAST(? AS UUID)
                 ORDER BY \"time\" ASC, id ASC"
            ))
            .map_err(|e| EavlogError::Store(format!("prepare correlation query failed: {e}")))?;

        let rows = stmt
            .query_map(params![correlation_id.to_string()], map_log_row)
            .map_err(|e| EavlogError::Store(format!("query correlation failed: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| EavlogError::Store(format!("map log row failed: {e}")))?;
            entries.push(into_entry(raw)?);
        }

        entries
            .into_iter()
            .map(|entry| with_fields(&conn, entry))
            .collect()
    }
}

type LogRow = (NaiveDateTime, i64, Option<String>, Option<String>);

fn map_log_row(row: &duckdb::Row<'_>) -> duckdb::Result<LogRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_entry((ts, id, message, correlation): LogRow) -> Result<LogEntry> {
    let correlation_id = correlation
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|e| {
                EavlogError::Store(format!("stored correlation id {raw} is not a uuid: {e}"))
            })
        })
        .transpose()?;

    Ok(LogEntry {
        id,
        ts: ts.and_utc(),
        message,
        correlation_id,
        fields: Vec::new(),
    })
}

fn with_fields(conn: &Connection, mut entry: LogEntry) -> Result<LogEntry> {
    entry.fields = extra_data(conn, entry.id)?;
    Ok(entry)
}

fn extra_data(conn: &Connection, log_id: i64) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    collect_fields(conn, INT_FIELDS_SQL, log_id, "int", &mut fields, |row| {
        row.get::<_, i64>(1).map(FieldValue::Int)
    })?;
    collect_fields(conn, FLOAT_FIELDS_SQL, log_id, "float", &mut fields, |row| {
        row.get::<_, f64>(1).map(FieldValue::Float)
    })?;
    collect_fields(conn, TEXT_FIELDS_SQL, log_id, "text", &mut fields, |row| {
        row.get::<_, String>(1).map(FieldValue::Text)
    })?;
    Ok(fields)
}

fn collect_fields<F>(
    conn: &Connection,
    sql: &str,
    log_id: i64,
    kind: &str,
    out: &mut Vec<Field>,
    value_of: F,
) -> Result<()>
where
    F: Fn(&duckdb::Row<'_>) -> duckdb::Result<FieldValue>,
{
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| EavlogError::Store(format!("prepare {kind} fields failed: {e}")))?;
    let rows = stmt
        .query_map(params![log_id], |row| {
            Ok(Field {
                name: row.get::<_, String>(0)?,
                value: value_of(row)?,
            })
        })
        .map_err(|e| EavlogError::Store(format!("query {kind} fields failed: {e}")))?;

    for row in rows {
        out.push(row.map_err(|e| EavlogError::Store(format!("map {kind} field failed: {e}")))?);
    }
    Ok(())
}
