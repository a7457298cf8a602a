use duckdb::{Connection, params};
use eavlog_core::error::{EavlogError, Result};
use eavlog_core::model::field::{FieldKind, FieldValue};

use crate::Store;
use crate::vocab::{CacheKey, StoredValue, VocabCache, get_or_insert, resolve_vocab};

impl Store {
    /// Stores one attribute of the log row `log_id` in its typed field table
    /// and links the two. Linking an attribute twice is a no-op.
    pub fn normalize(&self, log_id: i64, name: &str, value: &FieldValue) -> Result<()> {
        let conn = self.pool().acquire()?;
        normalize_field(&conn, self.cache(), log_id, name, value)
    }
}

pub(crate) fn normalize_field(
    conn: &Connection,
    cache: &VocabCache,
    log_id: i64,
    name: &str,
    value: &FieldValue,
) -> Result<()> {
    let kind = value.kind();
    let name_id = resolve_vocab(conn, cache, name, kind)?;
    let stored = match value {
        FieldValue::Int(v) => StoredValue::Int(*v),
        FieldValue::Float(v) => StoredValue::Float(v.to_bits()),
        FieldValue::Text(s) => {
            StoredValue::VocabRef(resolve_vocab(conn, cache, s, FieldKind::Text)?)
        }
    };
    let field_id = resolve_field(conn, cache, kind, name_id, stored)?;

    let sql = match kind {
        FieldKind::Int => {
            "INSERT INTO log_field_int (log_id, field_id) VALUES (?, ?) ON CONFLICT DO NOTHING"
        }
        FieldKind::Float => {
            "INSERT INTO log_field_float (log_id, field_id) VALUES (?, ?) ON CONFLICT DO NOTHING"
        }
        FieldKind::Text => {
            "INSERT INTO log_field_text (log_id, field_id) VALUES (?, ?) ON CONFLICT DO NOTHING"
        }
    };
    conn.execute(sql, params![log_id, field_id])
        .map_err(|e| EavlogError::Store(format!("insert {kind} field link failed: {e}")))?;
    Ok(())
}

fn resolve_field(
    conn: &Connection,
    cache: &VocabCache,
    kind: FieldKind,
    name_id: i64,
    value: StoredValue,
) -> Result<i64> {
    let key = CacheKey::Field {
        kind,
        name_id,
        value,
    };
    if let Some(id) = cache.get(&key) {
        return Ok(id);
    }

    let id = match value {
        StoredValue::Int(v) | StoredValue::VocabRef(v) => {
            let (table, select_sql, insert_sql) = if kind == FieldKind::Int {
                (
                    "field_int",
                    "SELECT id FROM field_int WHERE name = ? AND value = ?",
                    "INSERT INTO field_int (name, value) VALUES (?, ?) ON CONFLICT DO NOTHING RETURNING id",
                )
            } else {
                (
                    "field_text",
                    "SELECT id FROM field_text WHERE name = ? AND value = ?",
                    "INSERT INTO field_text (name, value) VALUES (?, ?) ON CONFLICT DO NOTHING RETURNING id",
                )
            };
            get_or_insert(
                conn,
                table,
                select_sql,
                params![name_id, v],
                insert_sql,
                params![name_id, v],
            )?
        }
        StoredValue::Float(bits) => {
            let v = f64::from_bits(bits);
            get_or_insert(
                conn,
                "field_float",
                "SELECT id FROM field_float WHERE name = ? AND value = ?",
                params![name_id, v],
                "INSERT INTO field_float (name, value) VALUES (?, ?) ON CONFLICT DO NOTHING RETURNING id",
                params![name_id, v],
            )?
        }
    };
    cache.put(key, id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use duckdb::params;
    use eavlog_core::model::field::FieldValue;

    use crate::Store;

    #[test]
    fn same_pair_on_two_logs_shares_one_field_row() {
        let store = Store::open_in_memory().unwrap();
        store.normalize(1, "status", &FieldValue::Int(200)).unwrap();
        store.normalize(2, "status", &FieldValue::Int(200)).unwrap();

        assert_eq!(store.count("SELECT COUNT(*) FROM field_int", params![]).unwrap(), 1);
        assert_eq!(
            store
                .count("SELECT COUNT(DISTINCT field_id) FROM log_field_int", params![])
                .unwrap(),
            1
        );
        assert_eq!(
            store.count("SELECT COUNT(*) FROM log_field_int", params![]).unwrap(),
            2
        );
    }

    #[test]
    fn relinking_is_a_no_op() {
        let store = Store::open_in_memory().unwrap();
        let value = FieldValue::Float(0.5);
        store.normalize(7, "ratio", &value).unwrap();
        store.normalize(7, "ratio", &value).unwrap();
        assert_eq!(
            store.count("SELECT COUNT(*) FROM log_field_float", params![]).unwrap(),
            1
        );
    }

    #[test]
    fn text_values_go_through_the_vocabulary() {
        let store = Store::open_in_memory().unwrap();
        store
            .normalize(1, "host", &FieldValue::Text("db-1".into()))
            .unwrap();
        // The value doubles as an attribute name elsewhere and is stored once.
        store
            .normalize(2, "db-1", &FieldValue::Text("host".into()))
            .unwrap();

        assert_eq!(store.count("SELECT COUNT(*) FROM vocab", params![]).unwrap(), 2);
        assert_eq!(
            store.count("SELECT COUNT(*) FROM field_text", params![]).unwrap(),
            2
        );
        assert_eq!(
            store
                .count(
                    "SELECT COUNT(*) FROM field_text f JOIN vocab v ON v.id = f.value WHERE v.value = 'db-1'",
                    params![]
                )
                .unwrap(),
            1
        );
    }

    #[test]
    fn name_type_records_first_use() {
        let store = Store::open_in_memory().unwrap();
        store.normalize(1, "latency", &FieldValue::Float(1.5)).unwrap();
        store.normalize(2, "latency", &FieldValue::Int(3)).unwrap();

        let conn = store.pool().acquire().unwrap();
        let kind: String = conn
            .query_row(
                "SELECT \"type\" FROM vocab WHERE value = 'latency'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(kind, "float");
        // One name, two kinds: both field tables carry a row for it.
        assert_eq!(store.count("SELECT COUNT(*) FROM field_int", params![]).unwrap(), 1);
        assert_eq!(store.count("SELECT COUNT(*) FROM field_float", params![]).unwrap(), 1);
    }
}
