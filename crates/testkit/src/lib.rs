use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use eavlog_core::model::field::FieldValue;
use eavlog_core::model::record::ParsedRecord;
use serde_json::{Value, json};
use uuid::Uuid;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// A log document shaped like the output of a Python logging handler,
/// including the bookkeeping keys that are dropped by default.
pub fn sample_document(message: &str, correlation_id: Uuid) -> Value {
    json!({
        "created": 1_769_904_000.25,
        "msecs": 250.0,
        "message": message,
        "correlation_id": correlation_id.to_string(),
        "levelname": "INFO",
        "levelno": 20,
        "lineno": 42,
        "funcName": "handle",
        "module": "worker",
        "thread": 140_245_112,
        "threadName": "MainThread",
        "processName": "MainProcess",
        "duration": 0.125,
        "host": "app-1",
    })
}

pub fn sample_document_bytes(message: &str, correlation_id: Uuid) -> Vec<u8> {
    serde_json::to_vec(&sample_document(message, correlation_id)).unwrap()
}

/// A record with one attribute of every stored kind.
pub fn sample_record(message: &str, correlation_id: Option<Uuid>) -> ParsedRecord {
    ParsedRecord {
        ts: base_time(),
        message: Some(message.to_string()),
        correlation_id,
        attributes: vec![
            ("a".to_string(), FieldValue::Int(1)),
            ("b".to_string(), FieldValue::Text("x".to_string())),
            ("c".to_string(), FieldValue::Float(2.5)),
        ],
    }
}

pub fn sample_batch(n: usize) -> Vec<ParsedRecord> {
    (0..n)
        .map(|i| {
            let mut record = sample_record(&format!("record {i}"), Some(Uuid::new_v4()));
            record.ts = base_time() + chrono::Duration::milliseconds(i as i64);
            record
        })
        .collect()
}

/// Polls `check` every 10ms until it returns true or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
