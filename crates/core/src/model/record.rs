use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{EavlogError, Result};
use crate::model::field::FieldValue;
use crate::time::{parse_epoch_seconds, parse_timestamp};

pub const CREATED_KEY: &str = "created";
pub const MESSAGE_KEY: &str = "message";
pub const CORRELATION_KEY: &str = "correlation_id";

/// A log record accepted from the transport and waiting to be written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedRecord {
    pub ts: DateTime<Utc>,
    pub message: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub attributes: Vec<(String, FieldValue)>,
}

impl ParsedRecord {
    /// Parses a JSON record document.
    ///
    /// `created` is mandatory. `message` and `correlation_id` are lifted out
    /// of the attribute map, then every key in `drop_fields` is removed. What
    /// remains becomes the record's attributes.
    pub fn from_document(raw: &[u8], drop_fields: &[String]) -> Result<Self> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| EavlogError::Parse(format!("record is not valid json: {e}")))?;
        let Value::Object(map) = value else {
            return Err(EavlogError::Parse(
                "record document must be a json object".to_string(),
            ));
        };
        Self::from_map(map, drop_fields)
    }

    pub fn from_map(mut map: Map<String, Value>, drop_fields: &[String]) -> Result<Self> {
        let ts = match map.remove(CREATED_KEY) {
            Some(v) => parse_created(&v)?,
            None => {
                return Err(EavlogError::Parse(format!(
                    "record has no \"{CREATED_KEY}\" field"
                )));
            }
        };

        let message = match map.remove(MESSAGE_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };

        let correlation_id = match map.remove(CORRELATION_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Uuid::parse_str(&s).map_err(|e| {
                EavlogError::Parse(format!("invalid correlation id {s}: {e}"))
            })?),
            Some(other) => {
                return Err(EavlogError::Parse(format!(
                    "correlation id must be a string, got {other}"
                )));
            }
        };

        for key in drop_fields {
            map.remove(key);
        }

        let attributes = map
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from_json(v)))
            .collect();

        Ok(Self {
            ts,
            message,
            correlation_id,
            attributes,
        })
    }
}

fn parse_created(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EavlogError::Parse(format!("invalid created value: {n}")))
            .and_then(parse_epoch_seconds),
        Value::String(s) => parse_timestamp(s),
        other => Err(EavlogError::Parse(format!(
            "created must be epoch seconds or RFC3339, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn drop_list() -> Vec<String> {
        vec!["thread".to_string(), "module".to_string()]
    }

    #[test]
    fn parses_full_document() {
        let doc = json!({
            "created": 1_700_000_000.5,
            "message": "disk almost full",
            "correlation_id": "0b5a0d8e-5a3c-4a6f-9a43-6f1f4d0f8a11",
            "pct": 93,
            "ratio": 0.93,
            "host": "db-1",
            "thread": 140,
        });
        let mut rec =
            ParsedRecord::from_document(doc.to_string().as_bytes(), &drop_list()).unwrap();
        rec.attributes.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            rec.ts,
            Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap()
        );
        assert_eq!(rec.message.as_deref(), Some("disk almost full"));
        assert_eq!(
            rec.correlation_id.unwrap().to_string(),
            "0b5a0d8e-5a3c-4a6f-9a43-6f1f4d0f8a11"
        );
        assert_eq!(
            rec.attributes,
            vec![
                ("host".to_string(), FieldValue::Text("db-1".into())),
                ("pct".to_string(), FieldValue::Int(93)),
                ("ratio".to_string(), FieldValue::Float(0.93)),
            ]
        );
    }

    #[test]
    fn missing_created_is_rejected() {
        let doc = json!({"message": "no time"});
        assert!(ParsedRecord::from_document(doc.to_string().as_bytes(), &[]).is_err());
    }

    #[test]
    fn accepts_rfc3339_created_and_no_message() {
        let doc = json!({"created": "2026-02-01T00:00:00Z"});
        let rec = ParsedRecord::from_document(doc.to_string().as_bytes(), &[]).unwrap();
        assert_eq!(rec.ts, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert!(rec.message.is_none());
        assert!(rec.attributes.is_empty());
    }

    #[test]
    fn rejects_bad_json_and_bad_correlation() {
        assert!(ParsedRecord::from_document(b"{not json", &[]).is_err());
        assert!(ParsedRecord::from_document(b"[1,2]", &[]).is_err());
        let doc = json!({"created": 1, "correlation_id": "nope"});
        assert!(ParsedRecord::from_document(doc.to_string().as_bytes(), &[]).is_err());
    }
}
