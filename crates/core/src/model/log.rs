use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::field::FieldValue;

/// A reconstructed attribute of a stored log record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// A stored log row together with its reassembled attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub message: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub fields: Vec<Field>,
}
