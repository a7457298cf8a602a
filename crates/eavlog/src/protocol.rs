use eavlog_core::model::log::{Field, LogEntry};
use eavlog_core::query::StatusResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ApiRequest {
    GetLog { id: i64 },
    ExtraData { id: i64 },
    ByCorrelation { correlation_id: Uuid },
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiResponse {
    Log(Option<LogEntry>),
    Fields(Vec<Field>),
    Logs(Vec<LogEntry>),
    Status(StatusResponse),
    Error(String),
}
