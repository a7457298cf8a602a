use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub logs: usize,
    pub vocab: usize,
    pub field_int: usize,
    pub field_float: usize,
    pub field_text: usize,
    pub log_field_int: usize,
    pub log_field_float: usize,
    pub log_field_text: usize,
}

/// Point-in-time copy of the ingest pipeline counters.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PipelineSnapshot {
    pub frames_rejected: u64,
    pub queue_dropped: u64,
    pub queue_len: usize,
    pub records_rejected: u64,
    pub pending_dropped: u64,
    pub pending: usize,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub records_written: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub counts: TableCounts,
    pub oldest_ts: Option<DateTime<Utc>>,
    pub newest_ts: Option<DateTime<Utc>>,
    pub pipeline: Option<PipelineSnapshot>,
}
