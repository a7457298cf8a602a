use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{EavlogError, Result};

pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EavlogError::Parse(format!("expected RFC3339 time, got {input}: {e}")))
}

/// Converts fractional unix seconds to a UTC timestamp with microsecond
/// precision.
pub fn parse_epoch_seconds(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(EavlogError::Parse(format!("invalid epoch seconds: {secs}")));
    }
    let micros = (secs * 1_000_000.0).round();
    if micros.abs() > i64::MAX as f64 {
        return Err(EavlogError::Parse(format!("epoch seconds out of range: {secs}")));
    }
    DateTime::from_timestamp_micros(micros as i64)
        .ok_or_else(|| EavlogError::Parse(format!("epoch seconds out of range: {secs}")))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| EavlogError::Parse(format!("invalid duration {input}: {e}")))
}
