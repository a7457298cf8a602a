use std::io::IsTerminal;

use chrono::SecondsFormat;
use eavlog_core::model::field::FieldValue;
use eavlog_core::model::log::{Field, LogEntry};
use eavlog_core::query::StatusResponse;
use owo_colors::OwoColorize;

fn color() -> bool {
    std::io::stdout().is_terminal()
}

pub fn print_log_human(entry: Option<&LogEntry>) {
    match entry {
        Some(entry) => print!("{}", format_entry(entry, color())),
        None => println!("-- no such log --"),
    }
}

pub fn print_logs_human(entries: &[LogEntry]) {
    let color = color();
    for entry in entries {
        print!("{}", format_entry(entry, color));
    }
    println!("-- {} logs --", entries.len());
}

pub fn print_fields_human(fields: &[Field]) {
    let color = color();
    for field in fields {
        println!("  {}", format_field(field, color));
    }
    println!("-- {} fields --", fields.len());
}

pub fn print_status_human(v: &StatusResponse) {
    println!("db_path={}", v.db_path);
    println!("db_size_bytes={}", v.db_size_bytes);
    let c = &v.counts;
    println!("logs={} vocab={}", c.logs, c.vocab);
    println!(
        "fields int={} float={} text={}",
        c.field_int, c.field_float, c.field_text
    );
    println!(
        "links int={} float={} text={}",
        c.log_field_int, c.log_field_float, c.log_field_text
    );
    if let Some(oldest) = v.oldest_ts {
        println!(
            "oldest={}",
            oldest.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
    }
    if let Some(newest) = v.newest_ts {
        println!(
            "newest={}",
            newest.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
    }
    if let Some(p) = &v.pipeline {
        println!(
            "pipeline queue={} pending={} flushes={} failed_flushes={} written={}",
            p.queue_len, p.pending, p.flushes, p.failed_flushes, p.records_written
        );
        println!(
            "dropped frames={} queue={} records={} pending={}",
            p.frames_rejected, p.queue_dropped, p.records_rejected, p.pending_dropped
        );
    }
}

fn format_entry(entry: &LogEntry, color: bool) -> String {
    let ts = entry.ts.to_rfc3339_opts(SecondsFormat::Millis, true);
    let correlation = entry
        .correlation_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let message = entry.message.as_deref().unwrap_or("");

    let mut out = if color {
        format!(
            "{} #{} correlation={} | {}\n",
            ts,
            entry.id.bold(),
            correlation.cyan(),
            message
        )
    } else {
        format!("{ts} #{} correlation={correlation} | {message}\n", entry.id)
    };
    for field in &entry.fields {
        out.push_str("  ");
        out.push_str(&format_field(field, color));
        out.push('\n');
    }
    out
}

fn format_field(field: &Field, color: bool) -> String {
    let value = match &field.value {
        FieldValue::Text(s) => format!("{s:?}"),
        other => other.to_string(),
    };
    if !color {
        return format!("{}={value}", field.name);
    }
    let value = match field.value {
        FieldValue::Int(_) => value.yellow().to_string(),
        FieldValue::Float(_) => value.magenta().to_string(),
        FieldValue::Text(_) => value.green().to_string(),
    };
    format!("{}={value}", field.name.bright_black())
}
