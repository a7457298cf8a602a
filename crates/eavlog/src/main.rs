mod client;
mod output;
mod protocol;
mod query_server;
mod refresh;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use eavlog_core::config::{Config, config_file_path};
use eavlog_core::model::record::{CORRELATION_KEY, CREATED_KEY, MESSAGE_KEY};
use eavlog_core::settings::SharedSettings;
use eavlog_ingest::{FrameClient, IngestConfig, RawFrame};
use eavlog_store::{Store, StoreOptions};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::QueryClient;
use crate::output::{print_fields_human, print_log_human, print_logs_human, print_status_human};
use crate::protocol::{ApiRequest, ApiResponse};
use crate::query_server::{QueryState, bind_query_listener, run_query_server};
use crate::telemetry::{TelemetryConfig, init_cli_tracing, init_run_tracing, shutdown_tracing};

const DEFAULT_INTAKE_ADDR: &str = "127.0.0.1:56119";

#[derive(Parser, Debug)]
#[command(name = "eavlog")]
#[command(about = "Centralized log ingestion into a normalized attribute store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Query server address")]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run intake, collector and query servers")]
    Run {
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long)]
        intake_addr: Option<String>,
        #[arg(long)]
        http_addr: Option<String>,
        #[arg(long)]
        query_addr: Option<String>,
        #[arg(long)]
        health_addr: Option<String>,
    },
    #[command(about = "Send log records to a running intake")]
    Send {
        message: String,
        #[arg(long)]
        intake_addr: Option<String>,
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long = "attr", help = "Attribute as key=value (repeatable)")]
        attrs: Vec<String>,
        #[arg(long)]
        correlation_id: Option<Uuid>,
        #[arg(long, help = "Send as a two-part frame with this topic")]
        topic: Option<String>,
    },
    #[command(about = "Show one stored log with its attributes")]
    Log { id: i64 },
    #[command(about = "List logs sharing a correlation id")]
    Correlation { correlation_id: Uuid },
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            db_path,
            intake_addr,
            http_addr,
            query_addr,
            health_addr,
        } => {
            run_server(RunOverrides {
                db_path,
                intake_addr,
                http_addr,
                query_addr,
                health_addr,
            })
            .await
        }
        Commands::Send {
            message,
            intake_addr,
            count,
            attrs,
            correlation_id,
            topic,
        } => {
            init_cli_tracing();
            let addr = intake_addr
                .or_else(|| std::env::var("EAVLOG_INTAKE_ADDR").ok())
                .unwrap_or_else(|| DEFAULT_INTAKE_ADDR.to_string());
            let sent = send_records(&addr, &message, count, &attrs, correlation_id, topic).await?;
            if cli.json {
                println!("{}", json!({ "sent": sent, "intake_addr": addr }));
            } else {
                println!("sent {sent} record(s) to {addr}");
            }
            Ok(())
        }
        Commands::Log { id } => {
            init_cli_tracing();
            let mut client = QueryClient::connect(cli.addr).await?;
            let response = client.request(ApiRequest::GetLog { id }).await?;
            print_response(response, cli.json)
        }
        Commands::Correlation { correlation_id } => {
            init_cli_tracing();
            let mut client = QueryClient::connect(cli.addr).await?;
            let response = client
                .request(ApiRequest::ByCorrelation { correlation_id })
                .await?;
            print_response(response, cli.json)
        }
        Commands::Status => {
            init_cli_tracing();
            let mut client = QueryClient::connect(cli.addr).await?;
            let response = client.request(ApiRequest::Status).await?;
            print_response(response, cli.json)
        }
    }
}

#[derive(Debug, Default)]
struct RunOverrides {
    db_path: Option<PathBuf>,
    intake_addr: Option<String>,
    http_addr: Option<String>,
    query_addr: Option<String>,
    health_addr: Option<String>,
}

impl RunOverrides {
    fn apply(self, cfg: &mut Config) {
        if let Some(v) = self.db_path {
            cfg.db_path = v;
        }
        if let Some(v) = self.intake_addr {
            cfg.intake_addr = v;
        }
        if let Some(v) = self.http_addr {
            cfg.http_addr = v;
        }
        if let Some(v) = self.query_addr {
            cfg.query_addr = v;
        }
        if let Some(v) = self.health_addr {
            cfg.health_addr = v;
        }
    }
}

async fn run_server(overrides: RunOverrides) -> anyhow::Result<()> {
    init_run_tracing(TelemetryConfig::from_env());

    let config_path = config_file_path();
    let mut cfg = Config::load_from(&config_path).context("load config")?;
    overrides.apply(&mut cfg);
    cfg.validate().context("validate config")?;

    let store = Store::open(
        &cfg.db_path,
        StoreOptions {
            pool_size: cfg.pool_size,
            vocab_cache_capacity: cfg.vocab_cache_capacity,
        },
    )
    .context("open store")?;
    let settings = SharedSettings::new(cfg.runtime_settings());
    let cancel = CancellationToken::new();

    let ingest = eavlog_ingest::start(
        Arc::new(store.clone()),
        &IngestConfig {
            intake_addr: cfg.intake_addr.clone(),
            http_addr: Some(cfg.http_addr.clone()),
            health_addr: Some(cfg.health_addr.clone()),
            queue_capacity: cfg.queue_capacity,
        },
        settings.clone(),
        cancel.clone(),
    )
    .await
    .context("start ingest")?;

    let query_listener = bind_query_listener(&cfg.query_addr).await?;
    let mut query_task = tokio::spawn(run_query_server(
        query_listener,
        QueryState {
            store: store.clone(),
            monitor: Some(ingest.monitor()),
        },
        cancel.clone(),
    ));

    let refresh_task = cfg.refresh_enabled.then(|| {
        tokio::spawn(refresh::run_refresh_loop(
            config_path.clone(),
            settings.clone(),
            cfg.refresh_interval,
            cancel.clone(),
        ))
    });

    eprintln!("eavlog run");
    eprintln!("  db: {}", cfg.db_path.display());
    eprintln!("  intake tcp: {}", ingest.intake_addr);
    if let Some(addr) = ingest.http_addr {
        eprintln!("  intake http: {addr}");
    }
    eprintln!("  query tcp: {}", cfg.query_addr);
    if let Some(addr) = ingest.health_addr {
        eprintln!("  health: {addr}");
    }

    let outcome = tokio::select! {
        res = &mut query_task => match res {
            Ok(inner) => inner.context("query server failed"),
            Err(e) => Err(anyhow::anyhow!("query server task failed: {e}")),
        },
        _ = shutdown_signal() => {
            tracing::info!("received shutdown signal, flushing");
            Ok(())
        }
    };

    cancel.cancel();
    ingest.shutdown().await.context("stop ingest")?;
    if let Some(task) = refresh_task {
        let _ = task.await;
    }
    if !query_task.is_finished() {
        query_task.abort();
    }
    store.close();
    shutdown_tracing();
    outcome
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

async fn send_records(
    addr: &str,
    message: &str,
    count: usize,
    attrs: &[String],
    correlation_id: Option<Uuid>,
    topic: Option<String>,
) -> anyhow::Result<usize> {
    let attrs = attrs
        .iter()
        .map(|a| parse_attr(a))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut client = FrameClient::connect(addr).await?;
    for _ in 0..count {
        let document = build_document(message, &attrs, correlation_id)?;
        let frame = match &topic {
            Some(topic) => RawFrame::with_topic(topic.clone().into_bytes(), document),
            None => RawFrame::document(document),
        };
        client.send(&frame).await?;
    }
    client.close().await?;
    Ok(count)
}

fn build_document(
    message: &str,
    attrs: &[(String, Value)],
    correlation_id: Option<Uuid>,
) -> anyhow::Result<Vec<u8>> {
    let mut doc = Map::new();
    let now = chrono::Utc::now();
    doc.insert(
        CREATED_KEY.to_string(),
        json!(now.timestamp_micros() as f64 / 1_000_000.0),
    );
    doc.insert(MESSAGE_KEY.to_string(), json!(message));
    if let Some(id) = correlation_id {
        doc.insert(CORRELATION_KEY.to_string(), json!(id.to_string()));
    }
    for (k, v) in attrs {
        doc.insert(k.clone(), v.clone());
    }
    Ok(serde_json::to_vec(&Value::Object(doc))?)
}

/// `key=value`; the value is an integer, a float, or otherwise text.
fn parse_attr(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("attribute must be key=value, got {raw}"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("attribute key is empty in {raw}");
    }
    let value = if let Ok(i) = value.parse::<i64>() {
        json!(i)
    } else if let Ok(f) = value.parse::<f64>() {
        json!(f)
    } else {
        json!(value)
    };
    Ok((key.to_string(), value))
}

fn print_response(response: ApiResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        ApiResponse::Log(v) => print_log_human(v.as_ref()),
        ApiResponse::Logs(v) => print_logs_human(&v),
        ApiResponse::Fields(v) => print_fields_human(&v),
        ApiResponse::Status(v) => print_status_human(&v),
        ApiResponse::Error(e) => anyhow::bail!("server error: {e}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use eavlog_core::model::field::FieldValue;
    use eavlog_core::model::record::ParsedRecord;

    use super::*;

    #[test]
    fn parse_attr_infers_types() {
        assert_eq!(parse_attr("n=3").unwrap(), ("n".to_string(), json!(3)));
        assert_eq!(parse_attr("r=0.5").unwrap(), ("r".to_string(), json!(0.5)));
        assert_eq!(
            parse_attr("host=db-1").unwrap(),
            ("host".to_string(), json!("db-1"))
        );
        assert_eq!(
            parse_attr("eq=a=b").unwrap(),
            ("eq".to_string(), json!("a=b"))
        );
        assert!(parse_attr("novalue").is_err());
        assert!(parse_attr("=1").is_err());
    }

    #[test]
    fn built_documents_parse_as_records() {
        let id = Uuid::new_v4();
        let doc = build_document("hi", &[("n".to_string(), json!(3))], Some(id)).unwrap();
        let record = ParsedRecord::from_document(&doc, &[]).unwrap();
        assert_eq!(record.message.as_deref(), Some("hi"));
        assert_eq!(record.correlation_id, Some(id));
        assert_eq!(record.attributes, vec![("n".to_string(), FieldValue::Int(3))]);
    }

    #[test]
    fn cli_parses_send_with_attrs() {
        let cli = Cli::try_parse_from([
            "eavlog", "send", "hello", "--attr", "a=1", "--attr", "b=x", "--count", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Send { attrs, count, .. } => {
                assert_eq!(attrs, vec!["a=1", "b=x"]);
                assert_eq!(count, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
