use anyhow::Context;
use eavlog_ingest::PipelineMonitor;
use eavlog_store::Store;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ApiRequest, ApiResponse};

#[derive(Clone)]
pub struct QueryState {
    pub store: Store,
    pub monitor: Option<PipelineMonitor>,
}

pub async fn bind_query_listener(addr: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind TCP query listener {addr}"))
}

/// Serves line-delimited JSON requests until cancelled. A connection may
/// send any number of requests; each gets one response line.
pub async fn run_query_server(
    listener: TcpListener,
    state: QueryState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(addr = ?listener.local_addr().ok(), "query server listening");
    loop {
        let (stream, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(BufReader::new(stream), state).await {
                tracing::warn!(error = ?err, "tcp client request failed");
            }
        });
    }
}

async fn handle_stream<T>(mut stream: BufReader<T>, state: QueryState) -> anyhow::Result<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Ok(());
        }

        let response = match serde_json::from_str::<ApiRequest>(&line) {
            Ok(req) => handle_request(req, &state),
            Err(e) => ApiResponse::Error(format!("invalid request: {e}")),
        };
        let payload = serde_json::to_vec(&response)?;
        stream.get_mut().write_all(&payload).await?;
        stream.get_mut().write_all(b"\n").await?;
        stream.get_mut().flush().await?;
    }
}

fn handle_request(req: ApiRequest, state: &QueryState) -> ApiResponse {
    let store = &state.store;
    let resp = match req {
        ApiRequest::GetLog { id } => store.get_log(id).map(ApiResponse::Log),
        ApiRequest::ExtraData { id } => store.get_extra_data(id).map(ApiResponse::Fields),
        ApiRequest::ByCorrelation { correlation_id } => store
            .logs_by_correlation(correlation_id)
            .map(ApiResponse::Logs),
        ApiRequest::Status => store.status().map(|mut status| {
            status.pipeline = state.monitor.as_ref().map(PipelineMonitor::snapshot);
            ApiResponse::Status(status)
        }),
    };

    resp.unwrap_or_else(|e| ApiResponse::Error(e.to_string()))
}
