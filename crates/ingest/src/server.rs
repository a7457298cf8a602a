use std::net::SocketAddr;
use std::sync::Arc;

use eavlog_core::error::{EavlogError, Result};
use eavlog_core::query::PipelineSnapshot;
use eavlog_core::settings::SharedSettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collector::{Collector, RecordSink};
use crate::health::serve_health;
use crate::http;
use crate::queue::{self, IntakeQueue};
use crate::stats::PipelineStats;
use crate::transport::serve_frames;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub intake_addr: String,
    pub http_addr: Option<String>,
    pub health_addr: Option<String>,
    pub queue_capacity: usize,
}

/// Read-only view of a running pipeline for status reporting.
#[derive(Clone)]
pub struct PipelineMonitor {
    stats: Arc<PipelineStats>,
    queue: IntakeQueue,
}

impl PipelineMonitor {
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.stats.snapshot(self.queue.len())
    }
}

/// A running ingest pipeline: listeners, intake queue and collector.
pub struct IngestHandle {
    pub intake_addr: SocketAddr,
    pub http_addr: Option<SocketAddr>,
    pub health_addr: Option<SocketAddr>,
    monitor: PipelineMonitor,
    cancel: CancellationToken,
    listeners: Vec<JoinHandle<()>>,
    collector: JoinHandle<()>,
}

impl IngestHandle {
    pub fn monitor(&self) -> PipelineMonitor {
        self.monitor.clone()
    }

    pub fn queue(&self) -> &IntakeQueue {
        &self.monitor.queue
    }

    /// Stops the listeners, then waits for the collector's final flush.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        for task in self.listeners {
            if let Err(e) = task.await {
                warn!(error = %e, "listener task failed");
            }
        }
        self.collector
            .await
            .map_err(|e| EavlogError::Ingest(format!("collector task join failed: {e}")))?;
        info!("ingest pipeline stopped");
        Ok(())
    }
}

/// Binds every configured listener and starts the collector. Binding
/// failures are fatal and nothing is left running.
pub async fn start<S: RecordSink>(
    sink: Arc<S>,
    cfg: &IngestConfig,
    settings: SharedSettings,
    cancel: CancellationToken,
) -> Result<IngestHandle> {
    let intake = bind(&cfg.intake_addr, "frame intake").await?;
    let http_listener = match &cfg.http_addr {
        Some(addr) => Some(bind(addr, "http intake").await?),
        None => None,
    };
    let health_listener = match &cfg.health_addr {
        Some(addr) => Some(bind(addr, "health probe").await?),
        None => None,
    };

    let stats = Arc::new(PipelineStats::default());
    let (queue, rx) = queue::bounded(cfg.queue_capacity, stats.clone());

    let intake_addr = local_addr(&intake)?;
    let http_addr = http_listener.as_ref().map(local_addr).transpose()?;
    let health_addr = health_listener.as_ref().map(local_addr).transpose()?;

    let mut listeners = vec![tokio::spawn(serve_frames(
        intake,
        queue.clone(),
        cancel.clone(),
    ))];

    if let Some(listener) = http_listener {
        let app = http::router(queue.clone());
        let cancel = cancel.clone();
        listeners.push(tokio::spawn(async move {
            info!(addr = ?listener.local_addr().ok(), "http intake listening");
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "http intake failed");
            }
        }));
    }

    if let Some(listener) = health_listener {
        listeners.push(tokio::spawn(serve_health(listener, cancel.clone())));
    }

    let collector = Collector::new(sink, settings, stats.clone());
    let collector = tokio::spawn(collector.run(rx, cancel.clone()));

    Ok(IngestHandle {
        intake_addr,
        http_addr,
        health_addr,
        monitor: PipelineMonitor { stats, queue },
        cancel,
        listeners,
        collector,
    })
}

async fn bind(addr: &str, what: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| EavlogError::Io(format!("failed to bind {what} on {addr}: {e}")))
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr> {
    listener
        .local_addr()
        .map_err(|e| EavlogError::Io(format!("failed to read listener address: {e}")))
}
