use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use eavlog_core::error::Result;
use eavlog_core::model::record::ParsedRecord;
use eavlog_core::settings::{RuntimeSettings, SharedSettings};
use eavlog_store::Store;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::RawFrame;
use crate::queue::{Dequeue, IntakeReceiver};
use crate::stats::{PipelineStats, should_log};

/// Durable destination of flushed batches.
pub trait RecordSink: Send + Sync + 'static {
    /// Writes the whole batch or fails. A failed call may have written part
    /// of the batch.
    fn write_batch(&self, batch: &[ParsedRecord]) -> Result<usize>;
}

impl RecordSink for Store {
    fn write_batch(&self, batch: &[ParsedRecord]) -> Result<usize> {
        Store::write_batch(self, batch)
    }
}

/// Accumulates parsed records and flushes them when the batch is full, when
/// the oldest record has waited `max_batch_age`, and once more on shutdown.
///
/// A failed flush keeps the batch. Size-triggered flushes are then held back
/// until the age deadline, so a failing store is retried once per
/// `max_batch_age` rather than on every incoming record.
pub struct Collector<S> {
    sink: Arc<S>,
    settings: SharedSettings,
    stats: Arc<PipelineStats>,
    pending: VecDeque<ParsedRecord>,
    batch_started: Option<Instant>,
    backing_off: bool,
}

impl<S: RecordSink> Collector<S> {
    pub fn new(sink: Arc<S>, settings: SharedSettings, stats: Arc<PipelineStats>) -> Self {
        Self {
            sink,
            settings,
            stats,
            pending: VecDeque::new(),
            batch_started: None,
            backing_off: false,
        }
    }

    pub async fn run(mut self, mut rx: IntakeReceiver, cancel: CancellationToken) {
        loop {
            let settings = self.settings.load();
            let wait = match self.batch_started {
                Some(started) => (started + settings.max_batch_age)
                    .saturating_duration_since(Instant::now()),
                None => settings.max_batch_age,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.dequeue_timeout(wait) => match next {
                    Dequeue::Frame(frame) => {
                        self.accept(frame, &settings);
                        if self.pending.len() >= settings.max_batch_size && !self.backing_off {
                            self.flush("size");
                        }
                    }
                    Dequeue::TimedOut => {
                        if self.age_expired(&settings) {
                            self.flush("age");
                        }
                    }
                    Dequeue::Closed => break,
                },
            }
        }

        // Only the retained batch is flushed; frames still queued are lost.
        if !rx.is_empty() {
            warn!(frames = rx.len(), "discarding queued frames at shutdown");
        }
        if !self.pending.is_empty() && !self.flush("shutdown") {
            warn!(
                records = self.pending.len(),
                "final flush failed, pending records are lost"
            );
        }
        info!("collector stopped");
    }

    fn accept(&mut self, frame: RawFrame, settings: &RuntimeSettings) {
        let record = frame
            .into_document()
            .and_then(|doc| ParsedRecord::from_document(&doc, &settings.drop_fields));
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let rejected = PipelineStats::incr(&self.stats.records_rejected);
                if should_log(rejected) {
                    warn!(error = %e, rejected, "dropping malformed record");
                }
                return;
            }
        };

        if self.pending.len() >= settings.max_pending {
            self.pending.pop_front();
            let dropped = PipelineStats::incr(&self.stats.pending_dropped);
            if should_log(dropped) {
                warn!(
                    dropped,
                    max_pending = settings.max_pending,
                    "retained batch full, dropping oldest record"
                );
            }
        }

        self.pending.push_back(record);
        self.batch_started.get_or_insert_with(Instant::now);
        self.stats.pending.store(self.pending.len(), Ordering::Relaxed);
    }

    fn age_expired(&self, settings: &RuntimeSettings) -> bool {
        match self.batch_started {
            Some(started) => started.elapsed() >= settings.max_batch_age,
            None => false,
        }
    }

    /// Returns whether the batch was written and cleared.
    fn flush(&mut self, trigger: &'static str) -> bool {
        let batch = self.pending.make_contiguous();
        match self.sink.write_batch(batch) {
            Ok(written) => {
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .records_written
                    .fetch_add(written as u64, Ordering::Relaxed);
                debug!(trigger, records = written, "batch flushed");
                self.pending.clear();
                self.batch_started = None;
                self.backing_off = false;
                self.stats.pending.store(0, Ordering::Relaxed);
                true
            }
            Err(e) => {
                let failures = PipelineStats::incr(&self.stats.failed_flushes);
                warn!(
                    error = %e,
                    trigger,
                    records = self.pending.len(),
                    failures,
                    "flush failed, keeping batch for retry"
                );
                self.batch_started = Some(Instant::now());
                self.backing_off = true;
                false
            }
        }
    }
}
