use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::frame::RawFrame;
use crate::stats::{PipelineStats, should_log};

/// Producer side of the bounded handoff between transports and the
/// collector. Enqueueing never waits: a full queue drops the new frame.
#[derive(Clone)]
pub struct IntakeQueue {
    tx: mpsc::Sender<RawFrame>,
    stats: Arc<PipelineStats>,
}

pub struct IntakeReceiver {
    rx: mpsc::Receiver<RawFrame>,
}

#[derive(Debug)]
pub enum Dequeue {
    Frame(RawFrame),
    TimedOut,
    Closed,
}

pub fn bounded(capacity: usize, stats: Arc<PipelineStats>) -> (IntakeQueue, IntakeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IntakeQueue { tx, stats }, IntakeReceiver { rx })
}

impl IntakeQueue {
    /// Offers a frame to the collector. Returns `false` when it was dropped.
    pub fn enqueue(&self, frame: RawFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = PipelineStats::incr(&self.stats.queue_dropped);
                if should_log(dropped) {
                    warn!(
                        dropped,
                        capacity = self.capacity(),
                        "intake queue full, dropping message"
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                let dropped = PipelineStats::incr(&self.stats.queue_dropped);
                if should_log(dropped) {
                    warn!(dropped, "intake queue closed, dropping message");
                }
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }
}

impl IntakeReceiver {
    pub async fn dequeue(&mut self) -> Option<RawFrame> {
        self.rx.recv().await
    }

    pub async fn dequeue_timeout(&mut self, wait: Duration) -> Dequeue {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(frame)) => Dequeue::Frame(frame),
            Ok(None) => Dequeue::Closed,
            Err(_) => Dequeue::TimedOut,
        }
    }

    /// Frames still waiting in the queue.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
