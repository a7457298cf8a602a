use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use eavlog_core::query::PipelineSnapshot;

/// Counters shared by the transports, the intake queue and the collector.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_rejected: AtomicU64,
    pub queue_dropped: AtomicU64,
    pub records_rejected: AtomicU64,
    pub pending_dropped: AtomicU64,
    pub pending: AtomicUsize,
    pub flushes: AtomicU64,
    pub failed_flushes: AtomicU64,
    pub records_written: AtomicU64,
}

impl PipelineStats {
    /// Bumps a counter and returns its new value.
    #[inline]
    pub fn incr(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self, queue_len: usize) -> PipelineSnapshot {
        PipelineSnapshot {
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            queue_len,
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            pending_dropped: self.pending_dropped.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
        }
    }
}

/// Drop warnings are emitted for the first drop and every thousandth after.
#[inline]
pub(crate) fn should_log(count: u64) -> bool {
    count == 1 || count % 1000 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = PipelineStats::default();
        assert_eq!(PipelineStats::incr(&stats.queue_dropped), 1);
        assert_eq!(PipelineStats::incr(&stats.queue_dropped), 2);
        stats.pending.store(7, Ordering::Relaxed);

        let snap = stats.snapshot(3);
        assert_eq!(snap.queue_dropped, 2);
        assert_eq!(snap.pending, 7);
        assert_eq!(snap.queue_len, 3);
        assert_eq!(snap.flushes, 0);
    }

    #[test]
    fn drop_logging_is_sampled() {
        assert!(should_log(1));
        assert!(!should_log(2));
        assert!(should_log(1000));
        assert!(!should_log(1001));
    }
}
