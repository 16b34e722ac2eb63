use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing file processing activity.
#[derive(Default)]
pub struct ScribeMetrics {
    files_accepted: AtomicU64,
    files_rejected: AtomicU64,
    extractions_succeeded: AtomicU64,
    extractions_failed: AtomicU64,
    usage_rollbacks: AtomicU64,
    assist_calls: AtomicU64,
}

impl ScribeMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file that passed upload validation and entered the queue.
    pub fn record_accepted(&self) {
        self.files_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a file rejected before queueing.
    pub fn record_rejected(&self) {
        self.files_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processing attempt that reached `success`.
    pub fn record_success(&self) {
        self.extractions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processing attempt that ended in `error`.
    pub fn record_failure(&self) {
        self.extractions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a usage decrement issued after a failed billed operation.
    pub fn record_rollback(&self) {
        self.usage_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a summarize/translate/keywords call.
    pub fn record_assist(&self) {
        self.assist_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_accepted: self.files_accepted.load(Ordering::Relaxed),
            files_rejected: self.files_rejected.load(Ordering::Relaxed),
            extractions_succeeded: self.extractions_succeeded.load(Ordering::Relaxed),
            extractions_failed: self.extractions_failed.load(Ordering::Relaxed),
            usage_rollbacks: self.usage_rollbacks.load(Ordering::Relaxed),
            assist_calls: self.assist_calls.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of processing counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files that entered the queue.
    pub files_accepted: u64,
    /// Files rejected during upload validation.
    pub files_rejected: u64,
    /// Processing attempts that succeeded.
    pub extractions_succeeded: u64,
    /// Processing attempts that failed after starting.
    pub extractions_failed: u64,
    /// Usage decrements issued for failed billed operations.
    pub usage_rollbacks: u64,
    /// Assist operations served.
    pub assist_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_processing_outcomes() {
        let metrics = ScribeMetrics::new();
        metrics.record_accepted();
        metrics.record_accepted();
        metrics.record_rejected();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_rollback();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_accepted, 2);
        assert_eq!(snapshot.files_rejected, 1);
        assert_eq!(snapshot.extractions_succeeded, 1);
        assert_eq!(snapshot.extractions_failed, 1);
        assert_eq!(snapshot.usage_rollbacks, 1);
        assert_eq!(snapshot.assist_calls, 0);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(ScribeMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
