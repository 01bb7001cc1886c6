//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Envelopes waiting in the queue
    queue_len: AtomicUsize,
    /// Envelopes accepted by the destination
    delivered_count: AtomicU64,
    /// Terminal delivery failures
    failure_count: AtomicU64,
    /// Envelopes not routed because the sink had stopped
    not_routed_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn inc_queue_len(&self) {
        self.queue_len.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_queue_len(&self) {
        // Saturate at zero
        let _ = self
            .queue_len
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    pub fn inc_delivered_count(&self) {
        self.delivered_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn not_routed_count(&self) -> u64 {
        self.not_routed_count.load(Ordering::Relaxed)
    }

    pub fn inc_not_routed_count(&self) {
        self.not_routed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            delivered_count: self.delivered_count(),
            failure_count: self.failure_count(),
            not_routed_count: self.not_routed_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub delivered_count: u64,
    pub failure_count: u64,
    pub not_routed_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_len_saturates() {
        let metrics = SinkMetrics::new();
        metrics.dec_queue_len();
        assert_eq!(metrics.queue_len(), 0);

        metrics.inc_queue_len();
        metrics.inc_queue_len();
        metrics.dec_queue_len();
        assert_eq!(metrics.queue_len(), 1);
    }

    #[test]
    fn test_snapshot() {
        let metrics = SinkMetrics::new();
        metrics.inc_delivered_count();
        metrics.inc_failure_count();
        metrics.inc_not_routed_count();
        metrics.inc_not_routed_count();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                queue_len: 0,
                delivered_count: 1,
                failure_count: 1,
                not_routed_count: 2,
            }
        );
    }
}
