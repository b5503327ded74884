//! Global atomic counters for engine observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event, or [`Metrics::snapshot`] to read them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub batches_dispatched: u64,
    pub batches_failed: u64,
    pub records_accepted: u64,
    pub records_discarded: u64,
}

/// Process-wide dispatch and parse counters.
pub struct Metrics {
    batches_dispatched: AtomicU64,
    batches_failed: AtomicU64,
    records_accepted: AtomicU64,
    records_discarded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            batches_dispatched: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            records_accepted: AtomicU64::new(0),
            records_discarded: AtomicU64::new(0),
        }
    }

    /// Add `n` to the batches-dispatched counter.
    pub fn add_batches_dispatched(&self, n: u64) {
        self.batches_dispatched.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "batches_dispatched", n, "counter incremented");
    }

    /// Increment the batches-failed counter by one.
    pub fn inc_batches_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "batches_failed", "counter incremented");
    }

    /// Add `n` to the records-accepted counter.
    pub fn add_records_accepted(&self, n: u64) {
        self.records_accepted.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "records_accepted", n, "counter incremented");
    }

    /// Increment the records-discarded counter by one.
    pub fn inc_records_discarded(&self) {
        self.records_discarded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "records_discarded", "counter incremented");
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_dispatched: self.batches_dispatched(),
            batches_failed: self.batches_failed(),
            records_accepted: self.records_accepted(),
            records_discarded: self.records_discarded(),
        }
    }

    /// Emit the current snapshot as a single `info!` event.
    pub fn flush(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            metric = "flush",
            batches_dispatched = snapshot.batches_dispatched,
            batches_failed = snapshot.batches_failed,
            records_accepted = snapshot.records_accepted,
            records_discarded = snapshot.records_discarded,
        );
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.batches_dispatched.load(Ordering::Relaxed)
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    pub fn records_accepted(&self) -> u64 {
        self.records_accepted.load(Ordering::Relaxed)
    }

    pub fn records_discarded(&self) -> u64 {
        self.records_discarded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_counters_increment() {
        let metrics = Metrics::new();
        metrics.add_batches_dispatched(3);
        metrics.inc_batches_failed();
        metrics.add_records_accepted(7);
        metrics.inc_records_discarded();
        metrics.inc_records_discarded();
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                batches_dispatched: 3,
                batches_failed: 1,
                records_accepted: 7,
                records_discarded: 2,
            }
        );
        metrics.flush();
    }
}
