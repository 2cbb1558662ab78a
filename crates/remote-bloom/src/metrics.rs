//! Metrics hooks for filter operations
//!
//! Counts and latencies are per process. Filter state itself lives in the
//! store, so nothing here says how full a shared filter is.
//!
//! ## Usage
//!
//! ```ignore
//! use remote_bloom::{BloomFilter, Metrics};
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(Metrics::new());
//! let filter = BloomFilter::new(&ctx, store, "bf", 1000, 0.01)
//!     .await?
//!     .with_metrics(metrics.clone());
//!
//! filter.add(&ctx, "hello").await?;
//! assert_eq!(metrics.snapshot().elements_added, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for filter operations
#[derive(Default)]
pub struct Metrics {
    /// Filters opened by this process
    pub filters_opened: AtomicU64,
    /// Elements added (a batch add counts each element)
    pub elements_added: AtomicU64,
    /// Elements removed
    pub elements_removed: AtomicU64,
    /// Membership tests performed
    pub lookups_performed: AtomicU64,
    /// Membership tests answered true
    pub lookups_positive: AtomicU64,
    /// Operations that failed in the store
    pub store_errors: AtomicU64,
    /// Cumulative add time in nanoseconds
    pub add_time_ns: AtomicU64,
    /// Cumulative lookup time in nanoseconds
    pub lookup_time_ns: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_filter_opened(&self, _size_bits: u64, _hash_count: u32) {
        self.filters_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_add(&self, elements: usize, duration: Duration) {
        self.elements_added
            .fetch_add(elements as u64, Ordering::Relaxed);
        self.add_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.elements_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record lookup operation
    ///
    /// `found` may be a false positive.
    pub fn record_lookup(&self, duration: Duration, found: bool) {
        self.lookups_performed.fetch_add(1, Ordering::Relaxed);
        self.lookup_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        if found {
            self.lookups_positive.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            filters_opened: self.filters_opened.load(Ordering::Relaxed),
            elements_added: self.elements_added.load(Ordering::Relaxed),
            elements_removed: self.elements_removed.load(Ordering::Relaxed),
            lookups_performed: self.lookups_performed.load(Ordering::Relaxed),
            lookups_positive: self.lookups_positive.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            avg_lookup_ns: self.avg_lookup_time_ns(),
        }
    }

    pub fn avg_lookup_time_ns(&self) -> u64 {
        let total = self.lookup_time_ns.load(Ordering::Relaxed);
        let count = self.lookups_performed.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Share of lookups answered true, true and false positives alike
    pub fn observed_positive_rate(&self) -> f64 {
        let total = self.lookups_performed.load(Ordering::Relaxed);
        let positive = self.lookups_positive.load(Ordering::Relaxed);
        if total > 0 {
            positive as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn reset(&self) {
        self.filters_opened.store(0, Ordering::Relaxed);
        self.elements_added.store(0, Ordering::Relaxed);
        self.elements_removed.store(0, Ordering::Relaxed);
        self.lookups_performed.store(0, Ordering::Relaxed);
        self.lookups_positive.store(0, Ordering::Relaxed);
        self.store_errors.store(0, Ordering::Relaxed);
        self.add_time_ns.store(0, Ordering::Relaxed);
        self.lookup_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub filters_opened: u64,
    pub elements_added: u64,
    pub elements_removed: u64,
    pub lookups_performed: u64,
    pub lookups_positive: u64,
    pub store_errors: u64,
    pub avg_lookup_ns: u64,
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to integrate with external metrics systems
/// like Prometheus, StatsD, or OpenTelemetry.
pub trait MetricsRecorder: Send + Sync {
    fn record_filter_opened(&self, size_bits: u64, hash_count: u32);

    fn record_add(&self, elements: usize, duration: Duration);

    fn record_remove(&self);

    fn record_lookup(&self, duration: Duration, found: bool);

    fn record_store_error(&self);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_filter_opened(&self, _: u64, _: u32) {}
    fn record_add(&self, _: usize, _: Duration) {}
    fn record_remove(&self) {}
    fn record_lookup(&self, _: Duration, _: bool) {}
    fn record_store_error(&self) {}
}

impl MetricsRecorder for Metrics {
    fn record_filter_opened(&self, size_bits: u64, hash_count: u32) {
        Metrics::record_filter_opened(self, size_bits, hash_count);
    }

    fn record_add(&self, elements: usize, duration: Duration) {
        Metrics::record_add(self, elements, duration);
    }

    fn record_remove(&self) {
        Metrics::record_remove(self);
    }

    fn record_lookup(&self, duration: Duration, found: bool) {
        Metrics::record_lookup(self, duration, found);
    }

    fn record_store_error(&self) {
        Metrics::record_store_error(self);
    }
}
