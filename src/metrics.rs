//! Thread-safe cache counters and the observability report.
//!
//! Counters are plain atomics read by the report endpoint; every movement
//! is also mirrored into the `metrics` facade so an installed exporter
//! sees the same numbers. Descriptions live in [`crate::telemetry`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use serde::Serialize;

pub(crate) const METRIC_HIT_TOTAL: &str = "cachet_cache_hit_total";
pub(crate) const METRIC_MISS_TOTAL: &str = "cachet_cache_miss_total";
pub(crate) const METRIC_EVICT_CAPACITY_TOTAL: &str = "cachet_cache_evict_capacity_total";
pub(crate) const METRIC_EVICT_EXPLICIT_TOTAL: &str = "cachet_cache_evict_explicit_total";
pub(crate) const METRIC_SKIP_OVERSIZE_TOTAL: &str = "cachet_cache_skip_oversize_total";
pub(crate) const METRIC_SIZE_BYTES: &str = "cachet_cache_size_bytes";
pub(crate) const METRIC_ENTRIES: &str = "cachet_cache_entries";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Aggregate cache counters, safe for concurrent callers.
///
/// Per-counter synchronization only; cross-counter atomicity is provided
/// by the orchestrator's exclusive section where it matters.
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    current_size: AtomicU64,
    entry_count: AtomicU64,
    evicted_by_capacity: AtomicU64,
    evicted_by_explicit_removal: AtomicU64,
    skipped_due_to_size: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            current_size: AtomicU64::new(0),
            entry_count: AtomicU64::new(0),
            evicted_by_capacity: AtomicU64::new(0),
            evicted_by_explicit_removal: AtomicU64::new(0),
            skipped_due_to_size: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_HIT_TOTAL).increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_MISS_TOTAL).increment(1);
    }

    pub fn record_capacity_eviction(&self) {
        self.evicted_by_capacity.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_EVICT_CAPACITY_TOTAL).increment(1);
    }

    pub fn record_explicit_eviction(&self) {
        self.evicted_by_explicit_removal
            .fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_EVICT_EXPLICIT_TOTAL).increment(1);
    }

    pub fn record_skip_due_to_size(&self) {
        self.skipped_due_to_size.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_SKIP_OVERSIZE_TOTAL).increment(1);
    }

    /// Account a newly stored entry.
    pub fn add_entry(&self, size_bytes: u64) {
        let size = self.current_size.fetch_add(size_bytes, Ordering::Relaxed) + size_bytes;
        let count = self.entry_count.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!(METRIC_SIZE_BYTES).set(size as f64);
        gauge!(METRIC_ENTRIES).set(count as f64);
    }

    /// Account a removed entry. Clamps at zero rather than wrapping.
    pub fn subtract_entry(&self, size_bytes: u64) {
        let size = saturating_sub(&self.current_size, size_bytes);
        let count = saturating_sub(&self.entry_count, 1);
        gauge!(METRIC_SIZE_BYTES).set(size as f64);
        gauge!(METRIC_ENTRIES).set(count as f64);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn evicted_by_capacity(&self) -> u64 {
        self.evicted_by_capacity.load(Ordering::Relaxed)
    }

    pub fn evicted_by_explicit_removal(&self) -> u64 {
        self.evicted_by_explicit_removal.load(Ordering::Relaxed)
    }

    pub fn skipped_due_to_size(&self) -> u64 {
        self.skipped_due_to_size.load(Ordering::Relaxed)
    }

    /// Reset every counter.
    pub fn clear(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.current_size.store(0, Ordering::Relaxed);
        self.entry_count.store(0, Ordering::Relaxed);
        self.evicted_by_capacity.store(0, Ordering::Relaxed);
        self.evicted_by_explicit_removal.store(0, Ordering::Relaxed);
        self.skipped_due_to_size.store(0, Ordering::Relaxed);
        gauge!(METRIC_SIZE_BYTES).set(0.0);
        gauge!(METRIC_ENTRIES).set(0.0);
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_sub(counter: &AtomicU64, amount: u64) -> u64 {
    let mut current = counter.load(Ordering::Relaxed);
    loop {
        let next = current.saturating_sub(amount);
        match counter.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => current = observed,
        }
    }
}

/// Point-in-time observability snapshot, served as JSON by
/// [`cache_report_handler`](crate::cache_report_handler).
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub entry_count: u64,
    pub evicted_by_capacity: u64,
    pub evicted_by_explicit_removal: u64,
    pub skipped_due_to_size: u64,
    pub tag_count: usize,
    pub tags: BTreeMap<String, usize>,
}

impl CacheReport {
    pub(crate) fn collect(metrics: &CacheMetrics, tags: BTreeMap<String, usize>) -> Self {
        let hits = metrics.hits();
        let misses = metrics.misses();
        let total = hits + misses;
        let size_bytes = metrics.current_size();
        Self {
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            size_bytes,
            size_mb: size_bytes as f64 / BYTES_PER_MB,
            entry_count: metrics.entry_count(),
            evicted_by_capacity: metrics.evicted_by_capacity(),
            evicted_by_explicit_removal: metrics.evicted_by_explicit_removal(),
            skipped_due_to_size: metrics.skipped_due_to_size(),
            tag_count: tags.len(),
            tags,
        }
    }
}
