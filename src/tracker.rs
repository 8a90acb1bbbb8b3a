//! Size accountant.
//!
//! Tracks per-key payload size and creation time so capacity eviction can
//! walk entries oldest-first. The aggregate size counter itself lives in
//! [`CacheMetrics`](crate::CacheMetrics); outside a mutation's critical
//! section the sum of tracked sizes equals that counter.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use crate::lock::{rw_read, rw_write};

/// Per-key accounting record, created and destroyed with its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedMetadata {
    pub size_bytes: u64,
    pub created_at: Instant,
}

/// Tracks byte size and age for every stored entry.
pub struct SizeTracker {
    entries: RwLock<HashMap<String, TrackedMetadata>>,
}

impl SizeTracker {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert metadata for `key` with the current timestamp. Overwriting
    /// an existing key resets its eviction priority.
    pub fn track(&self, key: &str, size_bytes: u64) {
        rw_write(&self.entries, "tracker.track").insert(
            key.to_string(),
            TrackedMetadata {
                size_bytes,
                created_at: Instant::now(),
            },
        );
    }

    /// Remove metadata for `key`, returning it. No-op on absence.
    pub fn untrack(&self, key: &str) -> Option<TrackedMetadata> {
        rw_write(&self.entries, "tracker.untrack").remove(key)
    }

    /// Immutable copy of all records, ordered by ascending `created_at`,
    /// so an eviction sweep is not corrupted by concurrent mutations.
    pub fn snapshot(&self) -> Vec<(String, TrackedMetadata)> {
        let mut entries: Vec<(String, TrackedMetadata)> = rw_read(&self.entries, "tracker.snapshot")
            .iter()
            .map(|(key, meta)| (key.clone(), *meta))
            .collect();
        entries.sort_by_key(|(_, meta)| meta.created_at);
        entries
    }

    /// Sum of all tracked sizes.
    pub fn total_bytes(&self) -> u64 {
        rw_read(&self.entries, "tracker.total_bytes")
            .values()
            .map(|meta| meta.size_bytes)
            .sum()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, "tracker.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, "tracker.clear").clear();
    }
}

impl Default for SizeTracker {
    fn default() -> Self {
        Self::new()
    }
}
