//! Capacity policy: decide whether a new entry fits and make room for it.

use tracing::debug;

use crate::context::CacheContext;
use crate::entry::EvictionCause;
use crate::lock::mutex_lock;

impl CacheContext {
    /// Ensure `required_bytes` fit inside the byte budget, evicting the
    /// oldest entries if needed. Returns false when the item cannot be
    /// cached; the cache stays valid either way.
    ///
    /// The size check is deliberately lock-free; only the slow path takes
    /// the mutation section and re-validates its premise after acquiring
    /// it, since another writer may have freed or consumed space in
    /// between.
    pub fn ensure_space(&self, required_bytes: u64) -> bool {
        let max = self.config().max_cache_size_bytes;

        // An item that can never fit must never trigger eviction of
        // everything else.
        if required_bytes > max {
            self.metrics().record_skip_due_to_size();
            if !self.config().suppress_logs {
                debug!(
                    required_bytes,
                    max_cache_size_bytes = max,
                    "item exceeds cache budget, skipping"
                );
            }
            return false;
        }

        if self.metrics().current_size() + required_bytes <= max {
            return true;
        }

        let _guard = mutex_lock(self.mutation_lock(), "evict.ensure_space");

        let current = self.metrics().current_size();
        if current + required_bytes <= max {
            return true;
        }

        let space_to_free = current + required_bytes - max;
        let mut freed = 0u64;
        for (key, meta) in self.tracker().snapshot() {
            // Entries the store already dropped were cleaned up by the
            // reactive path; skip them.
            if !self.store().contains(&key) {
                continue;
            }
            self.purge(&key, EvictionCause::Capacity);
            freed += meta.size_bytes;
            if freed >= space_to_free {
                if !self.config().suppress_logs {
                    debug!(freed, space_to_free, "made room by capacity eviction");
                }
                return true;
            }
        }

        // Snapshot exhausted without enough room; the caller skips
        // caching this item.
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use bytes::Bytes;

    use crate::config::CacheConfig;

    use super::*;

    fn budget_context(max: u64) -> std::sync::Arc<CacheContext> {
        CacheContext::new(CacheConfig {
            max_cache_size_bytes: max,
            compression_enabled: false,
            suppress_logs: true,
            ..Default::default()
        })
    }

    fn store(ctx: &CacheContext, key: &str, bytes: usize) {
        ctx.store_entry(
            key,
            Vec::new(),
            &Bytes::from(vec![b'x'; bytes]),
            HashSet::new(),
            Duration::from_secs(60),
        );
    }

    #[test]
    fn fits_without_eviction() {
        let ctx = budget_context(100);
        assert!(ctx.ensure_space(100));
        assert_eq!(ctx.metrics().evicted_by_capacity(), 0);
    }

    #[test]
    fn oversized_item_is_rejected_without_evicting() {
        let ctx = budget_context(100);
        store(&ctx, "k1", 40);

        assert!(!ctx.ensure_space(101));
        assert!(ctx.store().contains("k1"));
        assert_eq!(ctx.metrics().skipped_due_to_size(), 1);
        assert_eq!(ctx.metrics().evicted_by_capacity(), 0);
    }

    #[test]
    fn capacity_squeeze_evicts_oldest_first() {
        let ctx = budget_context(100);
        store(&ctx, "k1", 40);
        std::thread::sleep(Duration::from_millis(20));
        store(&ctx, "k2", 40);

        assert!(ctx.ensure_space(50));
        store(&ctx, "k3", 50);

        assert!(!ctx.store().contains("k1"));
        assert!(ctx.store().contains("k2"));
        assert!(ctx.store().contains("k3"));
        assert!(ctx.metrics().evicted_by_capacity() >= 1);
        assert!(ctx.metrics().current_size() <= 100);
    }

    #[test]
    fn sweep_frees_multiple_entries_when_needed() {
        let ctx = budget_context(100);
        store(&ctx, "k1", 40);
        std::thread::sleep(Duration::from_millis(5));
        store(&ctx, "k2", 40);
        std::thread::sleep(Duration::from_millis(5));
        store(&ctx, "k3", 20);

        // Needs 80 bytes free: both 40-byte entries must go.
        assert!(ctx.ensure_space(80));
        assert!(!ctx.store().contains("k1"));
        assert!(!ctx.store().contains("k2"));
        assert!(ctx.store().contains("k3"));
        assert_eq!(ctx.metrics().evicted_by_capacity(), 2);
    }

    #[test]
    fn size_invariant_holds_after_sweep() {
        let ctx = budget_context(100);
        store(&ctx, "k1", 60);
        std::thread::sleep(Duration::from_millis(5));
        store(&ctx, "k2", 30);

        assert!(ctx.ensure_space(80));
        assert_eq!(ctx.tracker().total_bytes(), ctx.metrics().current_size());
    }
}
