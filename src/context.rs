//! Shared cache context.
//!
//! One `CacheContext` per installation, constructed at startup and handed
//! to the middleware by reference; there is no hidden global state. The
//! context owns the store, the size tracker, the single tag index (read
//! both by eviction and by reporting), the metrics, and the two exclusive
//! sections described in the concurrency notes on each method.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::codec::{self, Codec};
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EvictionCause};
use crate::lock::mutex_lock;
use crate::metrics::{CacheMetrics, CacheReport};
use crate::store::{EntryStore, MemoryStore, RemovalCause};
use crate::tags::TagIndex;
use crate::tracker::SizeTracker;

pub struct CacheContext {
    config: CacheConfig,
    store: Arc<dyn EntryStore>,
    tracker: SizeTracker,
    tags: TagIndex,
    metrics: CacheMetrics,
    /// Exclusive section for the capacity check → sweep → insert → tag
    /// registration sequence, shared with explicit single-key eviction.
    mutation: Mutex<()>,
    /// Narrower section for standalone tag-based eviction, so bulk
    /// invalidation does not serialize behind an in-flight store.
    tag_mutation: Mutex<()>,
}

impl CacheContext {
    /// Build a context backed by the bundled [`MemoryStore`].
    pub fn new(config: CacheConfig) -> Arc<Self> {
        let store = Arc::new(MemoryStore::new(&config));
        Self::with_store(config, store)
    }

    /// Build a context over a caller-provided store. The store's removal
    /// listener is replaced so its reactive evictions clean up tracker,
    /// tags, and metrics exactly like an orchestrator-initiated removal.
    pub fn with_store(config: CacheConfig, store: Arc<dyn EntryStore>) -> Arc<Self> {
        let context = Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener = {
                let weak = weak.clone();
                Arc::new(move |key: &str, entry: &CacheEntry, cause: RemovalCause| {
                    if let Some(context) = weak.upgrade() {
                        context.on_store_removal(key, entry, cause);
                    }
                })
            };
            store.set_removal_listener(listener);
            Self {
                config,
                store,
                tracker: SizeTracker::new(),
                tags: TagIndex::new(),
                metrics: CacheMetrics::new(),
                mutation: Mutex::new(()),
                tag_mutation: Mutex::new(()),
            }
        });
        context
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    pub fn tracker(&self) -> &SizeTracker {
        &self.tracker
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Store a captured response under `key`.
    ///
    /// Runs the whole sequence under the mutation section: drop any
    /// previous entry for the key, compress, insert with the reactive
    /// listener already wired, track, count, register tags. `size_bytes`
    /// is the uncompressed body length the caller passed to
    /// [`ensure_space`](Self::ensure_space); tracking the same number
    /// keeps the aggregate size counter exact regardless of codec.
    pub fn store_entry(
        &self,
        key: &str,
        headers: Vec<(String, String)>,
        body: &Bytes,
        tags: HashSet<String>,
        ttl: Duration,
    ) {
        let _guard = mutex_lock(&self.mutation, "context.store_entry");

        self.drop_previous(key);

        let requested = if self.config.compression_enabled {
            self.config.compression_codec
        } else {
            Codec::None
        };
        let (payload, codec) = match codec::compress(requested, body) {
            Ok(compressed) => (Bytes::from(compressed), requested),
            Err(err) => {
                // Best effort: fall back to the raw body.
                warn!(key, error = %err, "compression failed, storing uncompressed");
                (body.clone(), Codec::None)
            }
        };

        let entry = CacheEntry {
            payload,
            headers,
            tags: tags.clone(),
            codec,
        };
        self.store.insert(key.to_string(), entry, ttl);
        self.tracker.track(key, body.len() as u64);
        self.metrics.add_entry(body.len() as u64);
        self.tags.add_key_to_tags(key, &tags);

        if !self.config.suppress_logs {
            debug!(
                key,
                size_bytes = body.len(),
                codec = ?codec,
                tag_count = tags.len(),
                "stored response"
            );
        }
    }

    /// Explicit eviction entry point for the middleware. With tags, every
    /// key under each tag is purged (under the tag section); without, the
    /// single computed key is purged (under the mutation section). Absent
    /// keys and unknown tags are silent no-ops.
    pub fn evict(&self, key: &str, tags: Option<&[String]>) {
        match tags {
            Some(tags) if !tags.is_empty() => {
                let _guard = mutex_lock(&self.tag_mutation, "context.evict_tags");
                for tag in tags {
                    let keys = self.tags.keys_for_tag(tag);
                    for key in &keys {
                        self.purge(key, EvictionCause::ExplicitTag);
                    }
                    if !self.config.suppress_logs && !keys.is_empty() {
                        info!(tag, evicted = keys.len(), "evicted cache entries by tag");
                    }
                }
            }
            _ => {
                let _guard = mutex_lock(&self.mutation, "context.evict_key");
                self.purge(key, EvictionCause::ExplicitKey);
            }
        }
    }

    /// Remove `key` everywhere: store, tracker, tag index, metrics.
    ///
    /// The one cleanup routine shared by all eviction paths; callers hold
    /// the appropriate exclusive section. Idempotent: purging an absent
    /// key touches nothing and counts nothing.
    pub(crate) fn purge(&self, key: &str, cause: EvictionCause) {
        let entry = self.store.remove(key);
        let existed = entry.is_some();
        self.finish_removal(key, entry.as_deref(), cause, existed);
    }

    /// Reactive path: the store already dropped the entry, only the
    /// bookkeeping is left. Runs either inside a writer's mutation
    /// section (LRU push-out happens only during insert) or on the read
    /// path for lazy expiry, where every touched structure is
    /// individually synchronized and idempotent.
    fn on_store_removal(&self, key: &str, entry: &CacheEntry, cause: RemovalCause) {
        self.finish_removal(key, Some(entry), EvictionCause::StoreReactive, true);
        if !self.config.suppress_logs {
            debug!(key, cause = ?cause, "store-initiated eviction cleaned up");
        }
    }

    fn finish_removal(
        &self,
        key: &str,
        entry: Option<&CacheEntry>,
        cause: EvictionCause,
        existed: bool,
    ) {
        let meta = self.tracker.untrack(key);
        if let Some(meta) = meta {
            self.metrics.subtract_entry(meta.size_bytes);
        }
        if let Some(entry) = entry {
            for tag in &entry.tags {
                self.tags.remove_key_from_tag(tag, key);
            }
        }
        if !existed && meta.is_none() {
            return;
        }
        match cause {
            EvictionCause::Capacity | EvictionCause::StoreReactive => {
                self.metrics.record_capacity_eviction();
            }
            EvictionCause::ExplicitKey | EvictionCause::ExplicitTag => {
                self.metrics.record_explicit_eviction();
            }
        }
        if !self.config.suppress_logs && matches!(cause, EvictionCause::ExplicitKey) {
            debug!(key, cause = %cause, "evicted cache entry");
        }
    }

    /// A re-store replaces the previous entry wholesale; unwind its
    /// accounting without counting an eviction. Caller holds the
    /// mutation section.
    fn drop_previous(&self, key: &str) {
        if let Some(previous) = self.store.remove(key) {
            if let Some(meta) = self.tracker.untrack(key) {
                self.metrics.subtract_entry(meta.size_bytes);
            }
            for tag in &previous.tags {
                self.tags.remove_key_from_tag(tag, key);
            }
        }
    }

    /// Observability snapshot: counters plus the per-tag key counts read
    /// from the one tag index.
    pub fn report(&self) -> CacheReport {
        CacheReport::collect(&self.metrics, self.tags.per_tag_counts())
    }

    /// Drop every entry and reset all bookkeeping together.
    pub fn clear(&self) {
        let _guard = mutex_lock(&self.mutation, "context.clear");
        self.store.clear();
        self.tracker.clear();
        self.tags.clear();
        self.metrics.clear();
    }

    pub(crate) fn mutation_lock(&self) -> &Mutex<()> {
        &self.mutation
    }
}
