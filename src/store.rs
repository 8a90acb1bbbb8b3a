//! Underlying keyed store.
//!
//! The cache treats its store as a black box that may evict entries on
//! its own (capacity pressure or expiration). [`EntryStore`] is the
//! contract; [`MemoryStore`] is the bundled implementation, an LRU with a
//! per-entry TTL. Store-initiated removals are reported through the
//! registered removal listener so the orchestrator can keep its tracker,
//! tag index, and metrics consistent. Explicit `remove` calls do NOT fire
//! the listener: the caller initiated those and runs its own cleanup.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::lock::{rw_read, rw_write};

/// Why the store removed an entry on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Pushed out by the store's own capacity policy.
    Capacity,
    /// The entry's lifetime elapsed.
    Expired,
}

/// Callback invoked when the store evicts an entry it owns.
pub type RemovalListener = Arc<dyn Fn(&str, &CacheEntry, RemovalCause) + Send + Sync>;

/// Keyed store holding opaque cache entries.
pub trait EntryStore: Send + Sync {
    /// Look up an entry. Expired entries are treated as absent.
    fn get(&self, key: &str) -> Option<Arc<CacheEntry>>;

    /// Insert or replace the entry under `key` with the given lifetime.
    fn insert(&self, key: String, entry: CacheEntry, ttl: Duration);

    /// Remove the entry under `key`, returning it. Does not fire the
    /// removal listener.
    fn remove(&self, key: &str) -> Option<Arc<CacheEntry>>;

    /// Whether a live (non-expired) entry exists under `key`.
    fn contains(&self, key: &str) -> bool;

    /// Number of entries currently held, including not-yet-collected
    /// expired ones.
    fn len(&self) -> usize;

    /// Drop every entry without firing the removal listener.
    fn clear(&self);

    /// Register the callback for store-initiated evictions.
    fn set_removal_listener(&self, listener: RemovalListener);
}

/// Cap for lifetimes the clock cannot represent; `Instant` arithmetic
/// panics on overflow, and callers may hand us `Duration::MAX`.
const MAX_ENTRY_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

fn deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(MAX_ENTRY_TTL))
        .unwrap_or(now)
}

struct Stored {
    entry: Arc<CacheEntry>,
    expires_at: Instant,
}

/// In-memory [`EntryStore`]: LRU over entry count plus per-entry TTL.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, Stored>>,
    listener: RwLock<Option<RemovalListener>>,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.store_entry_limit_non_zero())),
            listener: RwLock::new(None),
        }
    }

    fn notify(&self, key: &str, entry: &CacheEntry, cause: RemovalCause) {
        let listener = rw_read(&self.listener, "store.notify").clone();
        if let Some(listener) = listener {
            listener(key, entry, cause);
        }
    }
}

impl EntryStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let expired = {
            let mut entries = rw_write(&self.entries, "store.get");
            match entries.get(key) {
                Some(stored) if stored.expires_at > Instant::now() => {
                    return Some(Arc::clone(&stored.entry));
                }
                Some(_) => entries.pop(key),
                None => None,
            }
        };
        // Guard dropped; report the lazy expiry to the listener.
        if let Some(stored) = expired {
            self.notify(key, &stored.entry, RemovalCause::Expired);
        }
        None
    }

    fn insert(&self, key: String, entry: CacheEntry, ttl: Duration) {
        let stored = Stored {
            entry: Arc::new(entry),
            expires_at: deadline(ttl),
        };
        let pushed_out = {
            let mut entries = rw_write(&self.entries, "store.insert");
            entries.push(key.clone(), stored)
        };
        // `push` hands back the displaced pair: either the previous value
        // of the same key (a replacement, the caller's concern) or the
        // LRU victim (a store-initiated eviction).
        if let Some((victim_key, victim)) = pushed_out
            && victim_key != key
        {
            self.notify(&victim_key, &victim.entry, RemovalCause::Capacity);
        }
    }

    fn remove(&self, key: &str) -> Option<Arc<CacheEntry>> {
        rw_write(&self.entries, "store.remove")
            .pop(key)
            .map(|stored| stored.entry)
    }

    fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, "store.contains")
            .peek(key)
            .is_some_and(|stored| stored.expires_at > Instant::now())
    }

    fn len(&self) -> usize {
        rw_read(&self.entries, "store.len").len()
    }

    fn clear(&self) {
        rw_write(&self.entries, "store.clear").clear();
    }

    fn set_removal_listener(&self, listener: RemovalListener) {
        *rw_write(&self.listener, "store.set_listener") = Some(listener);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::codec::Codec;

    fn sample_entry(body: &str) -> CacheEntry {
        CacheEntry {
            payload: Bytes::from(body.to_string()),
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            tags: HashSet::new(),
            codec: Codec::None,
        }
    }

    fn small_store(limit: usize) -> MemoryStore {
        MemoryStore::new(&CacheConfig {
            store_entry_limit: limit,
            ..Default::default()
        })
    }

    #[test]
    fn insert_get_remove_roundtrip() {
        let store = small_store(10);
        store.insert("k1".to_string(), sample_entry("hello"), Duration::from_secs(60));

        let entry = store.get("k1").expect("stored entry");
        assert_eq!(entry.payload, Bytes::from("hello"));
        assert!(store.contains("k1"));

        let removed = store.remove("k1").expect("removed entry");
        assert_eq!(removed.payload, Bytes::from("hello"));
        assert!(store.get("k1").is_none());
    }

    #[test]
    fn extreme_ttl_is_clamped_not_panicking() {
        let store = small_store(10);
        store.insert("k1".to_string(), sample_entry("forever"), Duration::MAX);

        assert!(store.contains("k1"));
        assert!(store.get("k1").is_some());
    }

    #[test]
    fn expired_entries_are_absent_and_reported() {
        let store = small_store(10);
        let removals: Arc<Mutex<Vec<(String, RemovalCause)>>> = Arc::default();
        let seen = Arc::clone(&removals);
        store.set_removal_listener(Arc::new(move |key, _, cause| {
            seen.lock().unwrap().push((key.to_string(), cause));
        }));

        store.insert("k1".to_string(), sample_entry("stale"), Duration::from_millis(0));
        assert!(store.get("k1").is_none());

        let removals = removals.lock().unwrap();
        assert_eq!(removals.as_slice(), &[("k1".to_string(), RemovalCause::Expired)]);
    }

    #[test]
    fn lru_pushout_fires_listener_with_capacity_cause() {
        let store = small_store(1);
        let removals: Arc<Mutex<Vec<(String, RemovalCause)>>> = Arc::default();
        let seen = Arc::clone(&removals);
        store.set_removal_listener(Arc::new(move |key, _, cause| {
            seen.lock().unwrap().push((key.to_string(), cause));
        }));

        store.insert("k1".to_string(), sample_entry("one"), Duration::from_secs(60));
        store.insert("k2".to_string(), sample_entry("two"), Duration::from_secs(60));

        assert!(store.get("k1").is_none());
        assert!(store.get("k2").is_some());
        let removals = removals.lock().unwrap();
        assert_eq!(
            removals.as_slice(),
            &[("k1".to_string(), RemovalCause::Capacity)]
        );
    }

    #[test]
    fn same_key_replacement_does_not_fire_listener() {
        let store = small_store(10);
        let removals: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen = Arc::clone(&removals);
        store.set_removal_listener(Arc::new(move |key, _, _| {
            seen.lock().unwrap().push(key.to_string());
        }));

        store.insert("k1".to_string(), sample_entry("old"), Duration::from_secs(60));
        store.insert("k1".to_string(), sample_entry("new"), Duration::from_secs(60));

        assert_eq!(store.get("k1").unwrap().payload, Bytes::from("new"));
        assert!(removals.lock().unwrap().is_empty());
    }

    #[test]
    fn explicit_remove_does_not_fire_listener() {
        let store = small_store(10);
        let removals: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen = Arc::clone(&removals);
        store.set_removal_listener(Arc::new(move |key, _, _| {
            seen.lock().unwrap().push(key.to_string());
        }));

        store.insert("k1".to_string(), sample_entry("x"), Duration::from_secs(60));
        store.remove("k1");

        assert!(removals.lock().unwrap().is_empty());
    }
}
