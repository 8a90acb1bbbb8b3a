//! Poison-recovering lock helpers.
//!
//! A panic in one request task must not wedge the cache for the rest of
//! the process, so every acquisition recovers from poisoning and logs the
//! call site that observed it. `site` is a short `component.operation`
//! label, unique per acquisition.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn note_poisoned(site: &'static str, kind: &'static str) {
    warn!(site, kind, "recovered from poisoned cache lock");
}

pub(crate) fn rw_read<'a, T>(lock: &'a RwLock<T>, site: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        note_poisoned(site, "read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(lock: &'a RwLock<T>, site: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        note_poisoned(site, "write");
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(lock: &'a Mutex<T>, site: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        note_poisoned(site, "mutex");
        poisoned.into_inner()
    })
}
