//! Cache entry and eviction cause definitions.

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;

use crate::codec::Codec;

/// A stored response. Immutable once created; a re-store replaces the
/// entry wholesale, it is never patched in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Response body, possibly compressed per `codec`.
    pub payload: Bytes,
    /// Allow-listed subset of the origin response headers, in order.
    pub headers: Vec<(String, String)>,
    /// Invalidation labels attached at store time.
    pub tags: HashSet<String>,
    /// How `payload` must be decoded before serving.
    pub codec: Codec,
}

/// Why an entry left the cache.
///
/// Every removal path funnels through the same cleanup routine carrying
/// one of these, so tracker, tag index, and metrics stay consistent no
/// matter which path fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// Explicit single-key eviction requested by a caller.
    ExplicitKey,
    /// Bulk eviction through an invalidation tag.
    ExplicitTag,
    /// Removed to make room for a new entry.
    Capacity,
    /// The underlying store removed the entry on its own.
    StoreReactive,
}

impl EvictionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitKey => "explicit_key",
            Self::ExplicitTag => "explicit_tag",
            Self::Capacity => "capacity",
            Self::StoreReactive => "store_reactive",
        }
    }
}

impl fmt::Display for EvictionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
