//! Tag index: invalidation tag to cache-key mapping.
//!
//! A key appears under tag `t` exactly when its entry's tag set contains
//! `t`. When the last key under a tag is removed the tag itself is
//! deleted, never left as a dangling empty set. Single-tag operations are
//! atomic; the orchestrator wraps multi-tag updates in its own critical
//! section.

use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;

pub struct TagIndex {
    tags: DashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self {
            tags: DashMap::new(),
        }
    }

    /// Add `key` under every tag in `tags`, creating tags as needed.
    pub fn add_key_to_tags<'a>(&self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Remove `key` from a tag's set, deleting the tag when it empties.
    pub fn remove_key_from_tag(&self, tag: &str, key: &str) {
        let now_empty = match self.tags.get_mut(tag) {
            Some(mut keys) => {
                keys.remove(key);
                keys.is_empty()
            }
            None => false,
        };
        // The guard above must be dropped before removal to avoid
        // deadlocking on the same shard.
        if now_empty {
            self.tags.remove_if(tag, |_, keys| keys.is_empty());
        }
    }

    /// Keys currently registered under `tag`; empty for unknown tags.
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.tags
            .get(tag)
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Per-tag key counts, ordered by tag name for stable reporting.
    pub fn per_tag_counts(&self) -> BTreeMap<String, usize> {
        self.tags
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    pub fn clear(&self) {
        self.tags.clear();
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn add_and_lookup() {
        let index = TagIndex::new();
        index.add_key_to_tags("k1", &tags(&["reports", "daily"]));

        assert!(index.keys_for_tag("reports").contains("k1"));
        assert!(index.keys_for_tag("daily").contains("k1"));
        assert_eq!(index.tag_count(), 2);
    }

    #[test]
    fn unknown_tag_yields_empty_set() {
        let index = TagIndex::new();
        assert!(index.keys_for_tag("nope").is_empty());
    }

    #[test]
    fn removing_last_key_deletes_the_tag() {
        let index = TagIndex::new();
        index.add_key_to_tags("k1", &tags(&["reports"]));
        index.add_key_to_tags("k2", &tags(&["reports"]));

        index.remove_key_from_tag("reports", "k1");
        assert_eq!(index.keys_for_tag("reports").len(), 1);
        assert_eq!(index.tag_count(), 1);

        index.remove_key_from_tag("reports", "k2");
        assert!(index.keys_for_tag("reports").is_empty());
        assert_eq!(index.tag_count(), 0);
    }

    #[test]
    fn remove_from_unknown_tag_is_noop() {
        let index = TagIndex::new();
        index.remove_key_from_tag("reports", "k1");
        assert_eq!(index.tag_count(), 0);
    }

    #[test]
    fn per_tag_counts_reports_sizes() {
        let index = TagIndex::new();
        index.add_key_to_tags("k1", &tags(&["a", "b"]));
        index.add_key_to_tags("k2", &tags(&["a"]));

        let counts = index.per_tag_counts();
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("b"), Some(&1));
    }

    #[test]
    fn clear_removes_everything() {
        let index = TagIndex::new();
        index.add_key_to_tags("k1", &tags(&["a"]));
        index.clear();
        assert_eq!(index.tag_count(), 0);
    }
}
