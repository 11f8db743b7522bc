//! Tag Index Module
//!
//! Maps tags to the keys carrying them so bulk invalidation touches only the
//! affected entries.

use std::collections::{BTreeSet, HashMap, HashSet};

// == Tag Index ==
/// Reverse index tag -> keys.
///
/// Kept in lockstep with the entry map by [`CacheStore`](crate::cache::CacheStore):
/// a key appears under a tag exactly when its entry lists that tag. Tags with
/// no keys are dropped.
#[derive(Debug, Default)]
pub struct TagIndex {
    keys_by_tag: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `key` with each of `tags`.
    pub fn link(&mut self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            self.keys_by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Removes the association of `key` with each of `tags`.
    pub fn unlink(&mut self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            if let Some(keys) = self.keys_by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.keys_by_tag.remove(tag);
                }
            }
        }
    }

    /// Distinct keys carrying any of `tags`.
    pub fn keys_for_any<'a, I>(&self, tags: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        tags.into_iter()
            .filter_map(|tag| self.keys_by_tag.get(tag))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn keys_for(&self, tag: &str) -> Option<&HashSet<String>> {
        self.keys_by_tag.get(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HashSet<String>)> {
        self.keys_by_tag.iter()
    }

    /// Number of distinct tags currently indexed.
    pub fn tag_count(&self) -> usize {
        self.keys_by_tag.len()
    }

    pub fn clear(&mut self) {
        self.keys_by_tag.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_link_and_lookup() {
        let mut index = TagIndex::new();
        index.link("a", &tags(&["u", "x"]));
        index.link("b", &tags(&["u"]));

        assert_eq!(index.keys_for("u").unwrap().len(), 2);
        assert_eq!(index.keys_for("x").unwrap().len(), 1);
        assert!(index.keys_for("missing").is_none());
    }

    #[test]
    fn test_keys_for_any_deduplicates() {
        let mut index = TagIndex::new();
        index.link("a", &tags(&["u", "x"]));
        index.link("b", &tags(&["u"]));
        index.link("c", &tags(&["y"]));

        let keys = index.keys_for_any(["u", "x", "nope"]);
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("a"));
        assert!(keys.contains("b"));
    }

    #[test]
    fn test_unlink_drops_empty_tags() {
        let mut index = TagIndex::new();
        index.link("a", &tags(&["u"]));
        index.link("b", &tags(&["u"]));

        index.unlink("a", &tags(&["u"]));
        assert_eq!(index.keys_for("u").unwrap().len(), 1);

        index.unlink("b", &tags(&["u"]));
        assert!(index.keys_for("u").is_none());
        assert_eq!(index.tag_count(), 0);
    }

    #[test]
    fn test_unlink_unknown_is_noop() {
        let mut index = TagIndex::new();
        index.link("a", &tags(&["u"]));
        index.unlink("zzz", &tags(&["u", "v"]));
        assert_eq!(index.keys_for("u").unwrap().len(), 1);
    }
}
