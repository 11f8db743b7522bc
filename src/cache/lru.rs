//! LRU Index Module
//!
//! Orders keys by last access time for eviction, breaking exact ties by
//! priority.

use std::collections::{BTreeMap, HashMap};

use crate::cache::Priority;

/// Position of a key in the eviction order. Tuples sort oldest first; among
/// equal timestamps `Low` sorts before `Medium` before `High`, then by
/// insertion sequence.
type Slot = (u64, Priority, u64);

// == LRU Index ==
/// Tracks access order for LRU eviction.
///
/// The first slot of `order` is the next eviction victim.
#[derive(Debug, Default)]
pub struct LruIndex {
    order: BTreeMap<Slot, String>,
    slots: HashMap<String, Slot>,
    seq: u64,
}

impl LruIndex {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Records an access to `key` at `accessed_at`, inserting it if new.
    pub fn touch(&mut self, key: &str, accessed_at: u64, priority: Priority) {
        self.remove(key);
        self.seq += 1;
        let slot = (accessed_at, priority, self.seq);
        self.order.insert(slot, key.to_string());
        self.slots.insert(key.to_string(), slot);
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(slot) = self.slots.remove(key) {
            self.order.remove(&slot);
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if the index is empty.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.slots.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.first_key_value().map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.slots.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_new() {
        let lru = LruIndex::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn test_lru_oldest_by_timestamp() {
        let mut lru = LruIndex::new();

        lru.touch("key1", 10, Priority::High);
        lru.touch("key2", 20, Priority::Low);
        lru.touch("key3", 30, Priority::Low);

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&"key1".to_string()));
    }

    #[test]
    fn test_lru_touch_existing_key() {
        let mut lru = LruIndex::new();

        lru.touch("key1", 10, Priority::Medium);
        lru.touch("key2", 20, Priority::Medium);
        lru.touch("key3", 30, Priority::Medium);

        // Touch key1 again - should move to the back of the eviction order
        lru.touch("key1", 40, Priority::Medium);

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&"key2".to_string()));
    }

    #[test]
    fn test_lru_evict_oldest() {
        let mut lru = LruIndex::new();

        lru.touch("key1", 1, Priority::Medium);
        lru.touch("key2", 2, Priority::Medium);
        lru.touch("key3", 3, Priority::Medium);

        assert_eq!(lru.evict_oldest(), Some("key1".to_string()));
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.evict_oldest(), Some("key2".to_string()));
        assert_eq!(lru.len(), 1);
        assert!(!lru.contains("key1"));
    }

    #[test]
    fn test_lru_evict_empty() {
        let mut lru = LruIndex::new();
        assert_eq!(lru.evict_oldest(), None);
    }

    #[test]
    fn test_priority_breaks_timestamp_ties() {
        let mut lru = LruIndex::new();

        lru.touch("high", 100, Priority::High);
        lru.touch("low", 100, Priority::Low);
        lru.touch("medium", 100, Priority::Medium);

        assert_eq!(lru.evict_oldest(), Some("low".to_string()));
        assert_eq!(lru.evict_oldest(), Some("medium".to_string()));
        assert_eq!(lru.evict_oldest(), Some("high".to_string()));
    }

    #[test]
    fn test_priority_does_not_override_recency() {
        let mut lru = LruIndex::new();

        lru.touch("old-high", 1, Priority::High);
        lru.touch("new-low", 2, Priority::Low);

        assert_eq!(lru.evict_oldest(), Some("old-high".to_string()));
    }

    #[test]
    fn test_equal_ties_fall_back_to_insertion_order() {
        let mut lru = LruIndex::new();

        lru.touch("a", 5, Priority::Low);
        lru.touch("b", 5, Priority::Low);

        assert_eq!(lru.evict_oldest(), Some("a".to_string()));
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruIndex::new();

        lru.touch("key1", 1, Priority::Low);
        lru.touch("key2", 2, Priority::Low);
        lru.touch("key3", 3, Priority::Low);

        lru.remove("key2");
        lru.remove("nonexistent");

        assert_eq!(lru.len(), 2);
        assert!(!lru.contains("key2"));
        assert!(lru.contains("key1"));
        assert!(lru.contains("key3"));
    }

    #[test]
    fn test_lru_touch_same_key_multiple_times() {
        let mut lru = LruIndex::new();

        lru.touch("key1", 1, Priority::Low);
        lru.touch("key1", 2, Priority::Low);
        lru.touch("key1", 3, Priority::Low);

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.evict_oldest(), Some("key1".to_string()));
        assert!(lru.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut lru = LruIndex::new();
        lru.touch("a", 1, Priority::Low);
        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.peek_oldest(), None);
    }
}
