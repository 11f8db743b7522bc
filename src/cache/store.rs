//! Cache Store Module
//!
//! Entry map combined with the LRU index, the tag index and byte-size
//! accounting. The store itself is not synchronized; the engine wraps it in a
//! lock so every mutation below is applied as one unit.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::cache::{CacheEntry, HotKey, LruIndex, TagIndex};
use crate::error::{CacheError, Result};

// == Insert Outcome ==
/// What an insert did besides storing the entry.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Keys evicted to make room, oldest first
    pub evicted: Vec<String>,
    /// An entry under the same key was replaced
    pub replaced: bool,
    /// False when the entry alone is larger than the capacity
    pub stored: bool,
}

// == Cache Store ==
/// Bounded entry storage.
///
/// Invariants after every public method returns:
/// - `total_size_bytes` equals the summed `size_bytes` of all entries
/// - `total_size_bytes <= capacity_bytes`
/// - the LRU index holds exactly the stored keys
/// - the tag index maps each tag to exactly the keys whose entry lists it
#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    lru: LruIndex,
    tags: TagIndex,
    total_size_bytes: usize,
    capacity_bytes: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store bounded to `capacity_bytes`.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruIndex::new(),
            tags: TagIndex::new(),
            total_size_bytes: 0,
            capacity_bytes,
        }
    }

    // == Insert ==
    /// Inserts or replaces an entry.
    ///
    /// An existing entry under the same key is removed first, old tags
    /// included. Least recently used entries are then evicted until the new
    /// entry fits. If it cannot fit even in an empty store it is not stored
    /// and `stored` is false.
    pub fn insert(&mut self, entry: CacheEntry) -> Result<InsertOutcome> {
        let replaced = self.remove(&entry.key).is_some();
        let evicted = self.make_room(entry.size_bytes);

        if self.total_size_bytes + entry.size_bytes > self.capacity_bytes {
            if !self.entries.is_empty() {
                return Err(CacheError::Capacity(format!(
                    "{} bytes in {} entries left after eviction, cannot fit {} of {} bytes",
                    self.total_size_bytes,
                    self.entries.len(),
                    entry.size_bytes,
                    self.capacity_bytes
                )));
            }
            return Ok(InsertOutcome {
                evicted,
                replaced,
                stored: false,
            });
        }

        self.tags.link(&entry.key, &entry.tags);
        self.lru
            .touch(&entry.key, entry.last_accessed_at, entry.priority);
        self.total_size_bytes += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);

        Ok(InsertOutcome {
            evicted,
            replaced,
            stored: true,
        })
    }

    // == Make Room ==
    /// Evicts least recently used entries until `incoming` more bytes fit or
    /// the store is empty.
    fn make_room(&mut self, incoming: usize) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.total_size_bytes + incoming > self.capacity_bytes {
            let Some(key) = self.lru.evict_oldest() else {
                break;
            };
            if self.remove(&key).is_some() {
                debug!("Evicted '{}' to free space for {} bytes", key, incoming);
                evicted.push(key);
            }
        }
        evicted
    }

    // == Peek ==
    /// Returns an entry without recording an access, expired or not.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Touch ==
    /// Records a successful read of `key` at `now`.
    pub fn touch(&mut self, key: &str, now: u64) -> Option<&CacheEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.record_access(now);
        self.lru.touch(key, now, entry.priority);
        Some(entry)
    }

    // == Remove ==
    /// Removes an entry and its tag associations.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.tags.unlink(key, &entry.tags);
        self.total_size_bytes -= entry.size_bytes;
        Some(entry)
    }

    // == Invalidate By Tags ==
    /// Removes every entry carrying any of `tags`; returns the removed keys.
    pub fn invalidate_tags<'a, I>(&mut self, tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keys = self.tags.keys_for_any(tags);
        keys.into_iter()
            .filter(|key| self.remove(key).is_some())
            .collect()
    }

    // == Purge Expired ==
    /// Removes all entries expired at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        expired_keys
            .iter()
            .filter(|key| self.remove(key).is_some())
            .count()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.tags.clear();
        self.total_size_bytes = 0;
    }

    // == Hot Keys ==
    /// Up to `limit` keys with the most hits, most hit first.
    pub fn hot_keys(&self, limit: usize) -> Vec<HotKey> {
        let mut hot: Vec<HotKey> = self
            .entries
            .values()
            .filter(|entry| entry.hit_count > 0)
            .map(|entry| HotKey {
                key: entry.key.clone(),
                hit_count: entry.hit_count,
            })
            .collect();
        hot.sort_by(|a, b| b.hit_count.cmp(&a.hit_count).then_with(|| a.key.cmp(&b.key)));
        hot.truncate(limit);
        hot
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size_bytes(&self) -> usize {
        self.total_size_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    /// Verifies the store invariants, describing the first violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let summed: usize = self.entries.values().map(|e| e.size_bytes).sum();
        if summed != self.total_size_bytes {
            return Err(format!(
                "size total {} != summed entry sizes {}",
                self.total_size_bytes, summed
            ));
        }
        if self.total_size_bytes > self.capacity_bytes {
            return Err(format!(
                "size total {} exceeds capacity {}",
                self.total_size_bytes, self.capacity_bytes
            ));
        }
        if self.lru.len() != self.entries.len() {
            return Err(format!(
                "lru tracks {} keys, store holds {}",
                self.lru.len(),
                self.entries.len()
            ));
        }
        let mut expected: HashMap<&str, HashSet<&str>> = HashMap::new();
        for entry in self.entries.values() {
            if !self.lru.contains(&entry.key) {
                return Err(format!("'{}' missing from lru index", entry.key));
            }
            for tag in &entry.tags {
                expected.entry(tag.as_str()).or_default().insert(entry.key.as_str());
            }
        }
        if expected.len() != self.tags.tag_count() {
            return Err(format!(
                "tag index holds {} tags, entries list {}",
                self.tags.tag_count(),
                expected.len()
            ));
        }
        for (tag, keys) in self.tags.iter() {
            let matches = expected.get(tag.as_str()).is_some_and(|want| {
                want.len() == keys.len() && keys.iter().all(|key| want.contains(key.as_str()))
            });
            if !matches {
                return Err(format!("tag '{}' out of sync with entries", tag));
            }
        }
        Ok(())
    }

    /// Shifts an entry's timestamps into the past.
    #[cfg(test)]
    pub(crate) fn backdate(&mut self, key: &str, by_ms: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.created_at = entry.created_at.saturating_sub(by_ms);
            entry.last_accessed_at = entry.last_accessed_at.saturating_sub(by_ms);
            let (accessed, priority) = (entry.last_accessed_at, entry.priority);
            self.lru.touch(key, accessed, priority);
        }
    }
}
