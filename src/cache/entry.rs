//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, tag and
//! access metadata.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::{AppliedTransforms, KeyClassPolicy, Priority};

// == Cache Entry ==
/// A stored value together with the metadata driving expiry, eviction and
/// invalidation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    /// Payload after the transform pipeline ran
    pub payload: Arc<[u8]>,
    /// Transforms applied to `payload`
    pub applied: AppliedTransforms,
    /// Time of the last write (Unix milliseconds)
    pub created_at: u64,
    /// TTL copied from the policy at write time
    pub ttl_ms: u64,
    pub tags: BTreeSet<String>,
    pub priority: Priority,
    pub hit_count: u64,
    /// Time of the last successful read, or of the write (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Estimated footprint used for capacity accounting
    pub size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry written at `now` under `policy`.
    pub fn new(
        key: String,
        payload: Vec<u8>,
        applied: AppliedTransforms,
        policy: &KeyClassPolicy,
        now: u64,
    ) -> Self {
        let tags: BTreeSet<String> = policy.tags.iter().cloned().collect();
        let size_bytes = estimate_size(&key, &payload, &tags);

        Self {
            key,
            payload: payload.into(),
            applied,
            created_at: now,
            ttl_ms: policy.ttl.as_millis() as u64,
            tags,
            priority: policy.priority,
            hit_count: 0,
            last_accessed_at: now,
            size_bytes,
        }
    }

    // == Age ==
    /// Milliseconds since the last write.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    // == Is Expired ==
    /// An entry expires once its age strictly exceeds the TTL; at exactly
    /// `ttl` it is still servable.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.age_ms(now) > self.ttl_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.ttl_ms.saturating_sub(self.age_ms(now))
    }

    // == Record Access ==
    pub fn record_access(&mut self, now: u64) {
        self.hit_count += 1;
        self.last_accessed_at = now;
    }
}

/// Key, payload and tag bytes; map and index overhead is not counted.
fn estimate_size(key: &str, payload: &[u8], tags: &BTreeSet<String>) -> usize {
    key.len() + payload.len() + tags.iter().map(String::len).sum::<usize>()
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
