//! Staleness Module
//!
//! Derives an entry's freshness from its age and TTL. Nothing here is stored;
//! the state is recomputed on every read.

use serde::Serialize;

use crate::cache::CacheEntry;

/// Fraction of the TTL during which an entry is fresh.
pub const DEFAULT_STALE_RATIO: f64 = 0.8;

// == Freshness ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// `age <= ratio * ttl`
    Fresh,
    /// `ratio * ttl < age <= ttl`: servable, due for revalidation
    Stale,
    /// `age > ttl`: treated as a miss
    Expired,
}

impl Freshness {
    /// Fresh and stale entries may be served.
    pub fn is_servable(self) -> bool {
        !matches!(self, Freshness::Expired)
    }
}

/// Classifies `entry` at time `now`.
pub fn classify(entry: &CacheEntry, now: u64, stale_ratio: f64) -> Freshness {
    let age = entry.age_ms(now);
    if age > entry.ttl_ms {
        Freshness::Expired
    } else if age as f64 > entry.ttl_ms as f64 * stale_ratio {
        Freshness::Stale
    } else {
        Freshness::Fresh
    }
}
