//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and
//! operation latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

// == Cache Stats ==
/// Process-wide counters observed by every cache operation.
///
/// Counters are atomics so recording never waits on the store lock. They
/// accumulate until [`CacheStats::reset`].
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    invalidations: AtomicU64,
    expired: AtomicU64,
    timed_ops: AtomicU64,
    total_latency_us: AtomicU64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts entries removed by a tag invalidation.
    pub fn record_invalidation(&self, removed: u64) {
        self.invalidations.fetch_add(removed, Ordering::Relaxed);
    }

    /// Counts expired entries removed by a purge.
    pub fn record_expired(&self, removed: u64) {
        self.expired.fetch_add(removed, Ordering::Relaxed);
    }

    /// Adds one operation's wall time to the response time average.
    pub fn record_latency(&self, elapsed: Duration) {
        self.timed_ops.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits(), self.hits() + self.misses())
    }

    /// Returns misses / (hits + misses), or 0.0 if no lookups have been made.
    pub fn miss_rate(&self) -> f64 {
        ratio(self.misses(), self.hits() + self.misses())
    }

    pub fn average_response_time_ms(&self) -> f64 {
        let ops = self.timed_ops.load(Ordering::Relaxed);
        ratio(self.total_latency_us.load(Ordering::Relaxed), ops) / 1000.0
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.evictions,
            &self.sets,
            &self.deletes,
            &self.invalidations,
            &self.expired,
            &self.timed_ops,
            &self.total_latency_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Combines the counters with store-derived figures into a report.
    pub fn snapshot(&self, store: StoreFigures) -> StatsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        StatsSnapshot {
            total_entries: store.total_entries,
            total_size_bytes: store.total_size_bytes,
            capacity_bytes: store.capacity_bytes,
            hits,
            misses,
            hit_rate: ratio(hits, hits + misses),
            miss_rate: ratio(misses, hits + misses),
            eviction_count: self.evictions(),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expired_count: self.expired(),
            average_response_time_ms: self.average_response_time_ms(),
            hot_keys: store.hot_keys,
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Figures read from the entry store under its lock.
#[derive(Debug, Clone, Default)]
pub struct StoreFigures {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub capacity_bytes: usize,
    pub hot_keys: Vec<HotKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotKey {
    pub key: String,
    pub hit_count: u64,
}

// == Stats Snapshot ==
/// Point-in-time statistics report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub capacity_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub eviction_count: u64,
    pub sets: u64,
    pub deletes: u64,
    pub invalidations: u64,
    /// Entries removed by purges of expired entries
    pub expired_count: u64,
    pub average_response_time_ms: f64,
    pub hot_keys: Vec<HotKey>,
}
