//! Cache Module
//!
//! Adaptive in-memory caching: per-key-class policies, byte-capacity LRU
//! eviction, tag invalidation, value transforms and stale-while-revalidate.

mod engine;
mod entry;
mod lru;
mod policy;
mod staleness;
mod stats;
mod store;
mod tags;
mod transform;


// Re-export public types
pub use engine::{CacheEngine, CacheEngineBuilder, EntryInfo, OriginLoader};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use lru::LruIndex;
pub use policy::{EdgeRule, KeyClassPolicy, KeyClassResolver, PolicyOverride, Priority, Strategy};
pub use staleness::{classify, Freshness, DEFAULT_STALE_RATIO};
pub use stats::{CacheStats, HotKey, StatsSnapshot, StoreFigures};
pub use store::{CacheStore, InsertOutcome};
pub use tags::TagIndex;
pub use transform::{
    AesGcmTransform, AppliedTransforms, GzipTransform, Transform, TransformKind, TransformPipeline,
};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
