//! Adaptive Cache - an in-memory caching engine with per-key-class policies
//!
//! Resolves each key to a policy (TTL, strategy, tags, priority, transforms),
//! evicts by least recent use under a byte capacity, invalidates by tag and
//! serves stale values while revalidating them in the background.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEngine, KeyClassPolicy, PolicyOverride, Strategy};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
