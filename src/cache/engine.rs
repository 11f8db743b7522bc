//! Cache Engine Module
//!
//! Thread-safe handle tying together policy resolution, the transform
//! pipeline, the entry store and statistics, plus the stale-while-revalidate
//! refresh path with at most one in-flight fetch per key.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::staleness::{classify, Freshness, DEFAULT_STALE_RATIO};
use crate::cache::{
    current_timestamp_ms, AppliedTransforms, CacheEntry, CacheStats, CacheStore, KeyClassPolicy,
    KeyClassResolver, PolicyOverride, Priority, StatsSnapshot, StoreFigures, Strategy,
    TransformPipeline, MAX_KEY_LENGTH,
};
use crate::config::Config;
use crate::error::{CacheError, FetchError, Result};

/// Result of one origin fetch, shared by every caller waiting on it.
type RefreshOutcome = std::result::Result<Value, FetchError>;
type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

// == Origin Loader ==
/// Source of values for [`CacheEngine::warm_cache`].
pub trait OriginLoader: Send + Sync {
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, RefreshOutcome>;
}

impl<F, Fut> OriginLoader for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = RefreshOutcome> + Send + 'static,
{
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, RefreshOutcome> {
        self(key.to_string()).boxed()
    }
}

// == Entry Info ==
/// Metadata view of one entry, read without counting as a hit or miss.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub key: String,
    pub freshness: Freshness,
    pub created_at: Option<String>,
    pub age_ms: u64,
    pub ttl_ms: u64,
    pub ttl_remaining_ms: u64,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub hit_count: u64,
    pub size_bytes: usize,
    pub transforms: AppliedTransforms,
}

impl EntryInfo {
    fn from_entry(entry: &CacheEntry, now: u64, stale_ratio: f64) -> Self {
        Self {
            key: entry.key.clone(),
            freshness: classify(entry, now, stale_ratio),
            created_at: chrono::DateTime::from_timestamp_millis(entry.created_at as i64)
                .map(|at| at.to_rfc3339()),
            age_ms: entry.age_ms(now),
            ttl_ms: entry.ttl_ms,
            ttl_remaining_ms: entry.ttl_remaining_ms(now),
            tags: entry.tags.iter().cloned().collect(),
            priority: entry.priority,
            hit_count: entry.hit_count,
            size_bytes: entry.size_bytes,
            transforms: entry.applied,
        }
    }
}

// == Builder ==
/// Configures and creates a [`CacheEngine`].
pub struct CacheEngineBuilder {
    capacity_bytes: usize,
    stale_ratio: f64,
    hot_keys_limit: usize,
    resolver: KeyClassResolver,
    pipeline: Option<TransformPipeline>,
    origin: Option<Arc<dyn OriginLoader>>,
}

impl CacheEngineBuilder {
    pub fn new(capacity_bytes: usize) -> Self {
        let defaults = Config::default();
        Self {
            capacity_bytes,
            stale_ratio: DEFAULT_STALE_RATIO,
            hot_keys_limit: defaults.hot_keys_limit,
            resolver: KeyClassResolver::standard(Duration::from_millis(defaults.default_ttl_ms)),
            pipeline: None,
            origin: None,
        }
    }

    pub fn stale_ratio(mut self, ratio: f64) -> Self {
        self.stale_ratio = ratio;
        self
    }

    pub fn hot_keys_limit(mut self, limit: usize) -> Self {
        self.hot_keys_limit = limit;
        self
    }

    pub fn resolver(mut self, resolver: KeyClassResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the default gzip + AES-GCM pipeline.
    pub fn pipeline(mut self, pipeline: TransformPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn origin(mut self, origin: impl OriginLoader + 'static) -> Self {
        self.origin = Some(Arc::new(origin));
        self
    }

    pub fn build(self) -> Result<CacheEngine> {
        if self.capacity_bytes == 0 {
            return Err(CacheError::Config(
                "capacity_bytes must be greater than zero".to_string(),
            ));
        }
        if !(self.stale_ratio > 0.0 && self.stale_ratio <= 1.0) {
            return Err(CacheError::Config(format!(
                "stale_ratio must be in (0, 1], got {}",
                self.stale_ratio
            )));
        }
        let pipeline = match self.pipeline {
            Some(pipeline) => pipeline,
            None => TransformPipeline::standard(Config::default().compression_level, None)?,
        };

        info!(
            "Cache engine created: capacity={} bytes, stale_ratio={}",
            self.capacity_bytes, self.stale_ratio
        );

        Ok(CacheEngine {
            inner: Arc::new(EngineInner {
                store: RwLock::new(CacheStore::new(self.capacity_bytes)),
                resolver: self.resolver,
                pipeline,
                stats: CacheStats::new(),
                in_flight: Mutex::new(HashMap::new()),
                origin: self.origin,
                stale_ratio: self.stale_ratio,
                hot_keys_limit: self.hot_keys_limit,
            }),
        })
    }
}

// == Cache Engine ==
/// Cloneable handle to one cache instance.
///
/// Store, tag index and size accounting sit behind a single lock so each
/// mutation is observed whole. Reads look entries up under the shared read
/// lock and take the write lock only to record recency after a successful
/// decode. Transforms and (de)serialization run outside the lock. Statistics
/// are atomics and never wait on it.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: RwLock<CacheStore>,
    resolver: KeyClassResolver,
    pipeline: TransformPipeline,
    stats: CacheStats,
    in_flight: Mutex<HashMap<String, InFlight>>,
    origin: Option<Arc<dyn OriginLoader>>,
    stale_ratio: f64,
    hot_keys_limit: usize,
}

impl fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("entries", &self.len())
            .field("stale_ratio", &self.inner.stale_ratio)
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    pub fn builder(capacity_bytes: usize) -> CacheEngineBuilder {
        CacheEngineBuilder::new(capacity_bytes)
    }

    /// Creates an engine from validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let pipeline =
            TransformPipeline::standard(config.compression_level, config.encryption_key_bytes()?)?;

        Self::builder(config.capacity_bytes)
            .stale_ratio(config.stale_ratio)
            .hot_keys_limit(config.hot_keys_limit)
            .resolver(KeyClassResolver::standard(Duration::from_millis(
                config.default_ttl_ms,
            )))
            .pipeline(pipeline)
            .build()
    }

    // == Set ==
    /// Stores `value` under the key class policy of `key`.
    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        self.set_with(key, value, &PolicyOverride::default())
    }

    /// Stores `value` with per-call policy adjustments.
    ///
    /// Eviction frees space before the entry is inserted. An entry larger than
    /// the whole capacity empties the store and is then rejected with
    /// [`CacheError::EntryTooLarge`].
    pub fn set_with<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        overrides: &PolicyOverride,
    ) -> Result<()> {
        let started = Instant::now();
        let result = validate_key(key)
            .and_then(|_| Ok(serde_json::to_vec(value)?))
            .and_then(|raw| self.store_bytes(key, raw, overrides));
        self.inner.stats.record_latency(started.elapsed());
        result
    }

    fn store_bytes(&self, key: &str, raw: Vec<u8>, overrides: &PolicyOverride) -> Result<()> {
        let policy = overrides.apply(self.inner.resolver.resolve(key));
        let (payload, applied) = self.inner.pipeline.encode(raw, &policy)?;
        let entry = CacheEntry::new(
            key.to_string(),
            payload,
            applied,
            &policy,
            current_timestamp_ms(),
        );
        let size = entry.size_bytes;

        let outcome = self.write_store().insert(entry)?;

        if !outcome.evicted.is_empty() {
            self.inner
                .stats
                .record_evictions(outcome.evicted.len() as u64);
            debug!(
                "Evicted {} entries to store '{}'",
                outcome.evicted.len(),
                key
            );
        }
        if !outcome.stored {
            let capacity = self.read_store().capacity_bytes();
            warn!(
                "Rejected '{}': {} bytes exceeds capacity of {} bytes",
                key, size, capacity
            );
            return Err(CacheError::EntryTooLarge {
                key: key.to_string(),
                size,
                capacity,
            });
        }

        self.inner.stats.record_set();
        Ok(())
    }

    // == Get ==
    /// Returns the value under `key` if present and not expired.
    ///
    /// Expired entries count as misses but stay in the store until evicted,
    /// deleted, invalidated, overwritten or purged.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        let started = Instant::now();
        let result = self
            .read_servable(key, current_timestamp_ms())
            .map(|found| found.map(|(value, _)| value));
        self.inner.stats.record_latency(started.elapsed());
        result
    }

    /// Looks up and decodes a servable entry, recording exactly one hit or
    /// miss.
    ///
    /// The lookup shares the read lock with other readers. Only a decoded
    /// value counts as a hit and refreshes recency. An entry that fails to
    /// decode is a miss and is dropped, since it can never be served.
    fn read_servable<V: DeserializeOwned>(
        &self,
        key: &str,
        now: u64,
    ) -> Result<Option<(V, Freshness)>> {
        let found = {
            let store = self.read_store();
            store.peek(key).and_then(|entry| {
                let freshness = classify(entry, now, self.inner.stale_ratio);
                freshness
                    .is_servable()
                    .then(|| (entry.payload.clone(), entry.applied, freshness))
            })
        };
        let Some((payload, applied, freshness)) = found else {
            self.inner.stats.record_miss();
            return Ok(None);
        };

        match self.decode::<V>(&payload, applied) {
            Ok(value) => {
                self.write_store().touch(key, now);
                self.inner.stats.record_hit();
                Ok(Some((value, freshness)))
            }
            Err(err) => {
                self.inner.stats.record_miss();
                self.discard_unreadable(key, &payload);
                Err(err)
            }
        }
    }

    /// Removes `key` if it still holds `payload`; a concurrent overwrite wins.
    fn discard_unreadable(&self, key: &str, payload: &Arc<[u8]>) {
        let mut store = self.write_store();
        let unchanged = store
            .peek(key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.payload, payload));
        if unchanged {
            store.remove(key);
            warn!("Dropped unreadable entry '{}'", key);
        }
    }

    fn decode<V: DeserializeOwned>(&self, payload: &[u8], applied: AppliedTransforms) -> Result<V> {
        let raw = self.inner.pipeline.decode(payload, applied)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    // == Delete ==
    /// Removes `key`; returns whether an entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.write_store().remove(key).is_some();
        if removed {
            self.inner.stats.record_delete();
        }
        removed
    }

    // == Invalidate By Tags ==
    /// Removes every entry carrying any of `tags`.
    ///
    /// Returns the number of distinct entries removed. Entries written after
    /// the call acquires the store are not affected.
    pub fn invalidate_by_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<S> = tags.into_iter().collect();
        let removed = self
            .write_store()
            .invalidate_tags(tags.iter().map(|tag| tag.as_ref()))
            .len();
        self.inner.stats.record_invalidation(removed as u64);
        debug!("Invalidated {} entries by tags", removed);
        removed
    }

    // == Clear ==
    /// Drops every entry and resets statistics.
    ///
    /// In-flight refreshes are untouched and may repopulate their keys.
    pub fn clear(&self) {
        self.write_store().clear();
        self.inner.stats.reset();
        info!("Cache cleared");
    }

    // == Purge Expired ==
    /// Removes expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.write_store().purge_expired(current_timestamp_ms());
        self.inner.stats.record_expired(removed as u64);
        removed
    }

    // == Stats ==
    pub fn stats(&self) -> StatsSnapshot {
        let figures = {
            let store = self.read_store();
            StoreFigures {
                total_entries: store.len(),
                total_size_bytes: store.total_size_bytes(),
                capacity_bytes: store.capacity_bytes(),
                hot_keys: store.hot_keys(self.inner.hot_keys_limit),
            }
        };
        self.inner.stats.snapshot(figures)
    }

    // == Inspect ==
    /// Entry metadata, or None if nothing is stored under `key`.
    pub fn inspect(&self, key: &str) -> Option<EntryInfo> {
        let now = current_timestamp_ms();
        self.read_store()
            .peek(key)
            .map(|entry| EntryInfo::from_entry(entry, now, self.inner.stale_ratio))
    }

    /// Effective policy for `key` with no overrides.
    pub fn policy_for(&self, key: &str) -> &KeyClassPolicy {
        self.inner.resolver.resolve(key)
    }

    pub fn resolver(&self) -> &KeyClassResolver {
        &self.inner.resolver
    }

    pub fn len(&self) -> usize {
        self.read_store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_store().is_empty()
    }

    /// Whether a refresh for `key` is currently running.
    pub fn is_refreshing(&self, key: &str) -> bool {
        self.lock_in_flight().contains_key(key)
    }

    // == Stale While Revalidate ==
    /// Serves a cached value immediately when fresh or stale, refreshing stale
    /// values in the background; fetches when nothing servable is cached.
    ///
    /// At most one fetch per key runs at a time: callers arriving while one is
    /// in flight wait for its result instead of calling `fetch`. A background
    /// refresh failure is logged and never reaches the caller. When nothing
    /// is cached the fetch error is returned as [`CacheError::Fetch`].
    ///
    /// The fetch runs on its own task, so dropping the returned future does
    /// not cancel it; a completed fetch is always written back.
    pub async fn stale_while_revalidate<V, F, Fut, E>(&self, key: &str, fetch: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        validate_key(key)?;

        match self.read_servable::<V>(key, current_timestamp_ms()) {
            Ok(Some((value, freshness))) => {
                if freshness == Freshness::Stale {
                    debug!("Serving stale '{}' while revalidating", key);
                    // Not awaited: the refresh task runs on its own.
                    drop(self.join_or_start_refresh(key, fetch));
                }
                return Ok(value);
            }
            Ok(None) => {}
            Err(err) => warn!("Cached value for '{}' unreadable, refetching: {}", key, err),
        }

        let value = self.join_or_start_refresh(key, fetch).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the in-flight refresh for `key`, starting one if none runs.
    ///
    /// When a concurrent refresh finished just before the in-flight map was
    /// locked, its fresh value is returned without fetching again.
    fn join_or_start_refresh<V, F, Fut, E>(&self, key: &str, fetch: F) -> InFlight
    where
        V: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let mut in_flight = self.lock_in_flight();
        if let Some(existing) = in_flight.get(key) {
            debug!("Joining in-flight refresh of '{}'", key);
            return existing.clone();
        }
        if let Some(value) = self.peek_fresh_value(key) {
            return future::ready(Ok(value)).boxed().shared();
        }

        let guard = InFlightGuard {
            engine: self.clone(),
            key: key.to_string(),
        };
        let task = tokio::spawn(async move {
            let key = guard.key.clone();
            let outcome = match fetch().await {
                Ok(value) => serde_json::to_value(&value)
                    .map_err(|err| FetchError::new(&key, err.to_string())),
                Err(err) => Err(FetchError::new(&key, err.to_string())),
            };
            match &outcome {
                Ok(value) => {
                    if let Err(err) = guard.engine.set(&key, value) {
                        warn!("Refreshed value for '{}' not stored: {}", key, err);
                    }
                }
                Err(err) => warn!("Refresh failed: {}", err),
            }
            drop(guard);
            outcome
        });

        let owned_key = key.to_string();
        let shared = async move {
            task.await.unwrap_or_else(|err| {
                Err(FetchError::new(owned_key, format!("refresh task failed: {err}")))
            })
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), shared.clone());
        shared
    }

    /// Decoded value of a fresh entry, without touching stats or recency.
    fn peek_fresh_value(&self, key: &str) -> Option<Value> {
        let now = current_timestamp_ms();
        let (payload, applied) = {
            let store = self.read_store();
            let entry = store.peek(key)?;
            if classify(entry, now, self.inner.stale_ratio) != Freshness::Fresh {
                return None;
            }
            (entry.payload.clone(), entry.applied)
        };
        self.decode(&payload, applied).ok()
    }

    // == Strategy-Driven Fetch ==
    /// Reads `key` according to its key class strategy.
    ///
    /// - cache-first: cached value, else fetch (single-flight) and store
    /// - network-first: fetch and store, falling back to a cached value when
    ///   the fetch fails
    /// - stale-while-revalidate: see [`Self::stale_while_revalidate`]
    /// - cache-only: cached value or [`CacheError::NotFound`]
    /// - network-only: fetch, never stored
    ///
    /// Cache read failures are treated as misses.
    pub async fn fetch<V, F, Fut, E>(&self, key: &str, fetch: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        match self.policy_for(key).strategy {
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(key, fetch).await,
            Strategy::CacheFirst => {
                if let Some(value) = self.get_or_miss(key) {
                    return Ok(value);
                }
                validate_key(key)?;
                let value = self.join_or_start_refresh(key, fetch).await?;
                Ok(serde_json::from_value(value)?)
            }
            Strategy::NetworkFirst => match fetch().await {
                Ok(value) => {
                    if let Err(err) = self.set(key, &value) {
                        warn!("Fetched value for '{}' not stored: {}", key, err);
                    }
                    Ok(value)
                }
                Err(err) => {
                    let err = FetchError::new(key, err.to_string());
                    match self.get_or_miss(key) {
                        Some(value) => {
                            warn!("{}; serving cached value", err);
                            Ok(value)
                        }
                        None => Err(err.into()),
                    }
                }
            },
            Strategy::CacheOnly => self
                .get_or_miss(key)
                .ok_or_else(|| CacheError::NotFound(key.to_string())),
            Strategy::NetworkOnly => fetch()
                .await
                .map_err(|err| FetchError::new(key, err.to_string()).into()),
        }
    }

    fn get_or_miss<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        self.get(key).unwrap_or_else(|err| {
            warn!("Cache read of '{}' failed, treating as miss: {}", key, err);
            None
        })
    }

    // == Warm Cache ==
    /// Prefetches `keys` from the configured origin.
    ///
    /// Best effort: keys that fail to load or store are skipped. Returns the
    /// number of keys stored.
    pub async fn warm_cache<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(origin) = self.inner.origin.clone() else {
            warn!("Cache warm-up requested without an origin loader");
            return 0;
        };

        let loads = keys.into_iter().map(|key| {
            let key = key.as_ref().to_string();
            let origin = origin.clone();
            let engine = self.clone();
            async move {
                let stored = match origin.load(&key).await {
                    Ok(value) => engine.set(&key, &value).map_err(|err| err.to_string()),
                    Err(err) => Err(err.to_string()),
                };
                if let Err(reason) = &stored {
                    debug!("Warm-up skipped '{}': {}", key, reason);
                }
                stored.is_ok()
            }
        });

        let warmed = future::join_all(loads)
            .await
            .into_iter()
            .filter(|stored| *stored)
            .count();
        info!("Cache warm-up stored {} keys", warmed);
        warmed
    }

    // == Lock Helpers ==
    // Poisoning is recovered rather than propagated: a panic elsewhere must not
    // turn every later cache call into a failure.
    fn read_store(&self) -> RwLockReadGuard<'_, CacheStore> {
        self.inner.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, CacheStore> {
        self.inner.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, key: &str, by_ms: u64) {
        self.write_store().backdate(key, by_ms);
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> std::result::Result<(), String> {
        self.read_store().check_invariants()
    }
}

/// Clears the in-flight marker when a refresh settles, including when its
/// task panics or is dropped at shutdown.
struct InFlightGuard {
    engine: CacheEngine,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.engine.lock_in_flight().remove(&self.key);
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
