//! Integration Tests for the Cache Engine
//!
//! Exercises the public engine API end to end: expiry in real time,
//! stale-while-revalidate under concurrency, warm-up and many writers
//! sharing one handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adaptive_cache::cache::{OriginLoader, Priority};
use adaptive_cache::error::FetchError;
use adaptive_cache::{CacheEngine, CacheError, KeyClassPolicy, PolicyOverride, Strategy};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Article {
    id: u32,
    title: String,
}

fn article(id: u32) -> Article {
    Article {
        id,
        title: format!("Article {id}"),
    }
}

/// Origin backed by a fixed map, counting every load.
struct MapOrigin {
    values: HashMap<String, Value>,
    loads: AtomicUsize,
}

impl OriginLoader for MapOrigin {
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Value, FetchError>> {
        async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.values
                .get(key)
                .cloned()
                .ok_or_else(|| FetchError::new(key, "unknown key"))
        }
        .boxed()
    }
}

// == Expiry ==

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let engine = CacheEngine::builder(1 << 20).build().unwrap();
    assert_ok!(engine.set_with("short", &"v", &PolicyOverride::new().ttl_ms(100)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(assert_ok!(engine.get::<String>("short")).as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(assert_ok!(engine.get::<String>("short")), None);

    let stats = engine.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.total_entries, 1, "expired entries stay until purged");
}

#[tokio::test]
async fn test_overwrite_resets_age() {
    let engine = CacheEngine::builder(1 << 20).build().unwrap();
    assert_ok!(engine.set_with("k", &1, &PolicyOverride::new().ttl_ms(150)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_ok!(engine.set_with("k", &2, &PolicyOverride::new().ttl_ms(150)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(assert_ok!(engine.get::<i32>("k")), Some(2));
}

// == Stale While Revalidate ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_fetch() {
    let engine = CacheEngine::builder(1 << 20).build().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            engine
                .stale_while_revalidate("content:generated:7", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, String>(article(7))
                })
                .await
        }));
    }

    for handle in handles {
        let value: Article = assert_ok!(handle.await.unwrap());
        assert_eq!(value, article(7));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!engine.is_refreshing("content:generated:7"));
}

#[tokio::test]
async fn test_refresh_survives_caller_cancellation() {
    let engine = CacheEngine::builder(1 << 20).build().unwrap();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        engine.stale_while_revalidate("dynamic:slow", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, String>(article(1))
        }),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(assert_ok!(engine.get::<Article>("dynamic:slow")), Some(article(1)));
    assert!(!engine.is_refreshing("dynamic:slow"));
}

#[tokio::test]
async fn test_fetch_error_when_nothing_cached() {
    let engine = CacheEngine::builder(1 << 20).build().unwrap();

    let result = engine
        .stale_while_revalidate::<Article, _, _, _>("dynamic:missing", || async {
            Err::<Article, _>("origin unavailable")
        })
        .await;

    let err = assert_err!(result);
    assert!(matches!(err, CacheError::Fetch(_)));
    assert_eq!(assert_ok!(engine.get::<Article>("dynamic:missing")), None);
}

// == Warm Cache ==

#[tokio::test]
async fn test_warm_cache_with_origin() {
    let origin = MapOrigin {
        values: HashMap::from([
            ("static:a".to_string(), json!({"id": 1, "title": "Article 1"})),
            ("static:b".to_string(), json!({"id": 2, "title": "Article 2"})),
        ]),
        loads: AtomicUsize::new(0),
    };
    let engine = CacheEngine::builder(1 << 20).origin(origin).build().unwrap();

    let warmed = engine.warm_cache(["static:a", "static:b", "static:c"]).await;

    assert_eq!(warmed, 2);
    assert_eq!(assert_ok!(engine.get::<Article>("static:a")), Some(article(1)));
    assert_eq!(assert_ok!(engine.get::<Article>("static:c")), None);
    assert!(engine.inspect("static:b").unwrap().transforms.compressed);
}

// == Concurrency ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_writers_respect_capacity() {
    let engine = CacheEngine::builder(4_096).build().unwrap();

    let mut handles = Vec::new();
    for writer in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..100 {
                let key = format!("w{writer}:{i}");
                let overrides = PolicyOverride::new().tags([format!("writer:{writer}")]);
                engine.set_with(&key, &article(i), &overrides).unwrap();
                let _ = engine.get::<Article>(&key).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = engine.stats();
    assert!(stats.total_size_bytes <= stats.capacity_bytes);
    assert!(stats.eviction_count > 0);
    assert_eq!(stats.sets, 800);
    assert_eq!(stats.hits + stats.misses, 800);
}

// == Custom Classes ==

#[tokio::test]
async fn test_custom_class_policy() {
    let resolver = adaptive_cache::cache::KeyClassResolver::standard(Duration::from_secs(60))
        .with_class(
            "report:*",
            KeyClassPolicy::new(
                "report",
                Duration::from_secs(5),
                Strategy::CacheFirst,
                Priority::High,
            )
            .with_tags(["reports"])
            .compressed(),
        );
    let engine = CacheEngine::builder(1 << 20).resolver(resolver).build().unwrap();

    assert_ok!(engine.set("report:q3", &article(3)));
    let info = engine.inspect("report:q3").unwrap();
    assert_eq!(info.ttl_ms, 5_000);
    assert_eq!(info.priority, Priority::High);
    assert!(info.transforms.compressed);

    assert_eq!(engine.invalidate_by_tags(["reports"]), 1);
}
