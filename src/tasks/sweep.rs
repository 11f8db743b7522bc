//! Expired Entry Sweep
//!
//! Background task that periodically purges expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;

/// Spawns a background task that purges expired entries every `interval`.
///
/// The returned handle is aborted during graceful shutdown. A purge runs
/// under the store lock like any other mutation, so readers never observe a
/// half-swept store.
pub fn spawn_sweep_task(engine: CacheEngine, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expired sweep with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = engine.purge_expired();
            if removed > 0 {
                info!("Expired sweep: removed {} entries", removed);
            } else {
                debug!("Expired sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PolicyOverride;

    fn engine() -> CacheEngine {
        CacheEngine::builder(1 << 20).build().unwrap()
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let engine = engine();
        engine
            .set_with("expire_soon", &"value", &PolicyOverride::new().ttl_ms(50))
            .unwrap();

        let handle = spawn_sweep_task(engine.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert!(engine.inspect("expire_soon").is_none());
        assert_eq!(engine.stats().total_size_bytes, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_preserves_valid_entries() {
        let engine = engine();
        engine
            .set_with("long_lived", &"value", &PolicyOverride::new().ttl_ms(3_600_000))
            .unwrap();

        let handle = spawn_sweep_task(engine.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            engine.get::<String>("long_lived").unwrap().as_deref(),
            Some("value")
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_can_be_aborted() {
        let handle = spawn_sweep_task(engine(), Duration::from_secs(1));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
