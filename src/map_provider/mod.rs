//! Random-map provisioning pipeline (§4.10): a background-replenished pool
//! backed by the upstream catalog, with local-catalog fallback and
//! blob-store-backed binary caching.

pub mod blob;
pub mod catalog;

pub use blob::{map_binary_key, BlobStore, HttpBlobStore};
pub use catalog::{HttpMapCatalogClient, MapCatalogClient, TotdBatch};

use crate::domain::{Map, MapPack, RandomMapQueue};
use crate::metrics::ServerMetrics;
use crate::store::GameStore;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

/// Default pool target outside local-dev mode (§4.10(3)).
pub const MAINTAIN_N_MAPS: usize = 200;
/// Pool target in local-dev mode.
pub const MAINTAIN_N_MAPS_LOCAL_DEV: usize = 20;

fn snap_to_15s(secs: u32) -> u32 {
    ((secs + 7) / 15) * 15
}

fn matches_bounds(map: &Map, min_secs: u32, max_secs: u32, max_difficulty: u8) -> bool {
    let snapped = snap_to_15s(map.length_secs);
    snapped >= min_secs && snapped <= max_secs && map.difficulty <= max_difficulty
}

/// Supplies rooms with their required map list from a locally-maintained
/// pool, falling back to the local catalog when the pool runs dry.
pub struct MapProvider {
    pool: Mutex<VecDeque<Map>>,
    catalog: Arc<dyn MapCatalogClient>,
    blob: Option<Arc<dyn BlobStore>>,
    store: Arc<dyn GameStore>,
    metrics: Arc<ServerMetrics>,
    maintain_n_maps: usize,
}

impl MapProvider {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn MapCatalogClient>,
        blob: Option<Arc<dyn BlobStore>>,
        store: Arc<dyn GameStore>,
        metrics: Arc<ServerMetrics>,
        local_dev: bool,
    ) -> Self {
        Self {
            pool: Mutex::new(VecDeque::new()),
            catalog,
            blob,
            store,
            metrics,
            maintain_n_maps: if local_dev {
                MAINTAIN_N_MAPS_LOCAL_DEV
            } else {
                MAINTAIN_N_MAPS
            },
        }
    }

    /// Loads any previously persisted pool, so a restart doesn't redo catalog
    /// discovery from empty (§4.10(5)).
    pub async fn restore_from_store(&self) -> anyhow::Result<()> {
        if let Some(queue) = self.store.load_random_map_queue().await? {
            let mut pool = self.pool.lock().await;
            for map in queue.maps {
                pool.push_back(map);
            }
        }
        Ok(())
    }

    /// Runs forever, keeping the pool topped up to `maintain_n_maps` and
    /// periodically snapshotting it for restart recovery. Intended to be
    /// spawned once as a background task.
    pub async fn run_replenishment(self: Arc<Self>) {
        let mut tick = interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            if let Err(err) = self.replenish_once().await {
                warn!(error = %err, "map pool replenishment cycle failed");
            }
        }
    }

    async fn replenish_once(&self) -> anyhow::Result<()> {
        let deficit = {
            let pool = self.pool.lock().await;
            self.maintain_n_maps.saturating_sub(pool.len())
        };
        if deficit == 0 {
            return Ok(());
        }

        let fetched = self.catalog.random_maps(deficit).await?;
        {
            let mut pool = self.pool.lock().await;
            for map in fetched {
                pool.push_back(map);
            }
        }
        self.persist_pool().await
    }

    async fn persist_pool(&self) -> anyhow::Result<()> {
        let maps: Vec<Map> = self.pool.lock().await.iter().cloned().collect();
        self.store
            .save_random_map_queue(RandomMapQueue {
                maps,
                refreshed_ts: 0,
            })
            .await
    }

    /// Synchronously takes up to `n` already-pooled maps meeting the bounds,
    /// with no catalog fallback. Used to hand a room off immediately with
    /// whatever is on hand, leaving `get_some_maps` to fetch any remainder
    /// in the background.
    pub async fn take_pooled(&self, n: usize, min_secs: u32, max_secs: u32, max_difficulty: u8) -> Vec<Map> {
        let mut pool = self.pool.lock().await;
        let mut taken = Vec::new();
        let mut retained = VecDeque::with_capacity(pool.len());
        while let Some(map) = pool.pop_front() {
            if taken.len() < n && matches_bounds(&map, min_secs, max_secs, max_difficulty) {
                taken.push(map);
            } else {
                retained.push_back(map);
            }
        }
        *pool = retained;
        taken
    }

    /// Yields up to `n` distinct maps meeting the bounds, draining the pool
    /// first and falling back to a filtered local-catalog sample if the pool
    /// can't satisfy the request (§4.10(1)-(2)).
    pub async fn get_some_maps(
        self: &Arc<Self>,
        n: usize,
        min_secs: u32,
        max_secs: u32,
        max_difficulty: u8,
    ) -> mpsc::Receiver<Map> {
        let (tx, rx) = mpsc::channel(n.max(1));
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut yielded = 0usize;
            {
                let mut pool = provider.pool.lock().await;
                let mut retained = VecDeque::with_capacity(pool.len());
                while let Some(map) = pool.pop_front() {
                    if yielded < n && matches_bounds(&map, min_secs, max_secs, max_difficulty) {
                        yielded += 1;
                        if tx.send(map).await.is_err() {
                            return;
                        }
                    } else {
                        retained.push_back(map);
                    }
                }
                *pool = retained;
            }

            if yielded < n {
                debug!(
                    still_needed = n - yielded,
                    "random pool exhausted for request bounds, falling back to local catalog"
                );
                match provider.catalog.random_maps((n - yielded) * 4).await {
                    Ok(candidates) => {
                        for map in candidates
                            .into_iter()
                            .filter(|m| matches_bounds(m, min_secs, max_secs, max_difficulty))
                            .take(n - yielded)
                        {
                            if tx.send(map).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "local-catalog fallback failed");
                        provider.metrics.increment_map_download_failures();
                    }
                }
            }
        });
        rx
    }

    /// Resolves a map pack by id, preferring the durable cache over a fresh
    /// catalog lookup.
    pub async fn resolve_map_pack(&self, pack_id: &str) -> anyhow::Result<Option<MapPack>> {
        if let Some(cached) = self.store.find_map_pack(pack_id).await? {
            return Ok(Some(cached));
        }
        let Some(pack) = self.catalog.map_pack_info(pack_id).await? else {
            return Ok(None);
        };
        self.store.upsert_map_pack(pack.clone()).await?;
        Ok(Some(pack))
    }

    /// Ensures a map's binary is cached, downloading-then-uploading lazily
    /// on a cache miss (§4.10(4)).
    pub async fn ensure_binary_cached(&self, track_id: &str, fetch: impl std::future::Future<Output = anyhow::Result<Vec<u8>>>) -> anyhow::Result<()> {
        let Some(blob) = &self.blob else {
            return Ok(());
        };
        let key = map_binary_key(track_id);
        if blob.is_cached(&key).await? {
            self.metrics.increment_map_cache_hit();
            return Ok(());
        }
        self.metrics.increment_map_cache_miss();
        let bytes = fetch.await?;
        blob.upload(&key, bytes).await
    }

    /// Polls the upstream TOTD endpoint forever, retrying on the interval it
    /// reports via `relativeNextRequest`, with a 5-s backoff on transient
    /// errors (§4.10(6), §5).
    pub async fn run_totd_poll(self: Arc<Self>, tx: mpsc::Sender<Map>) {
        loop {
            match self.catalog.totd().await {
                Ok(batch) => {
                    for map in batch.maps {
                        if tx.send(map).await.is_err() {
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_secs(batch.relative_next_request.max(1))).await;
                }
                Err(err) => {
                    warn!(error = %err, "totd poll failed, retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubCatalog {
        random_calls: AtomicUsize,
    }

    #[async_trait]
    impl MapCatalogClient for StubCatalog {
        async fn random_maps(&self, count: usize) -> anyhow::Result<Vec<Map>> {
            self.random_calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..count)
                .map(|i| Map {
                    track_id: format!("track-{i}"),
                    name: format!("Track {i}"),
                    length_secs: 30,
                    difficulty: 1,
                })
                .collect())
        }
        async fn latest_maps(&self, _count: usize) -> anyhow::Result<Vec<Map>> {
            Ok(vec![])
        }
        async fn map_info(&self, _track_id: &str) -> anyhow::Result<Option<Map>> {
            Ok(None)
        }
        async fn map_pack_info(&self, _pack_id: &str) -> anyhow::Result<Option<MapPack>> {
            Ok(None)
        }
        async fn totd(&self) -> anyhow::Result<TotdBatch> {
            Ok(TotdBatch {
                maps: vec![],
                relative_next_request: 60,
            })
        }
    }

    fn provider_with_stub() -> Arc<MapProvider> {
        Arc::new(MapProvider::new(
            Arc::new(StubCatalog {
                random_calls: AtomicUsize::new(0),
            }),
            None,
            Arc::new(InMemoryStore::new()),
            Arc::new(ServerMetrics::new()),
            true,
        ))
    }

    #[test]
    fn snap_to_15s_rounds_up() {
        assert_eq!(snap_to_15s(30), 30);
        assert_eq!(snap_to_15s(31), 45);
        assert_eq!(snap_to_15s(1), 15);
    }

    #[tokio::test]
    async fn get_some_maps_falls_back_to_catalog_when_pool_is_empty() {
        let provider = provider_with_stub();
        let mut rx = provider.get_some_maps(3, 15, 45, 2).await;
        let mut received = Vec::new();
        while let Some(map) = rx.recv().await {
            received.push(map);
        }
        assert_eq!(received.len(), 3);
    }

    #[tokio::test]
    async fn get_some_maps_drains_the_pool_first() {
        let provider = provider_with_stub();
        {
            let mut pool = provider.pool.lock().await;
            pool.push_back(Map {
                track_id: "pooled".to_string(),
                name: "Pooled".to_string(),
                length_secs: 30,
                difficulty: 1,
            });
        }
        let mut rx = provider.get_some_maps(1, 15, 45, 2).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.track_id, "pooled");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn take_pooled_only_removes_matching_entries() {
        let provider = provider_with_stub();
        {
            let mut pool = provider.pool.lock().await;
            pool.push_back(Map {
                track_id: "too-short".to_string(),
                name: "Too Short".to_string(),
                length_secs: 10,
                difficulty: 1,
            });
            pool.push_back(Map {
                track_id: "ok".to_string(),
                name: "Ok".to_string(),
                length_secs: 30,
                difficulty: 1,
            });
        }
        let taken = provider.take_pooled(5, 15, 45, 2).await;
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].track_id, "ok");
        assert_eq!(provider.pool.lock().await.len(), 1, "the out-of-bounds map stays pooled");
    }

    #[tokio::test]
    async fn take_pooled_never_falls_back_to_the_catalog() {
        let provider = provider_with_stub();
        // An empty pool with nothing matching the bounds yields nothing;
        // unlike `get_some_maps`, it must not top up from the catalog.
        let taken = provider.take_pooled(3, 15, 45, 2).await;
        assert!(taken.is_empty());
    }

    #[tokio::test]
    async fn restore_from_store_repopulates_pool() {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_random_map_queue(RandomMapQueue {
                maps: vec![Map {
                    track_id: "saved".to_string(),
                    name: "Saved".to_string(),
                    length_secs: 30,
                    difficulty: 1,
                }],
                refreshed_ts: 1,
            })
            .await
            .unwrap();
        let provider = MapProvider::new(
            Arc::new(StubCatalog {
                random_calls: AtomicUsize::new(0),
            }),
            None,
            store,
            Arc::new(ServerMetrics::new()),
            true,
        );
        provider.restore_from_store().await.unwrap();
        assert_eq!(provider.pool.lock().await.len(), 1);
    }
}
