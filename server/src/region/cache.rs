//! Lazily loaded, process-lifetime cache of region geometry shards

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::postal::RegionKey;

use super::discovery::ShardManifest;
use super::reader::ShardReader;
use super::single_flight::SingleFlight;
use super::types::{GeometryShard, ShardError};

type ShardResult = Result<Arc<GeometryShard>, ShardError>;

/// Maps a region key to its geometry shard, parsing each boundary file at most once.
///
/// Entries are never evicted or refreshed. A failed parse is memoized like a
/// success, so a broken file is reported on every request without being
/// re-read; restarting the process picks up a fixed file. Keys that are not
/// in the manifest are rejected without touching the cache.
pub struct RegionShardCache {
    manifest: ShardManifest,
    reader: Arc<dyn ShardReader>,
    shards: SingleFlight<RegionKey, ShardResult>,
    hits: AtomicU64,
}

impl RegionShardCache {
    pub fn new(manifest: ShardManifest, reader: Arc<dyn ShardReader>) -> Self {
        Self {
            manifest,
            reader,
            shards: SingleFlight::new(),
            hits: AtomicU64::new(0),
        }
    }

    pub fn manifest(&self) -> &ShardManifest {
        &self.manifest
    }

    /// Get the shard for a region, loading it on first use.
    ///
    /// Every call answered without parsing counts as a cache hit, including
    /// callers that waited on another caller's in-flight load.
    pub async fn shard_for(&self, region: &RegionKey) -> ShardResult {
        if let Some(cached) = self.shards.get(region) {
            self.record_hit();
            return cached;
        }

        let path = self
            .manifest
            .path_for(region)
            .ok_or_else(|| ShardError::NotFound {
                region: region.clone(),
            })?
            .to_path_buf();

        let reader = Arc::clone(&self.reader);
        let key = region.clone();
        let parsed_here = Arc::new(AtomicBool::new(false));
        let parsed = Arc::clone(&parsed_here);
        let loaded = self
            .shards
            .get_or_load(region.clone(), move || {
                parsed.store(true, Ordering::Relaxed);
                let start = Instant::now();
                debug!("Loading shard for region '{}' from {:?}", key, path);

                let result = reader.read(&key, &path).map(Arc::new);

                histogram!("coverage_shard_load_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                counter!("coverage_shard_loads_total").increment(1);
                match &result {
                    Ok(shard) => info!(
                        "Loaded shard for region '{}': {} postal codes ({} features skipped)",
                        key,
                        shard.len(),
                        shard.skipped_features
                    ),
                    Err(e) => {
                        counter!("coverage_shard_load_failures_total").increment(1);
                        warn!("Failed to load shard for region '{}': {}", key, e);
                    }
                }
                result
            })
            .await;

        if loaded.is_ok() && !parsed_here.load(Ordering::Relaxed) {
            self.record_hit();
        }

        loaded.unwrap_or_else(|e| {
            Err(ShardError::Parse {
                region: region.clone(),
                reason: e.to_string(),
            })
        })
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("coverage_shard_cache_hits_total").increment(1);
    }

    pub fn is_loaded(&self, region: &RegionKey) -> bool {
        self.shards.get(region).is_some()
    }

    /// Number of regions whose load has completed (successfully or not)
    pub fn loaded_count(&self) -> usize {
        self.shards.loaded_count()
    }

    /// Number of boundary file parses performed
    pub fn load_count(&self) -> u64 {
        self.shards.load_count()
    }

    /// Number of calls answered from a loaded or in-flight shard
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postal::PostalCode;
    use crate::region::discovery::discover_shards;
    use crate::test_utils::{CountingReader, TempDir, shard_geojson};

    fn cache_with_counter(dir: &TempDir) -> (Arc<RegionShardCache>, Arc<CountingReader>) {
        let reader = Arc::new(CountingReader::new());
        let cache = RegionShardCache::new(
            discover_shards(dir.path()),
            Arc::clone(&reader) as Arc<dyn ShardReader>,
        );
        (Arc::new(cache), reader)
    }

    #[tokio::test]
    async fn test_repeated_calls_parse_once() {
        let dir = TempDir::new("shard_cache_repeat");
        dir.write("09.geojson", &shard_geojson(&["09000"]));
        let (cache, reader) = cache_with_counter(&dir);
        let region = RegionKey::new("09");

        let first = cache.shard_for(&region).await.unwrap();
        for _ in 0..5 {
            let again = cache.shard_for(&region).await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(reader.read_count(), 1);
        assert_eq!(cache.load_count(), 1);
        assert_eq!(cache.hit_count(), 5);
        assert!(cache.is_loaded(&region));
        assert!(first.get(&PostalCode::parse("09000").unwrap()).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_parse_once() {
        let dir = TempDir::new("shard_cache_concurrent");
        dir.write("09.geojson", &shard_geojson(&["09000"]));
        dir.write("19.geojson", &shard_geojson(&["64000"]));
        let (cache, reader) = cache_with_counter(&dir);

        let mut handles = Vec::new();
        for i in 0..20 {
            let cache = Arc::clone(&cache);
            let region = RegionKey::new(if i % 2 == 0 { "09" } else { "19" });
            handles.push(tokio::spawn(async move { cache.shard_for(&region).await }));
        }
        let shards: Vec<_> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert!(shards.iter().all(|s| s.len() == 1));
        assert_eq!(reader.read_count(), 2);
        assert_eq!(cache.loaded_count(), 2);
        // Callers that joined an in-flight load count as hits
        assert_eq!(cache.hit_count(), 18);
    }

    #[tokio::test]
    async fn test_unknown_region_is_not_found() {
        let dir = TempDir::new("shard_cache_unknown");
        let (cache, reader) = cache_with_counter(&dir);

        let result = cache.shard_for(&RegionKey::new("99")).await;
        assert_eq!(
            result.unwrap_err(),
            ShardError::NotFound {
                region: RegionKey::new("99")
            }
        );
        assert_eq!(reader.read_count(), 0);
        assert_eq!(cache.loaded_count(), 0);
        assert_eq!(cache.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_parse_failure_is_memoized() {
        let dir = TempDir::new("shard_cache_broken");
        dir.write("07.geojson", "{ broken");
        let (cache, reader) = cache_with_counter(&dir);
        let region = RegionKey::new("07");

        for _ in 0..3 {
            assert!(matches!(
                cache.shard_for(&region).await,
                Err(ShardError::Parse { .. })
            ));
        }
        assert_eq!(reader.read_count(), 1);
        assert_eq!(cache.hit_count(), 2);
    }
}
