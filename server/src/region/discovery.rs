//! Shard discovery
//!
//! Lists the boundary directory once and keys every GeoJSON file by its file
//! stem: `<shards_dir>/<region_key>.geojson` (or `.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::postal::RegionKey;

/// Supported boundary file extensions
const SHARD_EXTENSIONS: &[&str] = &["geojson", "json"];

/// RegionKey -> boundary file, in lexicographic key order
#[derive(Debug, Clone, Default)]
pub struct ShardManifest {
    shards: BTreeMap<RegionKey, PathBuf>,
}

impl ShardManifest {
    pub fn from_entries(entries: impl IntoIterator<Item = (RegionKey, PathBuf)>) -> Self {
        Self {
            shards: entries.into_iter().collect(),
        }
    }

    pub fn path_for(&self, region: &RegionKey) -> Option<&Path> {
        self.shards.get(region).map(PathBuf::as_path)
    }

    /// Region keys in their stable (sorted) order
    pub fn keys(&self) -> impl Iterator<Item = &RegionKey> {
        self.shards.keys()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

/// Check whether a path looks like a boundary shard file
pub fn is_shard_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SHARD_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
}

/// Discover all boundary shards in the shard directory
///
/// # Arguments
/// * `shards_dir` - Directory holding one boundary file per region
///
/// # Returns
/// Manifest of region key -> file path. A missing directory yields an empty
/// manifest; if two files share a stem the `.geojson` one wins.
pub fn discover_shards(shards_dir: &Path) -> ShardManifest {
    let mut shards: BTreeMap<RegionKey, PathBuf> = BTreeMap::new();

    if !shards_dir.is_dir() {
        debug!("Shard directory does not exist: {:?}", shards_dir);
        return ShardManifest::default();
    }

    let entries = match std::fs::read_dir(shards_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read shard directory {:?}: {}", shards_dir, e);
            return ShardManifest::default();
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !is_shard_file(&path) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let region = RegionKey::new(stem);
        let prefer_new = shards
            .get(&region)
            .map(|existing| !has_geojson_extension(existing))
            .unwrap_or(true);
        if prefer_new {
            debug!("Found shard for region '{}' at {:?}", region, path);
            shards.insert(region, path);
        }
    }

    debug!("Discovered {} shards in {:?}", shards.len(), shards_dir);
    ShardManifest { shards }
}

fn has_geojson_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("geojson"))
        .unwrap_or(false)
}
