//! Test Utilities Module
//!
//! Fixture helpers for unit tests: throwaway data directories and small
//! GeoJSON shard builders. This module is only compiled when running tests.

#![cfg(test)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_xlsxwriter::Workbook;
use serde_json::json;

use crate::postal::RegionKey;
use crate::region::{GeoJsonShardReader, GeometryShard, ShardError, ShardReader};

// ============================================================================
// Temporary directories
// ============================================================================

/// Directory under the system temp dir, removed on drop
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "postal_coverage_{}_{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).expect("Failed to create temp dir");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file relative to the temp dir, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        self.write_bytes(relative, contents.as_bytes())
    }

    /// Write raw bytes, for fixtures that are not valid UTF-8
    pub fn write_bytes(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, contents).expect("Failed to write fixture");
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

// ============================================================================
// Workbook fixtures
// ============================================================================

/// Coverage workbook shaped like a carrier export: a leading "Notas" sheet
/// and the data on "Hoja1". Codes are a numeric cell with its leading zero
/// dropped, a padded text cell, a boolean and a blank row.
pub fn write_coverage_workbook(dir: &TempDir, relative: &str) -> PathBuf {
    let path = dir.path().join(relative);
    let mut workbook = Workbook::new();

    let notes = workbook.add_worksheet();
    notes.set_name("Notas").unwrap();
    notes.write_string(0, 0, "Cobertura vigente").unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Hoja1").unwrap();
    sheet.write_string(0, 0, "C.P.").unwrap();
    sheet.write_string(0, 1, "MUNICIPIO").unwrap();
    sheet.write_number(1, 0, 6100.0).unwrap();
    sheet.write_string(1, 1, "Cuauhtémoc").unwrap();
    sheet.write_string(2, 0, " 09000 ").unwrap();
    sheet.write_string(2, 1, "Iztapalapa").unwrap();
    sheet.write_boolean(3, 0, true).unwrap();
    sheet.write_string(5, 1, "Sin código").unwrap();

    workbook.save(&path).expect("Failed to write workbook");
    path
}

// ============================================================================
// GeoJSON fixtures
// ============================================================================

/// Unit square polygon with its lower-left corner at (x, y)
pub fn square(x: f64, y: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[x, y], [x + 1.0, y], [x + 1.0, y + 1.0], [x, y + 1.0], [x, y]]]
    })
}

/// FeatureCollection with one unit square per postal code, keyed by `d_codigo`
pub fn shard_geojson(codes: &[&str]) -> String {
    let features: Vec<_> = codes
        .iter()
        .enumerate()
        .map(|(i, code)| {
            json!({
                "type": "Feature",
                "properties": { "d_codigo": code },
                "geometry": square(i as f64 * 2.0, 0.0)
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features }).to_string()
}

// ============================================================================
// Shard reader doubles
// ============================================================================

/// Shard reader that counts how many times it parsed a file
pub struct CountingReader {
    inner: GeoJsonShardReader,
    pub reads: Arc<AtomicUsize>,
}

impl CountingReader {
    pub fn new() -> Self {
        Self {
            inner: GeoJsonShardReader::default(),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ShardReader for CountingReader {
    fn read(&self, region: &RegionKey, path: &Path) -> Result<GeometryShard, ShardError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers can overlap
        std::thread::sleep(std::time::Duration::from_millis(50));
        self.inner.read(region, path)
    }
}
