//! Region shard types and error definitions

use std::collections::BTreeMap;
use std::path::PathBuf;

use geo_types::{MultiPolygon, Point};
use thiserror::Error;

use crate::postal::{PostalCode, RegionKey};

/// Errors that can occur when loading a geometry shard
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShardError {
    #[error("No geometry shard available for region {region}")]
    NotFound { region: RegionKey },

    #[error("Failed to parse geometry shard for region {region}: {reason}")]
    Parse { region: RegionKey, reason: String },
}

/// Boundary of one postal code
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub code: PostalCode,
    /// Every polygon the shard lists for this code
    pub geometry: MultiPolygon<f64>,
    /// Centroid of `geometry`, `None` when the geometry is empty
    pub centroid: Option<Point<f64>>,
}

/// Geometry for one region, loaded from a single boundary file
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryShard {
    pub region: RegionKey,
    pub source: PathBuf,
    pub records: BTreeMap<PostalCode, BoundaryRecord>,
    /// Features dropped because they had no usable postal code or polygon
    pub skipped_features: usize,
    /// Simplification tolerance the shard was loaded with
    pub tolerance: Option<f64>,
}

impl GeometryShard {
    pub fn get(&self, code: &PostalCode) -> Option<&BoundaryRecord> {
        self.records.get(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &PostalCode> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
