//! Query results and lookup error definitions

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::coverage::DiagnosticSubject;
use crate::postal::{CarrierId, PostalCode, RegionKey};
use crate::region::{BoundaryRecord, RegionMatch, ShardError, Unresolved};

/// Errors returned by coverage and geometry queries
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("{0}")]
    CodeUnresolved(#[from] Unresolved),

    #[error("{0}")]
    ShardUnavailable(#[from] ShardError),

    #[error("Postal code {code} has no boundary in region {region}")]
    CodeNotInShard { code: PostalCode, region: RegionKey },

    #[error("Unknown carrier: {0}")]
    UnknownCarrier(String),
}

impl LookupError {
    /// Stable machine-readable cause
    pub fn code(&self) -> &'static str {
        match self {
            LookupError::CodeUnresolved(_) => "code_unresolved",
            LookupError::ShardUnavailable(_) => "shard_unavailable",
            LookupError::CodeNotInShard { .. } => "code_not_in_shard",
            LookupError::UnknownCarrier(_) => "unknown_carrier",
        }
    }
}

/// Boundary of one postal code plus the region it was found in
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGeometry {
    pub code: PostalCode,
    pub region: RegionMatch,
    pub record: BoundaryRecord,
}

/// A carrier's covered boundaries inside one region
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierRegionCoverage {
    pub carrier: CarrierId,
    pub region: RegionKey,
    /// Sorted by postal code
    pub records: Vec<BoundaryRecord>,
}

/// Selected-carrier part of a [`CoverageReport`]
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierSelection {
    pub carrier: CarrierId,
    pub covers_code: bool,
    pub region_coverage: Result<CarrierRegionCoverage, LookupError>,
}

/// Everything known about one postal code, for display
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub code: PostalCode,
    pub carriers: BTreeSet<CarrierId>,
    pub geometry: Result<RegionGeometry, LookupError>,
    pub selection: Option<CarrierSelection>,
}

/// Catalog entry for a loaded carrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarrierSummary {
    pub carrier: CarrierId,
    pub postal_codes: usize,
    pub skipped_rows: usize,
    pub sources: Vec<String>,
}

/// Catalog entry for a known region
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionSummary {
    pub region: RegionKey,
    pub source: String,
    pub loaded: bool,
}

/// Ingestion diagnostic in a serializable shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticView {
    pub subject: DiagnosticSubject,
    pub source: String,
    pub code: String,
    pub error: String,
}

/// Engine-wide counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub carriers: usize,
    pub postal_codes: usize,
    pub regions: usize,
    pub shards_loaded: usize,
    pub shard_parses: u64,
    pub diagnostics: usize,
    pub region_strategy: &'static str,
}
