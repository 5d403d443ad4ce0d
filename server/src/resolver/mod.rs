//! Coverage query module
//!
//! This module provides:
//! - `CoverageService` trait for abstracting the query engine
//! - `CoverageResolver`, the engine over local coverage tables and boundary shards
//! - HTTP routes exposing the queries

mod engine;
pub mod routes;
mod service;
mod types;

pub use engine::CoverageResolver;
pub use routes::{CoverageErrorResponse, coverage_routes};
pub use service::CoverageService;
pub use types::{
    CarrierRegionCoverage, CarrierSelection, CarrierSummary, CoverageReport, DiagnosticView,
    EngineStats, LookupError, RegionGeometry, RegionSummary,
};
