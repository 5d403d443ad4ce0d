//! Postal Coverage Server Library
//!
//! This module exports the engine components for use in integration tests
//! and external tooling.

pub mod config;
pub mod coverage;
pub mod postal;
pub mod region;
pub mod resolver;
pub mod server;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use coverage::CoverageStore;
pub use postal::{CarrierId, PostalCode, RegionKey};
pub use region::{PostalRegionIndex, RegionShardCache};
pub use resolver::{CoverageResolver, CoverageService, LookupError};
pub use server::{AppState, app_router};
