//! CoverageService trait definition

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::postal::{CarrierId, PostalCode, RegionKey};
use crate::region::RegionMatch;

use super::types::{
    CarrierRegionCoverage, CarrierSelection, CarrierSummary, CoverageReport, DiagnosticView,
    EngineStats, LookupError, RegionGeometry, RegionSummary,
};

/// Trait for coverage query engines
#[async_trait]
pub trait CoverageService: Send + Sync {
    /// Loaded carriers in manifest order
    fn carriers(&self) -> Vec<CarrierSummary>;

    /// Known regions in key order
    fn regions(&self) -> Vec<RegionSummary>;

    /// Sources excluded at startup
    fn diagnostics(&self) -> Vec<DiagnosticView>;

    fn stats(&self) -> EngineStats;

    fn has_carrier(&self, carrier: &CarrierId) -> bool;

    /// Carriers covering a postal code. An empty set means no coverage.
    fn carriers_covering(&self, code: &PostalCode) -> BTreeSet<CarrierId>;

    /// Region whose shard should hold the code's boundary
    fn resolve_region(&self, code: &PostalCode) -> Result<RegionMatch, LookupError>;

    /// Boundary of a postal code, loading its region shard if needed
    async fn region_geometry_for(&self, code: &PostalCode) -> Result<RegionGeometry, LookupError>;

    /// Boundaries of every code a carrier covers within one region
    async fn carrier_coverage_in_region(
        &self,
        carrier: &CarrierId,
        region: &RegionKey,
    ) -> Result<CarrierRegionCoverage, LookupError>;

    /// Combined view of one postal code, optionally focused on one carrier.
    ///
    /// Geometry failures are part of the report; only an unknown selected
    /// carrier fails the whole call.
    async fn coverage_report(
        &self,
        code: &PostalCode,
        carrier: Option<&CarrierId>,
    ) -> Result<CoverageReport, LookupError> {
        if let Some(carrier) = carrier
            && !self.has_carrier(carrier)
        {
            return Err(LookupError::UnknownCarrier(carrier.to_string()));
        }

        let carriers = self.carriers_covering(code);
        let geometry = self.region_geometry_for(code).await;

        let selection = match carrier {
            Some(carrier) => {
                let region_coverage = match self.resolve_region(code) {
                    Ok(matched) => {
                        self.carrier_coverage_in_region(carrier, &matched.region)
                            .await
                    }
                    Err(e) => Err(e),
                };
                Some(CarrierSelection {
                    carrier: carrier.clone(),
                    covers_code: carriers.contains(carrier),
                    region_coverage,
                })
            }
            None => None,
        };

        Ok(CoverageReport {
            code: code.clone(),
            carriers,
            geometry,
            selection,
        })
    }
}
