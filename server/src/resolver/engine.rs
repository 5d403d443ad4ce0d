//! Coverage query engine backed by local coverage tables and boundary shards

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::coverage::{
    CompositeTableReader, CoverageStore, DiagnosticSubject, IngestDiagnostic,
};
use crate::postal::{CarrierId, PostalCode, RegionKey};
use crate::region::{
    GeoJsonShardReader, PostalRegionIndex, RegionMatch, RegionShardCache, RegionTable,
    ShardReader, discover_shards,
};

use super::service::CoverageService;
use super::types::{
    CarrierRegionCoverage, CarrierSummary, DiagnosticView, EngineStats, LookupError,
    RegionGeometry, RegionSummary,
};

/// Answers coverage and geometry queries for one process.
///
/// Coverage tables, the shard manifest and the region index are fixed at
/// construction; only the shard cache fills in as regions are queried.
pub struct CoverageResolver {
    store: CoverageStore,
    shards: RegionShardCache,
    index: PostalRegionIndex,
    diagnostics: Vec<IngestDiagnostic>,
}

impl CoverageResolver {
    pub fn new(
        store: CoverageStore,
        shards: RegionShardCache,
        index: PostalRegionIndex,
        diagnostics: Vec<IngestDiagnostic>,
    ) -> Self {
        Self {
            store,
            shards,
            index,
            diagnostics,
        }
    }

    /// Ingest every configured input and build the engine.
    ///
    /// Missing or malformed inputs never fail construction; they end up in
    /// [`CoverageService::diagnostics`] and in the tagged results of queries.
    pub fn from_config(config: &EngineConfig) -> Self {
        let tables = CompositeTableReader::new();
        let (store, mut diagnostics) = CoverageStore::ingest_with_reader(
            &config.carrier_manifest,
            &config.coverage_path(),
            &tables,
        );

        let manifest = discover_shards(&config.shards_path());
        if manifest.is_empty() {
            warn!(
                "No boundary shards found in {:?}; geometry lookups will fail",
                config.shards_path()
            );
        }

        let index = match config.region_table_path() {
            Some(path) => match RegionTable::load(&tables, &path, None) {
                Ok(table) => PostalRegionIndex::from_table(table),
                Err(error) => {
                    warn!("Region table {:?} is unusable: {}", path, error);
                    let index = PostalRegionIndex::unusable_table(error.to_string());
                    diagnostics.push(IngestDiagnostic {
                        subject: DiagnosticSubject::RegionTable,
                        source: path,
                        error,
                    });
                    index
                }
            },
            None => {
                info!(
                    "No region table configured; resolving regions by {}-digit prefix (best effort)",
                    config.region_prefix_len
                );
                PostalRegionIndex::prefix(manifest.keys().cloned(), config.region_prefix_len)
            }
        };

        let reader: Arc<dyn ShardReader> = Arc::new(GeoJsonShardReader::new(
            config.boundary_code_field.clone(),
            config.simplify_tolerance,
        ));
        let shards = RegionShardCache::new(manifest, reader);

        Self::new(store, shards, index, diagnostics)
    }

    pub fn store(&self) -> &CoverageStore {
        &self.store
    }

    pub fn shards(&self) -> &RegionShardCache {
        &self.shards
    }

    fn record_query(kind: &'static str, outcome: &'static str) {
        counter!("coverage_queries_total", "query" => kind, "outcome" => outcome).increment(1);
    }

    fn outcome<T>(result: &Result<T, LookupError>) -> &'static str {
        match result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        }
    }

    async fn lookup_geometry(&self, code: &PostalCode) -> Result<RegionGeometry, LookupError> {
        let matched = self.resolve_region(code)?;
        let shard = self.shards.shard_for(&matched.region).await?;
        let record = shard
            .get(code)
            .cloned()
            .ok_or_else(|| LookupError::CodeNotInShard {
                code: code.clone(),
                region: matched.region.clone(),
            })?;

        Ok(RegionGeometry {
            code: code.clone(),
            region: matched,
            record,
        })
    }

    async fn lookup_region_coverage(
        &self,
        carrier: &CarrierId,
        region: &RegionKey,
    ) -> Result<CarrierRegionCoverage, LookupError> {
        let codes = self
            .store
            .codes_for(carrier.as_str())
            .ok_or_else(|| LookupError::UnknownCarrier(carrier.to_string()))?;
        let shard = self.shards.shard_for(region).await?;

        // Walk the smaller side; both are ordered by postal code.
        let records = if shard.len() <= codes.len() {
            shard
                .records
                .values()
                .filter(|record| codes.contains(&record.code))
                .cloned()
                .collect()
        } else {
            codes
                .iter()
                .filter_map(|code| shard.get(code).cloned())
                .collect()
        };

        Ok(CarrierRegionCoverage {
            carrier: carrier.clone(),
            region: region.clone(),
            records,
        })
    }
}

#[async_trait]
impl CoverageService for CoverageResolver {
    fn carriers(&self) -> Vec<CarrierSummary> {
        self.store
            .carriers()
            .map(|(carrier, table)| CarrierSummary {
                carrier: carrier.clone(),
                postal_codes: table.len(),
                skipped_rows: table.skipped_rows,
                sources: table
                    .sources
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
            })
            .collect()
    }

    fn regions(&self) -> Vec<RegionSummary> {
        let manifest = self.shards.manifest();
        manifest
            .keys()
            .map(|region| RegionSummary {
                region: region.clone(),
                source: manifest
                    .path_for(region)
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                loaded: self.shards.is_loaded(region),
            })
            .collect()
    }

    fn diagnostics(&self) -> Vec<DiagnosticView> {
        self.diagnostics
            .iter()
            .map(|d| DiagnosticView {
                subject: d.subject.clone(),
                source: d.source.display().to_string(),
                code: d.error.code().to_string(),
                error: d.error.to_string(),
            })
            .collect()
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            carriers: self.store.carrier_count(),
            postal_codes: self.store.code_count(),
            regions: self.shards.manifest().len(),
            shards_loaded: self.shards.loaded_count(),
            shard_parses: self.shards.load_count(),
            diagnostics: self.diagnostics.len(),
            region_strategy: self.index.strategy_name(),
        }
    }

    fn has_carrier(&self, carrier: &CarrierId) -> bool {
        self.store.contains_carrier(carrier.as_str())
    }

    fn carriers_covering(&self, code: &PostalCode) -> BTreeSet<CarrierId> {
        let carriers = self.store.coverage_of(code);
        Self::record_query(
            "carriers",
            if carriers.is_empty() { "empty" } else { "ok" },
        );
        carriers
    }

    fn resolve_region(&self, code: &PostalCode) -> Result<RegionMatch, LookupError> {
        Ok(self.index.resolve(code)?)
    }

    async fn region_geometry_for(&self, code: &PostalCode) -> Result<RegionGeometry, LookupError> {
        let result = self.lookup_geometry(code).await;
        Self::record_query("geometry", Self::outcome(&result));
        if let Err(e) = &result {
            debug!("Geometry lookup for {} failed: {}", code, e);
        }
        result
    }

    async fn carrier_coverage_in_region(
        &self,
        carrier: &CarrierId,
        region: &RegionKey,
    ) -> Result<CarrierRegionCoverage, LookupError> {
        let result = self.lookup_region_coverage(carrier, region).await;
        Self::record_query("carrier_region", Self::outcome(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CarrierSource;
    use crate::region::{MatchBasis, ShardError, Unresolved};
    use crate::test_utils::{TempDir, shard_geojson};

    fn code(raw: &str) -> PostalCode {
        PostalCode::parse(raw).unwrap()
    }

    /// Two carriers, regions "09" and "19", prefix resolution
    fn fixture(name: &str) -> (TempDir, EngineConfig) {
        let dir = TempDir::new(name);
        dir.write(
            "Coberturas_Paqueterias/estafeta.csv",
            "C.P.,MUNICIPIO\n09000,Iztapalapa\n9010,Iztapalapa\n64000,Monterrey\n",
        );
        dir.write("Coberturas_Paqueterias/pmm.csv", "POSTAL\n64000\n64010\n");
        dir.write(
            "Estados/09.geojson",
            &shard_geojson(&["09000", "09010", "09020"]),
        );
        dir.write("Estados/19.geojson", &shard_geojson(&["64000", "64010"]));

        let mut config = EngineConfig::with_data_root(dir.path());
        config.carrier_manifest = vec![
            CarrierSource::new("Estafeta", "estafeta.csv", None),
            CarrierSource::new("PMM", "pmm.csv", None),
        ];
        (dir, config)
    }

    #[test]
    fn test_carriers_covering() {
        let (_dir, config) = fixture("engine_carriers");
        let engine = CoverageResolver::from_config(&config);

        let covering = engine.carriers_covering(&code("64000"));
        let names: Vec<&str> = covering.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, ["Estafeta", "PMM"]);
        assert_eq!(
            engine.carriers_covering(&code("9010")),
            BTreeSet::from([CarrierId::new("Estafeta")])
        );
        assert!(engine.carriers_covering(&code("11000")).is_empty());
    }

    #[tokio::test]
    async fn test_region_geometry_for_failure_causes() {
        let (dir, config) = fixture("engine_geometry");
        dir.write("Estados/07.geojson", "not geojson");
        let engine = CoverageResolver::from_config(&config);

        let found = engine.region_geometry_for(&code("09000")).await.unwrap();
        assert_eq!(found.region.region.as_str(), "09");
        assert_eq!(found.record.code, code("09000"));
        assert!(found.record.centroid.is_some());

        assert!(matches!(
            engine.region_geometry_for(&code("99999")).await,
            Err(LookupError::CodeUnresolved(Unresolved::NoPrefixMatch { .. }))
        ));
        assert!(matches!(
            engine.region_geometry_for(&code("07100")).await,
            Err(LookupError::ShardUnavailable(ShardError::Parse { .. }))
        ));
        assert_eq!(
            engine.region_geometry_for(&code("09999")).await,
            Err(LookupError::CodeNotInShard {
                code: code("09999"),
                region: RegionKey::new("09"),
            })
        );
    }

    #[tokio::test]
    async fn test_carrier_coverage_is_scoped_to_region() {
        let (_dir, config) = fixture("engine_region_coverage");
        let engine = CoverageResolver::from_config(&config);

        let coverage = engine
            .carrier_coverage_in_region(&CarrierId::new("Estafeta"), &RegionKey::new("09"))
            .await
            .unwrap();
        let codes: Vec<&str> = coverage.records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, ["09000", "09010"]);
        // Region 19 was never touched.
        assert!(!engine.shards().is_loaded(&RegionKey::new("19")));

        assert_eq!(
            engine
                .carrier_coverage_in_region(&CarrierId::new("DHL"), &RegionKey::new("09"))
                .await,
            Err(LookupError::UnknownCarrier("DHL".into()))
        );
        assert!(matches!(
            engine
                .carrier_coverage_in_region(&CarrierId::new("PMM"), &RegionKey::new("31"))
                .await,
            Err(LookupError::ShardUnavailable(ShardError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_coverage_report() {
        let (_dir, config) = fixture("engine_report");
        let engine = CoverageResolver::from_config(&config);
        let pmm = CarrierId::new("PMM");

        let report = engine
            .coverage_report(&code("09000"), Some(&pmm))
            .await
            .unwrap();
        assert_eq!(report.carriers, BTreeSet::from([CarrierId::new("Estafeta")]));
        assert!(report.geometry.is_ok());
        let selection = report.selection.unwrap();
        assert!(!selection.covers_code);
        assert!(selection.region_coverage.unwrap().records.is_empty());

        let unresolved = engine.coverage_report(&code("99999"), None).await.unwrap();
        assert!(unresolved.carriers.is_empty());
        assert!(unresolved.selection.is_none());
        assert_eq!(unresolved.geometry.unwrap_err().code(), "code_unresolved");

        assert_eq!(
            engine
                .coverage_report(&code("09000"), Some(&CarrierId::new("DHL")))
                .await,
            Err(LookupError::UnknownCarrier("DHL".into()))
        );
    }

    #[tokio::test]
    async fn test_explicit_region_table() {
        let (dir, mut config) = fixture("engine_region_table");
        dir.write("cp_estado.csv", "CP,ESTADO\n64000,19\n09000,09\n");
        config.region_table = Some("cp_estado.csv".into());
        let engine = CoverageResolver::from_config(&config);

        let found = engine.region_geometry_for(&code("64000")).await.unwrap();
        assert_eq!(found.region.basis, MatchBasis::ExplicitTable);
        // 09010 has a boundary but no table entry: no prefix fallback.
        assert!(matches!(
            engine.region_geometry_for(&code("09010")).await,
            Err(LookupError::CodeUnresolved(Unresolved::NotInTable { .. }))
        ));
        assert_eq!(engine.stats().region_strategy, "explicit_table");
    }

    #[tokio::test]
    async fn test_unusable_region_table_is_reported() {
        let (dir, mut config) = fixture("engine_bad_region_table");
        dir.write("cp_estado.csv", "CP,MUNICIPIO\n64000,Monterrey\n");
        config.region_table = Some("cp_estado.csv".into());
        let engine = CoverageResolver::from_config(&config);

        assert!(matches!(
            engine.region_geometry_for(&code("64000")).await,
            Err(LookupError::CodeUnresolved(Unresolved::TableUnusable { .. }))
        ));
        let diagnostics = engine.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].subject, DiagnosticSubject::RegionTable);
        assert_eq!(diagnostics[0].code, "schema_invalid");
    }

    #[tokio::test]
    async fn test_catalog_and_stats() {
        let (_dir, mut config) = fixture("engine_catalog");
        config
            .carrier_manifest
            .push(CarrierSource::new("Almex", "almex.csv", None));
        let engine = CoverageResolver::from_config(&config);

        let carriers = engine.carriers();
        assert_eq!(carriers.len(), 2);
        assert_eq!(carriers[0].carrier.as_str(), "Estafeta");
        assert_eq!(carriers[0].postal_codes, 3);

        engine.region_geometry_for(&code("09000")).await.unwrap();
        let regions = engine.regions();
        let loaded: Vec<(&str, bool)> = regions
            .iter()
            .map(|r| (r.region.as_str(), r.loaded))
            .collect();
        assert_eq!(loaded, [("09", true), ("19", false)]);

        let stats = engine.stats();
        assert_eq!(stats.carriers, 2);
        assert_eq!(stats.postal_codes, 4);
        assert_eq!(stats.regions, 2);
        assert_eq!(stats.shards_loaded, 1);
        assert_eq!(stats.shard_parses, 1);
        assert_eq!(stats.diagnostics, 1);
        assert_eq!(stats.region_strategy, "prefix_heuristic");
        assert_eq!(engine.diagnostics()[0].code, "source_missing");
    }
}
