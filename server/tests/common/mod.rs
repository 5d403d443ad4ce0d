//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules: an on-disk fixture
//! data root and a router built on top of it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use postal_coverage_server::config::EngineConfig;
use postal_coverage_server::coverage::CarrierSource;
use postal_coverage_server::{AppState, CoverageResolver, app_router};
use serde_json::{Value, json};
use tower::util::ServiceExt;

/// Route test logs through the test harness writer
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("postal_coverage=debug")
        .with_test_writer()
        .try_init();
}

/// Data root under the system temp dir, removed on drop
pub struct FixtureRoot {
    path: PathBuf,
}

impl FixtureRoot {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!(
            "postal_coverage_it_{}",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::create_dir_all(&path).expect("Failed to create fixture root");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create fixture dir");
        }
        std::fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    pub fn write_shard(&self, region: &str, codes: &[&str]) -> PathBuf {
        self.write(&format!("Estados/{}.geojson", region), &shard_geojson(codes))
    }
}

impl Drop for FixtureRoot {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// FeatureCollection with one unit square per postal code
pub fn shard_geojson(codes: &[&str]) -> String {
    let features: Vec<Value> = codes
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let x = i as f64 * 2.0;
            json!({
                "type": "Feature",
                "properties": { "d_codigo": code },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [x, 0.0], [x + 1.0, 0.0], [x + 1.0, 1.0], [x, 1.0], [x, 0.0]
                    ]]
                }
            })
        })
        .collect();

    json!({ "type": "FeatureCollection", "features": features }).to_string()
}

/// Five-carrier data root: three usable sources, one missing file and one
/// source without a postal-code column. Regions "09", "19", "81" and "81A".
pub fn standard_fixture() -> (FixtureRoot, EngineConfig) {
    let root = FixtureRoot::new();

    root.write(
        "Coberturas_Paqueterias/estafeta.csv",
        "C.P.,MUNICIPIO\n09000,Iztapalapa\n09010,Iztapalapa\n81200,Los Mochis\n",
    );
    root.write(
        "Coberturas_Paqueterias/paquete_express.csv",
        "C.P Destino,Estado\n 64000 ,Nuevo Leon\n9010,CDMX\n",
    );
    root.write("Coberturas_Paqueterias/jyt.csv", "POSTAL\n64000\n64010\n");
    root.write(
        "Coberturas_Paqueterias/almex.csv",
        "CIUDAD,ESTADO\nMonterrey,Nuevo Leon\n",
    );

    root.write_shard("09", &["09000", "09010", "09020"]);
    root.write_shard("19", &["64000", "64010"]);
    root.write_shard("81", &["81200"]);
    root.write_shard("81A", &["81250"]);

    let mut config = EngineConfig::with_data_root(root.path());
    config.carrier_manifest = vec![
        CarrierSource::new("Estafeta", "estafeta.csv", None),
        CarrierSource::new("Paquete_Express", "paquete_express.csv", None),
        CarrierSource::new("JyT", "jyt.csv", None),
        CarrierSource::new("Almex", "almex.csv", None),
        CarrierSource::new("PMM", "pmm.csv", None),
    ];

    (root, config)
}

/// Router over an engine built from `config`
pub fn create_test_app(config: &EngineConfig) -> Router {
    init_tracing();
    let engine = CoverageResolver::from_config(config);
    app_router(AppState::new(Arc::new(engine)))
}

/// Issue a GET and decode the JSON body
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
