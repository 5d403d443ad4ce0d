//! Server configuration
//!
//! Configuration is loaded from environment variables. See `.env.example` for documentation.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::coverage::CarrierSource;
use crate::region::index::DEFAULT_PREFIX_LEN;
use crate::region::reader::DEFAULT_CODE_FIELD;

/// Errors that make the configuration unusable
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read carrier manifest {path:?}: {source}")]
    ManifestUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid carrier manifest {path:?}: {source}")]
    ManifestInvalid {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Coverage engine configuration
    pub engine: EngineConfig,
}

/// Inputs of the coverage engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base directory for every input
    pub data_root: PathBuf,
    /// Carrier coverage sources, relative to `data_root`
    pub coverage_dir: PathBuf,
    /// Boundary shard files, relative to `data_root`
    pub shards_dir: PathBuf,
    /// Explicit postal code -> region table, relative to `data_root`
    pub region_table: Option<PathBuf>,
    /// Digits compared by the prefix heuristic when no region table is set
    pub region_prefix_len: usize,
    /// GeoJSON property holding the postal code
    pub boundary_code_field: String,
    /// Polygon simplification tolerance. Trades boundary precision for
    /// smaller shards; unset keeps geometry exact.
    pub simplify_tolerance: Option<f64>,
    /// Carrier sources, in display order. Paths are relative to the coverage dir.
    pub carrier_manifest: Vec<CarrierSource>,
}

/// Carriers served when no manifest file is configured
const DEFAULT_CARRIERS: &[(&str, &str)] = &[
    ("Estafeta", "COBERTURA_ESTAFETA.xlsx"),
    ("Paquete_Express", "COBERTURA_PAQUETEXPRESS.xlsx"),
    ("JyT", "COBERTURA_J&T.xlsx"),
    ("Almex", "COBERTURA_ALMEX.xlsx"),
    ("PMM", "COBERTURA_PMM.xlsx"),
];

const DEFAULT_SHEET: &str = "Hoja1";

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
            coverage_dir: PathBuf::from("Coberturas_Paqueterias"),
            shards_dir: PathBuf::from("Estados"),
            region_table: None,
            region_prefix_len: DEFAULT_PREFIX_LEN,
            boundary_code_field: DEFAULT_CODE_FIELD.to_string(),
            simplify_tolerance: None,
            carrier_manifest: default_manifest(),
        }
    }
}

impl EngineConfig {
    /// Engine rooted at `data_root` with default layout
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    pub fn coverage_path(&self) -> PathBuf {
        self.data_root.join(&self.coverage_dir)
    }

    pub fn shards_path(&self) -> PathBuf {
        self.data_root.join(&self.shards_dir)
    }

    pub fn region_table_path(&self) -> Option<PathBuf> {
        self.region_table.as_ref().map(|p| self.data_root.join(p))
    }
}

/// The five-carrier manifest used when `CARRIER_MANIFEST` is not set
pub fn default_manifest() -> Vec<CarrierSource> {
    DEFAULT_CARRIERS
        .iter()
        .map(|(carrier, file)| CarrierSource::new(carrier, *file, Some(DEFAULT_SHEET)))
        .collect()
}

/// Read a JSON array of `{carrier, path, sheet}` entries
pub fn load_manifest(path: &Path) -> Result<Vec<CarrierSource>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ManifestUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::ManifestInvalid {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Engine inputs
        let engine = &mut config.engine;
        if let Ok(path) = env::var("DATA_ROOT")
            && !path.is_empty()
        {
            engine.data_root = PathBuf::from(path);
        }
        if let Ok(path) = env::var("COVERAGE_DIR")
            && !path.is_empty()
        {
            engine.coverage_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var("SHARDS_DIR")
            && !path.is_empty()
        {
            engine.shards_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var("REGION_TABLE")
            && !path.is_empty()
        {
            engine.region_table = Some(PathBuf::from(path));
        }
        if let Ok(val) = env::var("REGION_PREFIX_LEN")
            && let Ok(len) = val.parse::<usize>()
            && len > 0
        {
            engine.region_prefix_len = len;
        }
        if let Ok(field) = env::var("BOUNDARY_CODE_FIELD")
            && !field.is_empty()
        {
            engine.boundary_code_field = field;
        }
        if let Ok(val) = env::var("GEOMETRY_SIMPLIFY_TOLERANCE")
            && let Ok(tolerance) = val.parse::<f64>()
            && tolerance.is_finite()
            && tolerance > 0.0
        {
            engine.simplify_tolerance = Some(tolerance);
        }

        // Manifest
        if let Ok(path) = env::var("CARRIER_MANIFEST")
            && !path.is_empty()
        {
            engine.carrier_manifest = load_manifest(Path::new(&path))?;
        }

        Ok(config)
    }
}
