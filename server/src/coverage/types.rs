//! Coverage-related types and error definitions

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::postal::{CarrierId, PostalCode};

/// Reasons a tabular source could not be ingested
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("Source file not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("Sheet {sheet:?} not found (available: {available:?})")]
    SheetMissing {
        sheet: String,
        available: Vec<String>,
    },

    #[error("No sheet selected and workbook has several: {sheets:?}")]
    AmbiguousSheet { sheets: Vec<String> },

    #[error("Failed to read source: {0}")]
    Unreadable(String),

    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing {column} column (found: {found:?})")]
    SchemaInvalid { column: String, found: Vec<String> },
}

impl IngestError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::SourceMissing { .. } | IngestError::SheetMissing { .. } => {
                "source_missing"
            }
            IngestError::AmbiguousSheet { .. } => "ambiguous_sheet",
            IngestError::Unreadable(_) => "unreadable",
            IngestError::UnsupportedFormat(_) => "unsupported_format",
            IngestError::SchemaInvalid { .. } => "schema_invalid",
        }
    }
}

/// One entry of the carrier manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierSource {
    /// Carrier the source declares coverage for
    pub carrier: CarrierId,
    /// Path to the tabular file, relative to the coverage directory unless absolute
    pub path: PathBuf,
    /// Sheet to read when the file is a multi-sheet workbook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl CarrierSource {
    pub fn new(carrier: &str, path: impl Into<PathBuf>, sheet: Option<&str>) -> Self {
        Self {
            carrier: CarrierId::new(carrier),
            path: path.into(),
            sheet: sheet.map(str::to_string),
        }
    }
}

/// What an ingestion diagnostic is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DiagnosticSubject {
    Carrier(CarrierId),
    RegionTable,
}

/// A source that was excluded during ingestion, and why
#[derive(Debug, Clone, PartialEq)]
pub struct IngestDiagnostic {
    pub subject: DiagnosticSubject,
    pub source: PathBuf,
    pub error: IngestError,
}

/// Deduplicated set of canonical postal codes one carrier declares it serves
#[derive(Debug, Clone, Default)]
pub struct CoverageTable {
    pub codes: BTreeSet<PostalCode>,
    /// Sources merged into this table
    pub sources: Vec<PathBuf>,
    /// Non-empty rows whose postal code could not be canonicalized
    pub skipped_rows: usize,
}

impl CoverageTable {
    pub fn contains(&self, code: &PostalCode) -> bool {
        self.codes.contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
