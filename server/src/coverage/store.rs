//! In-memory coverage store with a postal-code inverted index

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::postal::{CarrierId, PostalCode};

use super::columns::POSTAL_CODE;
use super::reader::{CompositeTableReader, TableReader};
use super::types::{CarrierSource, CoverageTable, DiagnosticSubject, IngestDiagnostic, IngestError};

/// One coverage table per carrier, read-only once built.
///
/// Carriers keep manifest order. Several manifest entries for the same carrier
/// are merged into one table.
#[derive(Debug, Default)]
pub struct CoverageStore {
    tables: IndexMap<CarrierId, CoverageTable>,
    /// postal code -> carriers covering it
    inverted: HashMap<PostalCode, BTreeSet<CarrierId>>,
}

/// Codes extracted from one source
struct SourceCodes {
    codes: BTreeSet<PostalCode>,
    skipped_rows: usize,
}

impl CoverageStore {
    /// Ingest every manifest entry with the default spreadsheet/CSV readers.
    ///
    /// Relative source paths are resolved against `base_dir`. Sources that
    /// cannot be used are returned as diagnostics and their carrier is left out.
    pub fn ingest(
        manifest: &[CarrierSource],
        base_dir: &Path,
    ) -> (Self, Vec<IngestDiagnostic>) {
        Self::ingest_with_reader(manifest, base_dir, &CompositeTableReader::new())
    }

    pub fn ingest_with_reader(
        manifest: &[CarrierSource],
        base_dir: &Path,
        reader: &dyn TableReader,
    ) -> (Self, Vec<IngestDiagnostic>) {
        let mut tables: IndexMap<CarrierId, CoverageTable> = IndexMap::new();
        let mut diagnostics = Vec::new();

        for entry in manifest {
            let path = resolve_path(base_dir, &entry.path);

            match read_source(reader, &path, entry.sheet.as_deref()) {
                Ok(source) => {
                    debug!(
                        "Read {} postal codes for '{}' from {:?} ({} rows skipped)",
                        source.codes.len(),
                        entry.carrier,
                        path,
                        source.skipped_rows
                    );
                    let table = tables.entry(entry.carrier.clone()).or_default();
                    table.codes.extend(source.codes);
                    table.skipped_rows += source.skipped_rows;
                    table.sources.push(path);
                }
                Err(error) => {
                    warn!(
                        "Excluding coverage source for '{}' at {:?}: {}",
                        entry.carrier, path, error
                    );
                    diagnostics.push(IngestDiagnostic {
                        subject: DiagnosticSubject::Carrier(entry.carrier.clone()),
                        source: path,
                        error,
                    });
                }
            }
        }

        let store = Self::from_tables(tables);
        info!(
            "Coverage store ready: {} carriers, {} distinct postal codes, {} sources excluded",
            store.tables.len(),
            store.inverted.len(),
            diagnostics.len()
        );

        (store, diagnostics)
    }

    /// Build a store from already-canonical tables, computing the inverted index
    pub fn from_tables(tables: IndexMap<CarrierId, CoverageTable>) -> Self {
        let mut inverted: HashMap<PostalCode, BTreeSet<CarrierId>> = HashMap::new();
        for (carrier, table) in &tables {
            for code in &table.codes {
                inverted
                    .entry(code.clone())
                    .or_default()
                    .insert(carrier.clone());
            }
        }
        Self { tables, inverted }
    }

    /// Postal codes covered by a carrier, or `None` for a carrier that is not loaded
    pub fn codes_for(&self, carrier: &str) -> Option<&BTreeSet<PostalCode>> {
        self.tables.get(carrier).map(|t| &t.codes)
    }

    /// Carriers covering a postal code; empty when nobody covers it
    pub fn coverage_of(&self, code: &PostalCode) -> BTreeSet<CarrierId> {
        self.inverted.get(code).cloned().unwrap_or_default()
    }

    pub fn table(&self, carrier: &str) -> Option<&CoverageTable> {
        self.tables.get(carrier)
    }

    /// Loaded carriers in manifest order
    pub fn carriers(&self) -> impl Iterator<Item = (&CarrierId, &CoverageTable)> {
        self.tables.iter()
    }

    pub fn contains_carrier(&self, carrier: &str) -> bool {
        self.tables.contains_key(carrier)
    }

    pub fn carrier_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of distinct postal codes covered by at least one carrier
    pub fn code_count(&self) -> usize {
        self.inverted.len()
    }
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_source(
    reader: &dyn TableReader,
    path: &Path,
    sheet: Option<&str>,
) -> Result<SourceCodes, IngestError> {
    if !path.is_file() {
        return Err(IngestError::SourceMissing {
            path: path.to_path_buf(),
        });
    }

    let table = reader.read(path, sheet)?;
    let column = POSTAL_CODE
        .find(&table.headers)
        .ok_or_else(|| IngestError::SchemaInvalid {
            column: POSTAL_CODE.canonical().to_string(),
            found: table.headers.clone(),
        })?;

    let mut codes = BTreeSet::new();
    let mut skipped_rows = 0;
    for cell in table.column(column) {
        match cell.postal_code() {
            Some(Ok(code)) => {
                codes.insert(code);
            }
            Some(Err(e)) => {
                debug!("Skipping row in {:?}: {}", path, e);
                skipped_rows += 1;
            }
            None => {}
        }
    }

    Ok(SourceCodes {
        codes,
        skipped_rows,
    })
}
