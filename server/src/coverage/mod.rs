//! Carrier coverage ingestion
//!
//! Reads one tabular source per manifest entry (spreadsheet or CSV), renames
//! the postal-code column through a fixed alias table and collapses the
//! canonicalized codes into one [`CoverageTable`] per carrier. A source that
//! cannot be used excludes that carrier and is reported as a diagnostic; it
//! never aborts ingestion of the others.

pub mod columns;
pub mod reader;
pub mod store;
pub mod types;

pub use columns::{ColumnAliases, POSTAL_CODE, REGION_KEY};
pub use reader::{Cell, CompositeTableReader, CsvReader, SpreadsheetReader, Table, TableReader};
pub use store::CoverageStore;
pub use types::{CarrierSource, CoverageTable, DiagnosticSubject, IngestDiagnostic, IngestError};
