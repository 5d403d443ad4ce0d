//! Tabular reader implementations for different source formats

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};

use crate::postal::{PostalCode, PostalCodeError};

use super::types::IngestError;

/// A single cell value, as typed as the source format allows
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
}

impl Cell {
    /// Parse a CSV field, which carries no type information
    pub fn from_text(value: &str) -> Self {
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }

    /// Canonical postal code held by this cell, or `None` for a blank cell
    pub fn postal_code(&self) -> Option<Result<PostalCode, PostalCodeError>> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) if text.trim().is_empty() => None,
            Cell::Text(text) => Some(PostalCode::parse(text)),
            Cell::Int(value) => Some(PostalCode::from_integer(*value)),
            Cell::Float(value) => Some(PostalCode::from_float(*value)),
        }
    }

    /// Cell rendered as trimmed text, or `None` for a blank cell
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
            Cell::Int(value) => Some(value.to_string()),
            Cell::Float(value) if value.fract() == 0.0 => Some(format!("{}", *value as i64)),
            Cell::Float(value) => Some(value.to_string()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(value) => Cell::Int(*value),
            Data::Float(value) => Cell::Float(*value),
            Data::String(value) => Cell::from_text(value),
            other => Cell::Text(other.to_string()),
        }
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// Header row plus data rows of one sheet
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Cells of one column; short rows yield `Cell::Empty`
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).unwrap_or(&EMPTY_CELL))
    }
}

/// Trait for reading tabular coverage sources in different formats
pub trait TableReader: Send + Sync {
    /// Check if this reader can handle the given file
    fn can_read(&self, path: &Path) -> bool;

    /// Read one sheet of the file
    fn read(&self, path: &Path, sheet: Option<&str>) -> Result<Table, IngestError>;
}

/// Reader for comma-separated files. A CSV file is a single sheet, so the
/// sheet selector is ignored.
pub struct CsvReader;

impl TableReader for CsvReader {
    fn can_read(&self, path: &Path) -> bool {
        has_extension(path, &["csv"])
    }

    fn read(&self, path: &Path, _sheet: Option<&str>) -> Result<Table, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| IngestError::Unreadable(e.to_string()))?;

        // Fields are decoded lossily so Latin-1 exports still yield their codes
        let headers = reader
            .byte_headers()
            .map_err(|e| IngestError::Unreadable(e.to_string()))?
            .iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect();

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|e| IngestError::Unreadable(e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|field| Cell::from_text(&String::from_utf8_lossy(field)))
                    .collect(),
            );
        }

        Ok(Table { headers, rows })
    }
}

/// Reader for Excel and OpenDocument workbooks
pub struct SpreadsheetReader;

impl SpreadsheetReader {
    /// Pick the sheet to read: the requested one, or the only one there is
    fn select_sheet(names: Vec<String>, sheet: Option<&str>) -> Result<String, IngestError> {
        match sheet {
            Some(wanted) => names
                .iter()
                .find(|name| name.as_str() == wanted)
                .cloned()
                .ok_or_else(|| IngestError::SheetMissing {
                    sheet: wanted.to_string(),
                    available: names.clone(),
                }),
            None => match names.as_slice() {
                [only] => Ok(only.clone()),
                [] => Err(IngestError::Unreadable("workbook has no sheets".into())),
                _ => Err(IngestError::AmbiguousSheet { sheets: names }),
            },
        }
    }
}

impl TableReader for SpreadsheetReader {
    fn can_read(&self, path: &Path) -> bool {
        has_extension(path, &["xlsx", "xlsm", "xlsb", "xls", "ods"])
    }

    fn read(&self, path: &Path, sheet: Option<&str>) -> Result<Table, IngestError> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| IngestError::Unreadable(e.to_string()))?;

        let name = Self::select_sheet(workbook.sheet_names(), sheet)?;
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| IngestError::Unreadable(e.to_string()))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();

        Ok(Table { headers, rows })
    }
}

/// Composite reader that dispatches on file extension
pub struct CompositeTableReader {
    readers: Vec<Box<dyn TableReader>>,
}

impl CompositeTableReader {
    /// Create a new composite reader with default readers
    pub fn new() -> Self {
        Self {
            readers: vec![Box::new(SpreadsheetReader), Box::new(CsvReader)],
        }
    }

    /// Find a reader that can handle the given file
    pub fn find_reader(&self, path: &Path) -> Option<&dyn TableReader> {
        self.readers.iter().find(|r| r.can_read(path)).map(|r| &**r)
    }
}

impl Default for CompositeTableReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableReader for CompositeTableReader {
    fn can_read(&self, path: &Path) -> bool {
        self.readers.iter().any(|r| r.can_read(path))
    }

    fn read(&self, path: &Path, sheet: Option<&str>) -> Result<Table, IngestError> {
        self.find_reader(path)
            .ok_or_else(|| {
                IngestError::UnsupportedFormat(format!(
                    "No reader available for file: {}",
                    path.display()
                ))
            })?
            .read(path, sheet)
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
