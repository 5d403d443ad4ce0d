//! Postal code -> region key resolution
//!
//! Two strategies, chosen at construction:
//! - an explicit table mapping each postal code to its region (authoritative);
//! - a best-effort prefix heuristic matching the code's leading digits against
//!   the available region keys, used only when no table is configured.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::coverage::{IngestError, POSTAL_CODE, REGION_KEY, TableReader};
use crate::postal::{PostalCode, RegionKey};

/// Default number of leading digits compared by the prefix heuristic
pub const DEFAULT_PREFIX_LEN: usize = 2;

/// Why a postal code could not be mapped to a region
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unresolved {
    #[error("Postal code {code} is not in the region table")]
    NotInTable { code: PostalCode },

    #[error("Region table is unusable ({reason}); postal code {code} cannot be mapped")]
    TableUnusable { code: PostalCode, reason: String },

    #[error("No region key starts with {prefix:?} (postal code {code})")]
    NoPrefixMatch { code: PostalCode, prefix: String },
}

/// How a region was chosen for a postal code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MatchBasis {
    /// Exact entry in the explicit region table
    ExplicitTable,
    /// First region key, in sorted order, starting with the code's prefix.
    /// `ambiguous_with` lists the other keys that matched as well.
    Prefix {
        prefix: String,
        ambiguous_with: Vec<RegionKey>,
    },
}

/// A resolved region plus how it was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionMatch {
    pub region: RegionKey,
    pub basis: MatchBasis,
}

impl RegionMatch {
    /// False for prefix matches that had competing candidates
    pub fn is_confident(&self) -> bool {
        match &self.basis {
            MatchBasis::ExplicitTable => true,
            MatchBasis::Prefix { ambiguous_with, .. } => ambiguous_with.is_empty(),
        }
    }
}

/// Explicit postal code -> region key table
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    entries: HashMap<PostalCode, RegionKey>,
}

impl RegionTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (PostalCode, RegionKey)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Load a two-column table (postal code, region key) from a tabular file.
    ///
    /// Rows with a malformed code or a blank region are skipped. When a code
    /// appears twice the first row wins.
    pub fn load(
        reader: &dyn TableReader,
        path: &Path,
        sheet: Option<&str>,
    ) -> Result<Self, IngestError> {
        if !path.is_file() {
            return Err(IngestError::SourceMissing {
                path: path.to_path_buf(),
            });
        }

        let table = reader.read(path, sheet)?;
        let missing = |column: &str| IngestError::SchemaInvalid {
            column: column.to_string(),
            found: table.headers.clone(),
        };
        let code_column = POSTAL_CODE
            .find(&table.headers)
            .ok_or_else(|| missing(POSTAL_CODE.canonical()))?;
        let region_column = REGION_KEY
            .find(&table.headers)
            .ok_or_else(|| missing(REGION_KEY.canonical()))?;

        let mut entries = HashMap::new();
        let mut skipped = 0usize;
        for row in &table.rows {
            let cell = |index: usize| row.get(index);
            let code = cell(code_column).and_then(|c| c.postal_code());
            let region = cell(region_column).and_then(|c| c.text());
            match (code, region) {
                (Some(Ok(code)), Some(region)) => {
                    entries.entry(code).or_insert_with(|| RegionKey::new(region));
                }
                (None, None) => {}
                _ => skipped += 1,
            }
        }

        info!(
            "Loaded region table {:?}: {} postal codes ({} rows skipped)",
            path,
            entries.len(),
            skipped
        );
        Ok(Self { entries })
    }

    pub fn get(&self, code: &PostalCode) -> Option<&RegionKey> {
        self.entries.get(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Table(RegionTable),
    /// A table was configured but could not be loaded
    BrokenTable(String),
    Prefix { keys: Vec<RegionKey>, len: usize },
}

/// Resolves postal codes to the region whose shard holds their boundary
#[derive(Debug, Clone)]
pub struct PostalRegionIndex {
    strategy: Strategy,
}

impl PostalRegionIndex {
    pub fn from_table(table: RegionTable) -> Self {
        Self {
            strategy: Strategy::Table(table),
        }
    }

    /// Index for a configured table that failed to load. Every lookup fails
    /// with [`Unresolved::TableUnusable`]; there is no silent fallback to the
    /// prefix heuristic.
    pub fn unusable_table(reason: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::BrokenTable(reason.into()),
        }
    }

    /// Prefix heuristic over the given region keys
    pub fn prefix(keys: impl IntoIterator<Item = RegionKey>, len: usize) -> Self {
        let mut keys: Vec<RegionKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        let len = len.max(1);

        let mut by_prefix: BTreeMap<&str, Vec<&RegionKey>> = BTreeMap::new();
        for key in &keys {
            if key.as_str().len() >= len && key.as_str().is_char_boundary(len) {
                by_prefix.entry(&key.as_str()[..len]).or_default().push(key);
            }
        }
        for (prefix, candidates) in by_prefix.iter().filter(|(_, c)| c.len() > 1) {
            warn!(
                "Region prefix {:?} is ambiguous: {:?}; '{}' will be used",
                prefix, candidates, candidates[0]
            );
        }

        Self {
            strategy: Strategy::Prefix { keys, len },
        }
    }

    /// Label of the active strategy, for diagnostics
    pub fn strategy_name(&self) -> &'static str {
        match self.strategy {
            Strategy::Table(_) => "explicit_table",
            Strategy::BrokenTable(_) => "explicit_table_unusable",
            Strategy::Prefix { .. } => "prefix_heuristic",
        }
    }

    /// Resolve a postal code to its region key
    pub fn resolve(&self, code: &PostalCode) -> Result<RegionMatch, Unresolved> {
        match &self.strategy {
            Strategy::Table(table) => table
                .get(code)
                .map(|region| RegionMatch {
                    region: region.clone(),
                    basis: MatchBasis::ExplicitTable,
                })
                .ok_or_else(|| Unresolved::NotInTable { code: code.clone() }),
            Strategy::BrokenTable(reason) => Err(Unresolved::TableUnusable {
                code: code.clone(),
                reason: reason.clone(),
            }),
            Strategy::Prefix { keys, len } => Self::resolve_prefix(keys, *len, code),
        }
    }

    fn resolve_prefix(
        keys: &[RegionKey],
        len: usize,
        code: &PostalCode,
    ) -> Result<RegionMatch, Unresolved> {
        let prefix = code.prefix(len);
        let mut candidates = keys.iter().filter(|k| k.as_str().starts_with(prefix));

        let Some(region) = candidates.next() else {
            return Err(Unresolved::NoPrefixMatch {
                code: code.clone(),
                prefix: prefix.to_string(),
            });
        };
        let ambiguous_with: Vec<RegionKey> = candidates.cloned().collect();
        if !ambiguous_with.is_empty() {
            debug!(
                "Postal code {} matched regions {:?} besides '{}'",
                code, ambiguous_with, region
            );
        }

        Ok(RegionMatch {
            region: region.clone(),
            basis: MatchBasis::Prefix {
                prefix: prefix.to_string(),
                ambiguous_with,
            },
        })
    }
}
