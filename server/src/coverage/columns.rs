//! Column alias tables
//!
//! Carrier spreadsheets name the postal-code column in several ways. Headers
//! are compared after trimming, collapsing inner whitespace and upper-casing.

/// Canonical column name plus the header spellings that map onto it
#[derive(Debug, Clone, Copy)]
pub struct ColumnAliases {
    canonical: &'static str,
    aliases: &'static [&'static str],
}

/// Postal-code column
pub const POSTAL_CODE: ColumnAliases = ColumnAliases {
    canonical: "POSTAL CODE",
    aliases: &[
        "C.P.",
        "C.P",
        "CP",
        "C.P DESTINO",
        "C.P. DESTINO",
        "CP DESTINO",
        "POSTAL",
        "CODIGO POSTAL",
        "CÓDIGO POSTAL",
        "D_CODIGO",
    ],
};

/// Region-key column of the explicit postal-code-to-region table
pub const REGION_KEY: ColumnAliases = ColumnAliases {
    canonical: "REGION KEY",
    aliases: &["REGION", "ESTADO", "STATE", "CLAVE ESTADO", "SHARD"],
};

impl ColumnAliases {
    pub fn canonical(&self) -> &'static str {
        self.canonical
    }

    /// Index of the first header that is the canonical name or one of its aliases
    pub fn find(&self, headers: &[String]) -> Option<usize> {
        headers.iter().position(|header| self.matches(header))
    }

    fn matches(&self, header: &str) -> bool {
        let header = normalize_header(header);
        header == self.canonical || self.aliases.iter().any(|alias| header == *alias)
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
