//! Postal codes, carrier identifiers and region keys
//!
//! Postal codes are always carried in their canonical text form: trimmed,
//! digits only, left-padded to [`POSTAL_CODE_WIDTH`]. Every value entering the
//! engine (spreadsheet cells, GeoJSON properties, query paths) goes through
//! [`PostalCode::parse`] or one of the numeric constructors before it is
//! compared with anything.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of digits in a canonical postal code
pub const POSTAL_CODE_WIDTH: usize = 5;

/// Errors produced while canonicalizing a postal code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostalCodeError {
    #[error("Postal code is empty")]
    Empty,

    #[error("Postal code contains non-digit characters: {0:?}")]
    NonDigit(String),

    #[error("Postal code has more than 5 digits: {0:?}")]
    TooLong(String),

    #[error("Postal code is not an integral number: {0}")]
    NotIntegral(String),
}

/// Canonical postal code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    /// Canonicalize a textual postal code.
    ///
    /// Surrounding whitespace is dropped, a zero fraction left behind by a
    /// numeric export (`"6100.0"`) is stripped, and the digits are left-padded
    /// with zeros, so `"06100"`, `" 06100 "` and `"6100"` all yield `06100`.
    pub fn parse(raw: &str) -> Result<Self, PostalCodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PostalCodeError::Empty);
        }

        let digits = match trimmed.split_once('.') {
            Some((int, frac)) if !int.is_empty() && frac.chars().all(|c| c == '0') => int,
            Some((int, frac))
                if int.chars().all(|c| c.is_ascii_digit())
                    && frac.chars().all(|c| c.is_ascii_digit()) =>
            {
                return Err(PostalCodeError::NotIntegral(trimmed.to_string()));
            }
            _ => trimmed,
        };

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PostalCodeError::NonDigit(trimmed.to_string()));
        }
        if digits.len() > POSTAL_CODE_WIDTH {
            return Err(PostalCodeError::TooLong(trimmed.to_string()));
        }

        Ok(Self(format!("{:0>width$}", digits, width = POSTAL_CODE_WIDTH)))
    }

    /// Canonicalize an integer cell whose leading zeros were dropped
    pub fn from_integer(value: i64) -> Result<Self, PostalCodeError> {
        if value < 0 {
            return Err(PostalCodeError::NonDigit(value.to_string()));
        }
        Self::parse(&value.to_string())
    }

    /// Canonicalize a floating-point cell (spreadsheets store plain numbers as floats)
    pub fn from_float(value: f64) -> Result<Self, PostalCodeError> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(PostalCodeError::NotIntegral(value.to_string()));
        }
        Self::from_integer(value as i64)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading `len` digits, used by the region prefix heuristic
    pub fn prefix(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PostalCode {
    type Error = PostalCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostalCode> for String {
    fn from(code: PostalCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for PostalCode {
    type Err = PostalCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(value.as_ref().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_key!(
    /// Stable carrier name, fixed by the ingestion manifest
    CarrierId
);

string_key!(
    /// Identifier of a geometry shard (administrative region), taken from
    /// the shard file stem or from the explicit region table
    RegionKey
);
