//! SIREN and SIRET business identifiers.
//!
//! A SIREN identifies a French legal entity (an offerer) and is made of 9
//! digits. A SIRET identifies one establishment (a venue) and is made of 14
//! digits, the first 9 of which are the owner's SIREN. Both are kept as
//! strings so leading zeros survive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of digits in a SIREN.
pub const SIREN_LENGTH: usize = 9;
/// Number of digits in a SIRET.
pub const SIRET_LENGTH: usize = 14;

/// Validation failures for SIREN and SIRET input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Input was empty after sanitising.
    #[error("identifier must not be empty")]
    Empty,
    /// Input did not have the expected number of characters.
    #[error("{label} doit faire {expected} caractères")]
    InvalidLength {
        /// `SIREN` or `SIRET`.
        label: &'static str,
        /// Required length.
        expected: usize,
        /// Length received.
        actual: usize,
    },
    /// Input contained something other than ASCII digits.
    #[error("{label} ne doit contenir que des chiffres")]
    NonDigit {
        /// `SIREN` or `SIRET`.
        label: &'static str,
    },
}

impl IdentifierError {
    /// Field-keyed French message, as surfaced to pro users.
    pub fn field_message(&self) -> (&'static str, String) {
        let field = match self {
            Self::InvalidLength { label: "SIRET", .. } | Self::NonDigit { label: "SIRET" } => {
                "siret"
            }
            _ => "siren",
        };
        (field, format!("Le {self}"))
    }
}

fn sanitise(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

fn validate(raw: &str, label: &'static str, expected: usize) -> Result<String, IdentifierError> {
    let cleaned = sanitise(raw);
    if cleaned.is_empty() {
        return Err(IdentifierError::Empty);
    }
    let actual = cleaned.chars().count();
    if actual != expected {
        return Err(IdentifierError::InvalidLength {
            label,
            expected,
            actual,
        });
    }
    if !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentifierError::NonDigit { label });
    }
    Ok(cleaned)
}

/// Nine-digit legal entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Siren(String);

impl Siren {
    /// Parse a SIREN, ignoring whitespace.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        validate(raw, "SIREN", SIREN_LENGTH).map(Self)
    }

    /// Borrow the digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fourteen-digit establishment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Siret(String);

impl Siret {
    /// Parse a SIRET, ignoring whitespace.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        validate(raw, "SIRET", SIRET_LENGTH).map(Self)
    }

    /// Borrow the digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SIREN of the entity owning this establishment.
    pub fn siren(&self) -> Siren {
        Siren(self.0.chars().take(SIREN_LENGTH).collect())
    }

    /// True when this establishment belongs to `siren`.
    pub fn belongs_to(&self, siren: &Siren) -> bool {
        self.0.starts_with(siren.as_str())
    }
}

macro_rules! impl_string_conversions {
    ($name:ident) => {
        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

impl_string_conversions!(Siren);
impl_string_conversions!(Siret);
