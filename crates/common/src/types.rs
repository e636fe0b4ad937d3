//! Common types used across the coffee market engine
//!
//! This module provides the fundamental domain vocabulary shared by the
//! cache, market data and configuration crates.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Coffee commodity category
///
/// The discriminants match the on-ledger variety codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variety {
    /// Coffea arabica, ICE "Coffee C" contract
    Arabica = 0,
    /// Coffea canephora, ICE Europe robusta contract
    Robusta = 1,
    /// Specialty-grade lots
    Specialty = 2,
    /// Certified organic lots
    Organic = 3,
}

impl Variety {
    /// All varieties, in ledger code order
    pub const ALL: [Variety; 4] = [
        Variety::Arabica,
        Variety::Robusta,
        Variety::Specialty,
        Variety::Organic,
    ];

    /// Ledger code for this variety
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Lowercase name used in config files and cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Variety::Arabica => "arabica",
            Variety::Robusta => "robusta",
            Variety::Specialty => "specialty",
            Variety::Organic => "organic",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "arabica" => Some(Self::Arabica),
            "robusta" => Some(Self::Robusta),
            "specialty" => Some(Self::Specialty),
            "organic" => Some(Self::Organic),
            _ => None,
        }
    }
}

impl FromStr for Variety {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::UnknownVariety(s.trim().to_string()))
    }
}

impl std::fmt::Display for Variety {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variety::Arabica => write!(f, "Arabica"),
            Variety::Robusta => write!(f, "Robusta"),
            Variety::Specialty => write!(f, "Specialty"),
            Variety::Organic => write!(f, "Organic"),
        }
    }
}

/// Quality tier within a variety (1 is the exchange grade)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grade(pub u8);

impl Grade {
    /// The standard exchange-deliverable grade
    pub const STANDARD: Grade = Grade(1);

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Grade {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO currency code (e.g., "USD")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a new Currency
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// US dollar, the quoting currency of every upstream feed
    pub fn usd() -> Self {
        Self::new("USD")
    }

    /// Get the code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variety_codes() {
        assert_eq!(Variety::Arabica.code(), 0);
        assert_eq!(Variety::Robusta.code(), 1);
        assert_eq!(Variety::Specialty.code(), 2);
        assert_eq!(Variety::Organic.code(), 3);
    }

    #[test]
    fn test_variety_parse() {
        assert_eq!(Variety::parse("ARABICA"), Some(Variety::Arabica));
        assert_eq!(Variety::parse(" robusta "), Some(Variety::Robusta));
        assert_eq!(Variety::parse("liberica"), None);

        assert_eq!("organic".parse::<Variety>().unwrap(), Variety::Organic);
        assert_eq!(
            "liberica".parse::<Variety>(),
            Err(Error::UnknownVariety("liberica".to_string()))
        );
        assert_eq!(
            Error::UnknownVariety("liberica".to_string()).to_string(),
            "unknown variety: liberica"
        );
    }

    #[test]
    fn test_variety_serde_round_name() {
        let json = serde_json::to_string(&Variety::Specialty).unwrap();
        assert_eq!(json, "\"specialty\"");
    }

    #[test]
    fn test_grade_default() {
        assert_eq!(Grade::default(), Grade::STANDARD);
        assert_eq!(Grade::new(3).value(), 3);
    }

    #[test]
    fn test_currency() {
        let c = Currency::new("usd");
        assert_eq!(c.as_str(), "USD");
        assert_eq!(Currency::default(), Currency::usd());
    }
}
