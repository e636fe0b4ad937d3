//! Quote units used by upstream price feeds
//!
//! Exchanges quote coffee per pound (in cents or dollars) or per metric
//! tonne; everything inside the engine is USD per kilogram.

use serde::{Deserialize, Serialize};

/// Pounds per kilogram
pub const LB_PER_KG: f64 = 2.20462;

/// Kilograms per metric tonne
pub const KG_PER_TONNE: f64 = 1000.0;

/// Unit an upstream quote is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    /// Already normalised
    #[default]
    UsdPerKg,
    /// ICE "Coffee C" style quote
    CentsPerLb,
    UsdPerLb,
    /// ICE Europe robusta style quote
    UsdPerTonne,
}

impl PriceUnit {
    /// Convert a quote in this unit to USD per kilogram
    pub fn to_usd_per_kg(&self, quote: f64) -> f64 {
        match self {
            PriceUnit::UsdPerKg => quote,
            PriceUnit::CentsPerLb => quote * LB_PER_KG / 100.0,
            PriceUnit::UsdPerLb => quote * LB_PER_KG,
            PriceUnit::UsdPerTonne => quote / KG_PER_TONNE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceUnit::UsdPerKg => "usd_per_kg",
            PriceUnit::CentsPerLb => "cents_per_lb",
            PriceUnit::UsdPerLb => "usd_per_lb",
            PriceUnit::UsdPerTonne => "usd_per_tonne",
        }
    }
}

impl std::fmt::Display for PriceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
