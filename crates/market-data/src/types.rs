//! Shared types for Market Data

use chrono::{DateTime, Utc};
use common::{Currency, Grade, Variety};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Suffix carried by the source tag of every synthesized price
pub const FALLBACK_SUFFIX: &str = "_FALLBACK";

/// One observed price for a variety and grade
///
/// Produced by a source adapter or the fallback table and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub variety: Variety,
    pub grade: Grade,
    /// USD per kilogram, always positive
    pub price_per_kg: f64,
    pub currency: Currency,
    pub timestamp: DateTime<Utc>,
    /// Name of the producing source
    pub source: String,
}

impl PricePoint {
    pub fn new(
        variety: Variety,
        grade: Grade,
        price_per_kg: f64,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            variety,
            grade,
            price_per_kg,
            currency: Currency::usd(),
            timestamp,
            source: source.into(),
        }
    }

    /// True when this price came from the static fallback table
    pub fn is_fallback(&self) -> bool {
        self.source.ends_with(FALLBACK_SUFFIX)
    }

    /// True when older than `threshold` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        cache::is_stale(self.timestamp, now, threshold)
    }
}

/// Direction of the market over the retained history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Bullish,
    Bearish,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Bullish => "BULLISH",
            Trend::Bearish => "BEARISH",
            Trend::Stable => "STABLE",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived view of a variety's history; recomputed on every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub variety: Variety,
    pub trend: Trend,
    /// Coefficient of variation over the volatility window, in percent
    pub volatility: f64,
    /// Percentage move of the recent half's mean over the older half's
    pub trend_change: f64,
    pub recommendation: String,
    /// 0 to 100
    pub confidence: f64,
    pub sample_size: usize,
    pub latest_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    PriceSpike,
    PriceDrop,
    Volatility,
    SeasonalChange,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::PriceSpike => "PRICE_SPIKE",
            AlertType::PriceDrop => "PRICE_DROP",
            AlertType::Volatility => "VOLATILITY",
            AlertType::SeasonalChange => "SEASONAL_CHANGE",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification of a significant market move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAlert {
    pub variety: Variety,
    pub grade: Grade,
    pub alert_type: AlertType,
    pub current_price: f64,
    pub previous_price: f64,
    pub change_percent: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Outcome of checking a proposed price against the market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Absolute deviation from the market price, in percent
    pub deviation: f64,
    pub market_price: f64,
    /// Source of the reference price
    pub market_source: String,
    /// Reference price is older than the stale threshold
    pub market_price_stale: bool,
    pub message: String,
}
