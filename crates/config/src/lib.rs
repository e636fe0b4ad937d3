//! Configuration for the coffee market engine
//!
//! The engine is configured from a single YAML file. `${VAR}` placeholders
//! are substituted from the environment before parsing, every section but
//! `service`, `market` and `sources` may be omitted, and
//! [`validate_config`] reports problems without aborting on the first one.

use common::{PriceUnit, Variety};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl MasterConfig {
    /// Sources that take part in fetch cycles
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// One of `pretty`, `json`, `compact`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Prometheus exporter port; metrics are not exported when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    /// Varieties fetched every cycle
    #[serde(default = "default_varieties")]
    pub varieties: Vec<Variety>,
    /// Maximum points kept per variety history
    #[serde(default = "default_retention_window")]
    pub retention_window: usize,
    /// Number of most recent points used for volatility
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
    #[serde(default = "default_fetch_interval_seconds")]
    pub fetch_interval_seconds: u64,
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
    /// Per-adapter call timeout
    #[serde(default = "default_source_timeout_seconds")]
    pub source_timeout_seconds: u64,
}

impl MarketConfig {
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_seconds)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_seconds)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            varieties: default_varieties(),
            retention_window: default_retention_window(),
            volatility_window: default_volatility_window(),
            fetch_interval_seconds: default_fetch_interval_seconds(),
            run_on_startup: default_run_on_startup(),
            source_timeout_seconds: default_source_timeout_seconds(),
        }
    }
}

/// How a source reaches its upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// JSON quote API
    Exchange,
    /// HTML page with a regex-extracted price
    Scraped,
    /// Fixed prices, no network
    Static,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Exchange => "exchange",
            SourceKind::Scraped => "scraped",
            SourceKind::Static => "static",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Varieties this source quotes; empty means all
    #[serde(default)]
    pub varieties: Vec<Variety>,
    #[serde(default)]
    pub unit: PriceUnit,
    /// Scraped sources: regex whose first capture group is the price
    #[serde(default)]
    pub pattern: Option<String>,
    /// Exchange sources: dotted path to the price in the JSON body
    #[serde(default)]
    pub price_field: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Static sources: price per variety, in `unit`
    #[serde(default)]
    pub prices: BTreeMap<Variety, f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_grade")]
    pub grade: u8,
    /// Overrides `market.source_timeout_seconds` for this source
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl SourceConfig {
    pub fn supports(&self, variety: Variety) -> bool {
        self.varieties.is_empty() || self.varieties.contains(&variety)
    }

    /// Build a static source quoting the given USD/kg prices
    pub fn static_prices(name: impl Into<String>, prices: BTreeMap<Variety, f64>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Static,
            endpoint: None,
            varieties: prices.keys().copied().collect(),
            unit: PriceUnit::UsdPerKg,
            pattern: None,
            price_field: None,
            api_key: None,
            api_key_header: default_api_key_header(),
            prices,
            enabled: true,
            grade: default_grade(),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackConfig {
    /// Prefix of the `<TAG>_FALLBACK` source name
    #[serde(default = "default_fallback_source_tag")]
    pub source_tag: String,
    /// USD/kg per variety
    #[serde(default = "default_fallback_prices")]
    pub prices: BTreeMap<Variety, f64>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            source_tag: default_fallback_source_tag(),
            prices: default_fallback_prices(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertConfig {
    #[serde(default = "default_spike_threshold_percent")]
    pub spike_threshold_percent: f64,
    #[serde(default = "default_drop_threshold_percent")]
    pub drop_threshold_percent: f64,
    #[serde(default = "default_volatility_threshold_percent")]
    pub volatility_threshold_percent: f64,
    /// Emit SEASONAL_CHANGE when a variety's trend flips between cycles
    #[serde(default = "default_emit_trend_changes")]
    pub emit_trend_changes: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            spike_threshold_percent: default_spike_threshold_percent(),
            drop_threshold_percent: default_drop_threshold_percent(),
            volatility_threshold_percent: default_volatility_threshold_percent(),
            emit_trend_changes: default_emit_trend_changes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_acceptable_deviation_percent")]
    pub acceptable_deviation_percent: f64,
    #[serde(default = "default_trend_threshold_percent")]
    pub trend_threshold_percent: f64,
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,
}

impl AnalysisConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_hours * 60 * 60)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            acceptable_deviation_percent: default_acceptable_deviation_percent(),
            trend_threshold_percent: default_trend_threshold_percent(),
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Price batch endpoint; sync is log-only when absent
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_ledger_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl LedgerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: default_ledger_timeout_seconds(),
        }
    }
}
