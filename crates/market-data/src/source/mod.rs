//! Price source adapters
//!
//! A [`PriceSource`] fetches one variety's price from one upstream and
//! reports either a normalised [`PricePoint`] or a [`SourceError`]. Sources
//! never touch shared state; the aggregator collects their results and
//! applies the per-call timeout.
//!
//! Concrete adapters:
//! - [`ExchangeFeed`] - JSON quote API
//! - [`ScrapedFeed`] - HTML page with a regex-extracted price
//! - [`StaticFeed`] - fixed prices from configuration

mod exchange;
mod scraped;
mod static_feed;

pub use common::PriceUnit;
pub use exchange::ExchangeFeed;
pub use scraped::ScrapedFeed;
pub use static_feed::StaticFeed;

use async_trait::async_trait;
use common::{SharedClock, Variety};
use config::{MasterConfig, SourceConfig, SourceKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::MarketDataError;
use crate::types::PricePoint;

/// Why a single adapter call produced no price
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {0}")]
    Http(u16),

    #[error("could not parse quote: {0}")]
    Parse(String),

    #[error("variety {0} is not quoted by this source")]
    UnsupportedVariety(Variety),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SourceError::Http(status.as_u16()),
            None => SourceError::Transport(err.to_string()),
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A named upstream price provider
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Name used as the `source` tag of produced prices
    fn name(&self) -> &str;

    /// Whether this source quotes `variety` at all
    fn supports(&self, variety: Variety) -> bool;

    /// Per-source timeout override; the aggregator default applies when `None`
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn fetch(&self, variety: Variety) -> SourceResult<PricePoint>;
}

/// Parse a quote as printed by an upstream (`"1,234.50"`, `" 4.2 "`)
pub fn parse_quote(raw: &str) -> SourceResult<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let value: f64 = cleaned
        .parse()
        .map_err(|_| SourceError::Parse(format!("not a number: {:?}", raw)))?;
    ensure_positive(value)
}

/// Reject zero, negative and non-finite quotes
pub fn ensure_positive(value: f64) -> SourceResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SourceError::Parse(format!("non-positive quote: {}", value)))
    }
}

/// Ordered list of price sources taking part in fetch cycles
///
/// Registration order is significant: within a cycle, points for the same
/// variety are appended to history in this order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn PriceSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every enabled source in `config`
    pub fn from_config(config: &MasterConfig, clock: SharedClock) -> Result<Self, MarketDataError> {
        let mut registry = Self::new();

        for source in config.enabled_sources() {
            let built = build_source(source, config.market.source_timeout(), clock.clone())?;
            info!(
                source = %source.name,
                kind = source.kind.as_str(),
                unit = %source.unit,
                "Registered price source"
            );
            registry.register(built);
        }

        debug!(count = registry.len(), "Source registry built");
        Ok(registry)
    }

    pub fn register(&mut self, source: Arc<dyn PriceSource>) {
        self.sources.push(source);
    }

    pub fn with(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.register(source);
        self
    }

    pub fn sources(&self) -> &[Arc<dyn PriceSource>] {
        &self.sources
    }

    /// Sources that quote `variety`, in registration order
    pub fn for_variety(&self, variety: Variety) -> impl Iterator<Item = &Arc<dyn PriceSource>> {
        self.sources.iter().filter(move |s| s.supports(variety))
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

fn build_source(
    source: &SourceConfig,
    default_timeout: Duration,
    clock: SharedClock,
) -> Result<Arc<dyn PriceSource>, MarketDataError> {
    let timeout = source
        .timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);

    let built: Arc<dyn PriceSource> = match source.kind {
        SourceKind::Exchange => Arc::new(ExchangeFeed::from_config(source, timeout, clock)?),
        SourceKind::Scraped => Arc::new(ScrapedFeed::from_config(source, timeout, clock)?),
        SourceKind::Static => Arc::new(StaticFeed::from_config(source, clock)),
    };
    Ok(built)
}

/// Shared HTTP client settings for network-backed feeds
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, MarketDataError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("coffeex/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MarketDataError::Config(format!("failed to build HTTP client: {}", e)))
}

pub(crate) fn required_endpoint(source: &SourceConfig) -> Result<String, MarketDataError> {
    source.endpoint.clone().ok_or_else(|| {
        MarketDataError::Config(format!("source '{}' has no endpoint", source.name))
    })
}

/// Substitute `{variety}` in an endpoint template
pub(crate) fn endpoint_for(template: &str, variety: Variety) -> String {
    template.replace("{variety}", variety.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use common::{ManualClock, Variety};
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_quote() {
        assert_eq!(parse_quote("4.25").unwrap(), 4.25);
        assert_eq!(parse_quote(" 2,815.00 ").unwrap(), 2815.0);
        assert_matches!(parse_quote("n/a"), Err(SourceError::Parse(_)));
        assert_matches!(parse_quote("0"), Err(SourceError::Parse(_)));
        assert_matches!(parse_quote("-3.1"), Err(SourceError::Parse(_)));
    }

    #[test]
    fn test_registry_from_config_skips_disabled() {
        let mut cfg = config::generate_default_config();
        let mut disabled = SourceConfig::static_prices(
            "OFFLINE_DESK",
            BTreeMap::from([(Variety::Arabica, 4.0)]),
        );
        disabled.enabled = false;
        cfg.sources.push(disabled);

        let registry = SourceRegistry::from_config(&cfg, ManualClock::starting_now()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["ICE_ARABICA", "INVESTING_ROBUSTA", "DESK"]
        );
        assert_eq!(registry.for_variety(Variety::Robusta).count(), 1);
        assert_eq!(registry.for_variety(Variety::Organic).count(), 1);
    }

    #[test]
    fn test_registry_rejects_scraped_without_pattern() {
        let mut cfg = config::generate_default_config();
        cfg.sources[1].pattern = None;

        let err = SourceRegistry::from_config(&cfg, ManualClock::starting_now()).unwrap_err();
        assert_matches!(err, MarketDataError::Config(msg) if msg.contains("INVESTING_ROBUSTA"));
    }

    #[test]
    fn test_endpoint_template() {
        assert_eq!(
            endpoint_for("https://feed.example.com/{variety}/last", Variety::Robusta),
            "https://feed.example.com/robusta/last"
        );
    }
}
