use async_trait::async_trait;
use common::{Grade, SharedClock, Variety};
use config::SourceConfig;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

use super::{
    endpoint_for, ensure_positive, http_client, parse_quote, required_endpoint, PriceSource,
    PriceUnit, SourceError, SourceResult,
};
use crate::error::MarketDataError;
use crate::types::PricePoint;

/// HTML page with the price embedded in markup
///
/// The first capture group of `pattern` holds the quote; thousands
/// separators are stripped before parsing.
pub struct ScrapedFeed {
    name: String,
    endpoint: String,
    pattern: Regex,
    unit: PriceUnit,
    varieties: Vec<Variety>,
    grade: Grade,
    timeout: Duration,
    client: reqwest::Client,
    clock: SharedClock,
}

impl std::fmt::Debug for ScrapedFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapedFeed")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("pattern", &self.pattern.as_str())
            .field("varieties", &self.varieties)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ScrapedFeed {
    pub fn from_config(
        source: &SourceConfig,
        timeout: Duration,
        clock: SharedClock,
    ) -> Result<Self, MarketDataError> {
        let endpoint = required_endpoint(source)?;
        let raw_pattern = source.pattern.as_deref().ok_or_else(|| {
            MarketDataError::Config(format!("source '{}' has no pattern", source.name))
        })?;
        let pattern = Regex::new(raw_pattern).map_err(|e| {
            MarketDataError::Config(format!("source '{}': invalid pattern: {}", source.name, e))
        })?;
        if pattern.captures_len() < 2 {
            return Err(MarketDataError::Config(format!(
                "source '{}': pattern has no capture group",
                source.name
            )));
        }

        Ok(Self {
            name: source.name.clone(),
            endpoint,
            pattern,
            unit: source.unit,
            varieties: source.varieties.clone(),
            grade: Grade::new(source.grade),
            timeout,
            client: http_client(timeout)?,
            clock,
        })
    }

    /// Pull the quote out of a page body
    pub(crate) fn extract(&self, body: &str) -> SourceResult<f64> {
        let captured = self
            .pattern
            .captures(body)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| SourceError::Parse("pattern did not match page".to_string()))?;
        parse_quote(captured.as_str())
    }
}

#[async_trait]
impl PriceSource for ScrapedFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, variety: Variety) -> bool {
        self.varieties.is_empty() || self.varieties.contains(&variety)
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn fetch(&self, variety: Variety) -> SourceResult<PricePoint> {
        if !self.supports(variety) {
            return Err(SourceError::UnsupportedVariety(variety));
        }

        let response = self
            .client
            .get(endpoint_for(&self.endpoint, variety))
            .header("Accept", "text/html")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SourceError::Http(response.status().as_u16()));
        }

        let body = response.text().await?;
        let quote = self.extract(&body)?;
        let price_per_kg = ensure_positive(self.unit.to_usd_per_kg(quote))?;

        debug!(source = %self.name, %variety, quote, price_per_kg, "Scraped quote");
        Ok(PricePoint::new(
            variety,
            self.grade,
            price_per_kg,
            self.name.clone(),
            self.clock.now(),
        ))
    }
}
