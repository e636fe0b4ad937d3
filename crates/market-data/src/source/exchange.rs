use async_trait::async_trait;
use common::{Grade, SharedClock, Variety};
use config::SourceConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{
    endpoint_for, ensure_positive, http_client, parse_quote, required_endpoint, PriceSource,
    PriceUnit, SourceError, SourceResult,
};
use crate::error::MarketDataError;
use crate::types::PricePoint;

/// Quote API returning JSON
///
/// The endpoint may contain `{variety}`, substituted per call. The price is
/// read from a dotted `price_field` path where numeric segments index arrays
/// (`chart.result.0.meta.regularMarketPrice`); without a path the body must
/// be a bare number.
pub struct ExchangeFeed {
    name: String,
    endpoint: String,
    price_field: Option<String>,
    api_key: Option<(String, String)>,
    unit: PriceUnit,
    varieties: Vec<Variety>,
    grade: Grade,
    timeout: Duration,
    client: reqwest::Client,
    clock: SharedClock,
}

impl std::fmt::Debug for ExchangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeFeed")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("price_field", &self.price_field)
            .field("varieties", &self.varieties)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ExchangeFeed {
    pub fn from_config(
        source: &SourceConfig,
        timeout: Duration,
        clock: SharedClock,
    ) -> Result<Self, MarketDataError> {
        let endpoint = required_endpoint(source)?;
        url::Url::parse(&endpoint_for(&endpoint, Variety::Arabica)).map_err(|e| {
            MarketDataError::Config(format!("source '{}': invalid endpoint: {}", source.name, e))
        })?;

        Ok(Self {
            name: source.name.clone(),
            endpoint,
            price_field: source.price_field.clone(),
            api_key: source
                .api_key
                .clone()
                .map(|key| (source.api_key_header.clone(), key)),
            unit: source.unit,
            varieties: source.varieties.clone(),
            grade: Grade::new(source.grade),
            timeout,
            client: http_client(timeout)?,
            clock,
        })
    }
}

#[async_trait]
impl PriceSource for ExchangeFeed {
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

        let url = endpoint_for(&self.endpoint, variety);
        let mut request = self.client.get(&url);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Http(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("invalid JSON: {}", e)))?;
        let quote = extract_price(&body, self.price_field.as_deref())?;
        let price_per_kg = ensure_positive(self.unit.to_usd_per_kg(quote))?;

        debug!(source = %self.name, %variety, quote, price_per_kg, "Exchange quote");
        Ok(PricePoint::new(
            variety,
            self.grade,
            price_per_kg,
            self.name.clone(),
            self.clock.now(),
        ))
    }
}

/// Walk `path` through `body` and read the number found there
pub(crate) fn extract_price(body: &Value, path: Option<&str>) -> SourceResult<f64> {
    let mut node = body;
    for segment in path.into_iter().flat_map(|p| p.split('.')) {
        let next = match node {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(fields) => fields.get(segment),
            _ => None,
        };
        node = next.ok_or_else(|| SourceError::Parse(format!("missing field '{}'", segment)))?;
    }

    match node {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| SourceError::Parse(format!("unrepresentable number {}", n)))
            .and_then(ensure_positive),
        Value::String(s) => parse_quote(s),
        other => Err(SourceError::Parse(format!("expected a number, found {}", other))),
    }
}
