//! Ledger sync boundary
//!
//! Aggregated prices are pushed to an external ledger on a best-effort
//! basis. A failed push is reported to the caller and never touches the
//! in-memory history or cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Grade, Variety};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::PricePoint;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Transport(String),

    #[error("ledger rejected prices (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("ledger client misconfigured: {0}")]
    Config(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Receives aggregated price batches
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn push_prices(&self, prices: &[PricePoint]) -> LedgerResult<()>;
}

/// One entry of the batch posted to the ledger
#[derive(Debug, Clone, Serialize)]
pub struct LedgerPriceUpdate {
    pub variety: Variety,
    pub variety_code: u8,
    pub grade: Grade,
    pub price_per_kg: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl From<&PricePoint> for LedgerPriceUpdate {
    fn from(point: &PricePoint) -> Self {
        Self {
            variety: point.variety,
            variety_code: point.variety.code(),
            grade: point.grade,
            price_per_kg: point.price_per_kg,
            currency: point.currency.to_string(),
            timestamp: point.timestamp,
            source: point.source.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PriceBatch {
    prices: Vec<LedgerPriceUpdate>,
}

/// POSTs the batch as JSON; any non-2xx response is a failure
pub struct HttpLedgerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for HttpLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLedgerClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpLedgerClient {
    pub fn new(endpoint: &str, timeout: Duration) -> LedgerResult<Self> {
        url::Url::parse(endpoint).map_err(|e| LedgerError::Config(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn push_prices(&self, prices: &[PricePoint]) -> LedgerResult<()> {
        let batch = PriceBatch {
            prices: prices.iter().map(LedgerPriceUpdate::from).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&batch)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(endpoint = %self.endpoint, count = prices.len(), "Prices pushed to ledger");
        Ok(())
    }
}

/// Log-only ledger used when no endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLedgerClient;

#[async_trait]
impl LedgerClient for LoggingLedgerClient {
    async fn push_prices(&self, prices: &[PricePoint]) -> LedgerResult<()> {
        for point in prices {
            info!(
                variety = %point.variety,
                grade = %point.grade,
                price_per_kg = point.price_per_kg,
                source = %point.source,
                "Ledger price update (log only)"
            );
        }
        Ok(())
    }
}
