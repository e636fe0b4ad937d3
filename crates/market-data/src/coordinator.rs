//! Market data coordinator
//!
//! The single entry point the rest of the system talks to. It owns the
//! aggregator (and through it every price history), shares the alert bus
//! and cache store, and forwards aggregated batches to the ledger.

use cache::{CacheStore, ResourceKind};
use common::{Grade, SharedClock, SystemClock, Variety};
use config::MasterConfig;
use observability::MarketMetrics;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::aggregator::{AggregatorSettings, PriceAggregator};
use crate::alerts::{AlertBus, AlertCallback, AlertDetector};
use crate::analyzer::MarketAnalyzer;
use crate::error::MarketDataError;
use crate::fallback::FallbackTable;
use crate::ledger::{HttpLedgerClient, LedgerClient, LoggingLedgerClient};
use crate::source::SourceRegistry;
use crate::types::{MarketAlert, MarketConditions, PricePoint, ValidationResult};

#[derive(Clone)]
pub struct MarketDataCoordinator {
    aggregator: Arc<PriceAggregator>,
    analyzer: MarketAnalyzer,
    alerts: Arc<AlertBus>,
    cache: Arc<CacheStore>,
    ledger: Arc<dyn LedgerClient>,
    clock: SharedClock,
    metrics: MarketMetrics,
}

impl MarketDataCoordinator {
    /// Assemble a coordinator around externally built parts
    ///
    /// The cache's clock stamps every price and alert.
    pub fn new(
        config: &MasterConfig,
        registry: SourceRegistry,
        ledger: Arc<dyn LedgerClient>,
        cache: Arc<CacheStore>,
    ) -> Self {
        let clock = cache.clock().clone();
        let alerts = Arc::new(AlertBus::new());
        let analyzer = MarketAnalyzer::from_config(config);

        let aggregator = PriceAggregator::new(
            AggregatorSettings::from_config(config),
            registry,
            FallbackTable::from_config(&config.fallback),
            cache.clone(),
            analyzer.clone(),
            AlertDetector::new(config.alerts.clone()),
            alerts.clone(),
            clock.clone(),
        );

        Self {
            aggregator: Arc::new(aggregator),
            analyzer,
            alerts,
            cache,
            ledger,
            clock,
            metrics: MarketMetrics::new(),
        }
    }

    /// Build sources, cache and ledger client from configuration
    pub fn from_config(config: &MasterConfig) -> Result<Self, MarketDataError> {
        let clock = SystemClock::shared();
        let registry = SourceRegistry::from_config(config, clock.clone())?;
        let cache = Arc::new(CacheStore::new(clock));

        let ledger: Arc<dyn LedgerClient> = match &config.ledger.endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Ledger sync over HTTP");
                Arc::new(HttpLedgerClient::new(endpoint, config.ledger.timeout())?)
            }
            None => {
                info!("No ledger endpoint configured, ledger sync is log-only");
                Arc::new(LoggingLedgerClient)
            }
        };

        Ok(Self::new(config, registry, ledger, cache))
    }

    /// Run one fetch cycle across every source and variety
    pub async fn fetch_all_prices(&self) -> Vec<PricePoint> {
        self.aggregator.fetch_all_prices().await
    }

    /// Push a batch to the ledger; `false` when the ledger refused or was unreachable
    ///
    /// History and cache are left as they are either way.
    pub async fn update_ledger_prices(&self, prices: &[PricePoint]) -> bool {
        match self.ledger.push_prices(prices).await {
            Ok(()) => {
                info!(count = prices.len(), "Ledger prices updated");
                self.metrics.ledger_sync(true);
                true
            }
            Err(e) => {
                warn!(count = prices.len(), error = %e, "Ledger price update failed");
                self.metrics.ledger_sync(false);
                false
            }
        }
    }

    /// Trend and volatility over the per-cycle consolidated series
    pub fn get_market_conditions(&self, variety: Variety) -> MarketConditions {
        let cycles = self.aggregator.cycle_history(variety);
        self.analyzer.conditions(variety, &cycles)
    }

    /// Check a proposed price against the latest price for `variety` and `grade`
    ///
    /// Without any recorded price the fallback table is the reference.
    pub fn validate_price(&self, variety: Variety, grade: Grade, price: f64) -> ValidationResult {
        let now = self.clock.now();
        let reference = self
            .aggregator
            .latest(variety, grade)
            .unwrap_or_else(|| self.aggregator.fallback().point(variety, grade, now));
        self.analyzer.validate(price, &reference, now)
    }

    /// History of `variety`, oldest first
    pub fn get_price_history(&self, variety: Variety) -> Vec<PricePoint> {
        self.aggregator.history(variety)
    }

    /// Latest known price: cached entry, else history, else fallback
    pub async fn latest_price(&self, variety: Variety) -> PricePoint {
        if let Some((point, _)) = self
            .cache
            .peek::<PricePoint>(ResourceKind::Price, variety.as_str())
            .await
        {
            return point;
        }
        self.aggregator
            .latest_any_grade(variety)
            .unwrap_or_else(|| {
                self.aggregator
                    .fallback()
                    .point(variety, Grade::STANDARD, self.clock.now())
            })
    }

    pub fn subscribe_to_alerts(&self, callback: AlertCallback) -> bool {
        self.alerts.subscribe(callback)
    }

    pub fn unsubscribe_from_alerts(&self, callback: &AlertCallback) -> bool {
        self.alerts.unsubscribe(callback)
    }

    pub fn subscribe_alert_channel(&self) -> broadcast::Receiver<MarketAlert> {
        self.alerts.subscribe_channel()
    }

    pub fn varieties(&self) -> &[Variety] {
        self.aggregator.varieties()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.aggregator.registry().names()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn alert_bus(&self) -> &Arc<AlertBus> {
        &self.alerts
    }
}

impl std::fmt::Debug for MarketDataCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCoordinator")
            .field("aggregator", &self.aggregator)
            .field("alerts", &self.alerts)
            .finish_non_exhaustive()
    }
}
