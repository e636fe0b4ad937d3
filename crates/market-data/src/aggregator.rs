//! Price aggregation
//!
//! One [`PriceAggregator`] owns every variety's history and the `price`
//! entries of the cache. A fetch cycle runs every (source, variety) pair
//! concurrently with an individual timeout, so a cycle takes at most one
//! timeout regardless of how many sources are registered, and a failing
//! subset never fails the cycle.
//!
//! Besides every raw point, each variety keeps a cycle series holding one
//! consolidated point per cycle (the median of that cycle's live quotes).
//! Alerts and market conditions are derived from the cycle series, so
//! sources quoting at a steady spread never look like price moves.

use cache::{CacheStore, ResourceKind, PRICE_TTL};
use common::{Grade, SharedClock, Variety};
use futures::future::join_all;
use observability::MarketMetrics;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::alerts::{AlertBus, AlertDetector};
use crate::analyzer::MarketAnalyzer;
use crate::fallback::FallbackTable;
use crate::history::PriceHistory;
use crate::source::{ensure_positive, PriceSource, SourceError, SourceRegistry};
use crate::types::{MarketAlert, PricePoint};

/// Raw points and per-cycle consolidated points of one variety
#[derive(Debug, Clone)]
struct VarietySeries {
    points: PriceHistory,
    cycles: PriceHistory,
}

impl VarietySeries {
    fn new(retention: usize) -> Self {
        Self {
            points: PriceHistory::new(retention),
            cycles: PriceHistory::new(retention),
        }
    }
}

pub struct PriceAggregator {
    registry: SourceRegistry,
    varieties: Vec<Variety>,
    histories: RwLock<HashMap<Variety, VarietySeries>>,
    retention: usize,
    source_timeout: Duration,
    fallback: FallbackTable,
    cache: Arc<CacheStore>,
    analyzer: MarketAnalyzer,
    detector: AlertDetector,
    alerts: Arc<AlertBus>,
    clock: SharedClock,
    metrics: MarketMetrics,
    /// Serialises cycles so history appends keep cycle order
    cycle: tokio::sync::Mutex<()>,
}

/// Settings a [`PriceAggregator`] is built from
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub varieties: Vec<Variety>,
    pub retention: usize,
    pub source_timeout: Duration,
}

impl AggregatorSettings {
    pub fn from_config(config: &config::MasterConfig) -> Self {
        Self {
            varieties: config.market.varieties.clone(),
            retention: config.market.retention_window,
            source_timeout: config.market.source_timeout(),
        }
    }
}

impl PriceAggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: AggregatorSettings,
        registry: SourceRegistry,
        fallback: FallbackTable,
        cache: Arc<CacheStore>,
        analyzer: MarketAnalyzer,
        detector: AlertDetector,
        alerts: Arc<AlertBus>,
        clock: SharedClock,
    ) -> Self {
        let histories = settings
            .varieties
            .iter()
            .map(|v| (*v, VarietySeries::new(settings.retention)))
            .collect();

        Self {
            registry,
            varieties: settings.varieties,
            histories: RwLock::new(histories),
            retention: settings.retention,
            source_timeout: settings.source_timeout,
            fallback,
            cache,
            analyzer,
            detector,
            alerts,
            clock,
            metrics: MarketMetrics::new(),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn varieties(&self) -> &[Variety] {
        &self.varieties
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn fallback(&self) -> &FallbackTable {
        &self.fallback
    }

    /// Run one fetch cycle and return every point it produced
    ///
    /// Always returns at least one point per tracked variety: varieties for
    /// which every source failed get a fallback point.
    #[instrument(skip(self), fields(cycle_id = %uuid::Uuid::new_v4()))]
    pub async fn fetch_all_prices(&self) -> Vec<PricePoint> {
        let _cycle = self.cycle.lock().await;
        let _timer = self.metrics.start_cycle();

        let calls = self.varieties.iter().flat_map(|variety| {
            self.registry
                .for_variety(*variety)
                .map(move |source| self.fetch_one(source.clone(), *variety))
        });
        let results = join_all(calls).await;

        let now = self.clock.now();
        let mut produced = Vec::with_capacity(results.len());
        let mut consolidated = Vec::with_capacity(self.varieties.len());
        for variety in &self.varieties {
            let live: Vec<PricePoint> = results
                .iter()
                .filter_map(|(v, result)| match result {
                    Ok(point) if v == variety => Some(point.clone()),
                    _ => None,
                })
                .collect();

            if live.is_empty() {
                let point = self.fallback.point(*variety, Grade::STANDARD, now);
                warn!(
                    %variety,
                    source = %point.source,
                    price_per_kg = point.price_per_kg,
                    "All sources failed, using fallback price"
                );
                self.metrics.fallback_used(variety.as_str());
                consolidated.push(point.clone());
                produced.push(point);
            } else {
                consolidated.extend(consolidate(&live));
                produced.extend(live);
            }
        }

        let mut alerts = self.append(&produced, &consolidated);
        self.store_latest(&produced).await;
        alerts.extend(self.detect_condition_alerts());

        for alert in &alerts {
            self.alerts.emit(alert);
        }

        info!(
            prices = produced.len(),
            alerts = alerts.len(),
            "Fetch cycle complete"
        );
        produced
    }

    async fn fetch_one(
        &self,
        source: Arc<dyn PriceSource>,
        variety: Variety,
    ) -> (Variety, Result<PricePoint, SourceError>) {
        let limit = source.timeout().unwrap_or(self.source_timeout);
        let result = match tokio::time::timeout(limit, source.fetch(variety)).await {
            Ok(Ok(point)) if point.variety != variety => Err(SourceError::Parse(format!(
                "asked for {} but received {}",
                variety, point.variety
            ))),
            Ok(Ok(point)) => ensure_positive(point.price_per_kg).map(|_| point),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SourceError::Timeout(limit)),
        };

        match &result {
            Ok(point) => debug!(
                source = source.name(),
                %variety,
                price_per_kg = point.price_per_kg,
                "Source fetch succeeded"
            ),
            Err(e) => {
                warn!(source = source.name(), %variety, error = %e, "Source fetch failed");
                self.metrics.source_failed(source.name());
            }
        }
        (variety, result)
    }

    /// Append raw points in variety then source order, and one consolidated
    /// point per variety; returns spike/drop alerts between consecutive cycles
    fn append(&self, points: &[PricePoint], consolidated: &[PricePoint]) -> Vec<MarketAlert> {
        let mut alerts = Vec::new();
        let mut histories = self.histories.write();

        for point in points {
            histories
                .entry(point.variety)
                .or_insert_with(|| VarietySeries::new(self.retention))
                .points
                .push(point.clone());
        }

        for point in consolidated {
            let series = histories
                .entry(point.variety)
                .or_insert_with(|| VarietySeries::new(self.retention));
            if let Some(previous) = series.cycles.latest() {
                alerts.extend(self.detector.price_move(point, previous));
            }
            series.cycles.push(point.clone());
        }
        alerts
    }

    async fn store_latest(&self, points: &[PricePoint]) {
        for variety in &self.varieties {
            if let Some(latest) = points.iter().rev().find(|p| p.variety == *variety) {
                self.cache
                    .insert(ResourceKind::Price, variety.as_str(), latest.clone(), PRICE_TTL)
                    .await;
            }
        }
    }

    fn detect_condition_alerts(&self) -> Vec<MarketAlert> {
        let now = self.clock.now();
        let histories = self.histories.read();
        let mut alerts = Vec::new();

        for variety in &self.varieties {
            let Some(series) = histories.get(variety) else {
                continue;
            };
            let Some(latest) = series.cycles.latest() else {
                continue;
            };
            let prices = series.cycles.prices();
            let volatility = self.analyzer.volatility(&prices);
            let (trend, change) = self.analyzer.trend(&prices);

            alerts.extend(self.detector.volatility(latest, volatility, now));
            alerts.extend(self.detector.trend_shift(latest, trend, change, now));
        }
        alerts
    }

    /// Snapshot of a variety's history, oldest first
    pub fn history(&self, variety: Variety) -> Vec<PricePoint> {
        self.histories
            .read()
            .get(&variety)
            .map(|series| series.points.to_vec())
            .unwrap_or_default()
    }

    /// One consolidated point per cycle, oldest first
    pub fn cycle_history(&self, variety: Variety) -> Vec<PricePoint> {
        self.histories
            .read()
            .get(&variety)
            .map(|series| series.cycles.to_vec())
            .unwrap_or_default()
    }

    /// Most recent point for a variety and grade
    pub fn latest(&self, variety: Variety, grade: Grade) -> Option<PricePoint> {
        self.histories
            .read()
            .get(&variety)
            .and_then(|series| series.points.latest_for_grade(grade))
            .cloned()
    }

    /// Most recent point for a variety, any grade
    pub fn latest_any_grade(&self, variety: Variety) -> Option<PricePoint> {
        self.histories
            .read()
            .get(&variety)
            .and_then(|series| series.points.latest())
            .cloned()
    }
}

/// Median of one cycle's live points for a variety
///
/// A single point is kept as is. Otherwise the source tag joins every
/// contributing source with `+` and the timestamp is the newest quote's.
pub(crate) fn consolidate(points: &[PricePoint]) -> Option<PricePoint> {
    let first = points.first()?;
    if points.len() == 1 {
        return Some(first.clone());
    }

    let mut prices: Vec<f64> = points.iter().map(|p| p.price_per_kg).collect();
    prices.sort_by(f64::total_cmp);
    let mid = prices.len() / 2;
    let median = if prices.len() % 2 == 0 {
        (prices[mid - 1] + prices[mid]) / 2.0
    } else {
        prices[mid]
    };

    let source = points
        .iter()
        .map(|p| p.source.as_str())
        .collect::<Vec<_>>()
        .join("+");
    let timestamp = points
        .iter()
        .map(|p| p.timestamp)
        .max()
        .unwrap_or(first.timestamp);

    Some(PricePoint::new(
        first.variety,
        first.grade,
        median,
        source,
        timestamp,
    ))
}

impl std::fmt::Debug for PriceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceAggregator")
            .field("registry", &self.registry)
            .field("varieties", &self.varieties)
            .field("retention", &self.retention)
            .field("source_timeout", &self.source_timeout)
            .finish_non_exhaustive()
    }
}
