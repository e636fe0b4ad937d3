//! Prometheus metrics
//!
//! Metrics are recorded through the `metrics` facade; without an installed
//! exporter every call is a no-op, so library code records unconditionally.

use metrics::{counter, histogram, Counter, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Start the Prometheus exporter on `0.0.0.0:<port>/metrics`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Metrics recorded by fetch cycles, alerting and ledger sync
///
/// # Metrics
///
/// * `market_fetch_cycles_total`
/// * `market_fetch_cycle_duration_seconds`
/// * `market_source_failures_total{source}`
/// * `market_fallback_prices_total{variety}`
/// * `market_alerts_emitted_total{alert_type}`
/// * `market_ledger_sync_total{outcome}`
///
/// Cache hit/miss counters (`cache_requests_total{kind,outcome}`) are
/// recorded by the cache crate itself.
#[derive(Clone)]
pub struct MarketMetrics {
    cycles_total: Counter,
    cycle_duration: Histogram,
}

impl MarketMetrics {
    pub fn new() -> Self {
        Self {
            cycles_total: counter!("market_fetch_cycles_total"),
            cycle_duration: histogram!("market_fetch_cycle_duration_seconds"),
        }
    }

    /// Record a completed fetch cycle
    pub fn record_cycle(&self, duration: Duration) {
        self.cycles_total.increment(1);
        self.cycle_duration.record(duration.as_secs_f64());
    }

    /// Start timing a cycle; the duration is recorded when the guard drops
    pub fn start_cycle(&self) -> CycleTimer<'_> {
        CycleTimer {
            metrics: self,
            start: Instant::now(),
        }
    }

    pub fn source_failed(&self, source: &str) {
        counter!("market_source_failures_total", "source" => source.to_string()).increment(1);
    }

    pub fn fallback_used(&self, variety: &str) {
        counter!("market_fallback_prices_total", "variety" => variety.to_string()).increment(1);
    }

    pub fn alert_emitted(&self, alert_type: &str) {
        counter!("market_alerts_emitted_total", "alert_type" => alert_type.to_string())
            .increment(1);
    }

    pub fn ledger_sync(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        counter!("market_ledger_sync_total", "outcome" => outcome).increment(1);
    }
}

impl Default for MarketMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MarketMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketMetrics").finish_non_exhaustive()
    }
}

/// Records the cycle duration on drop
pub struct CycleTimer<'a> {
    metrics: &'a MarketMetrics,
    start: Instant,
}

impl CycleTimer<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for CycleTimer<'_> {
    fn drop(&mut self) {
        self.metrics.record_cycle(self.start.elapsed());
    }
}
