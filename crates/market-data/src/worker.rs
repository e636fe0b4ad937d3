//! Background worker that runs fetch cycles on a fixed interval
//!
//! Each cycle fetches every price and then forwards the batch to the ledger.
//! A failed ledger push is logged and the next cycle runs as usual.

use config::MasterConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::coordinator::MarketDataCoordinator;

/// What one cycle produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub prices: usize,
    pub fallbacks: usize,
    pub ledger_synced: bool,
}

pub struct MarketDataWorker {
    coordinator: Arc<MarketDataCoordinator>,
    interval: Duration,
    run_on_startup: bool,
}

impl MarketDataWorker {
    pub fn new(
        coordinator: Arc<MarketDataCoordinator>,
        interval: Duration,
        run_on_startup: bool,
    ) -> Self {
        Self {
            coordinator,
            interval,
            run_on_startup,
        }
    }

    pub fn from_config(coordinator: Arc<MarketDataCoordinator>, config: &MasterConfig) -> Self {
        Self::new(
            coordinator,
            config.market.fetch_interval(),
            config.market.run_on_startup,
        )
    }

    pub fn coordinator(&self) -> &Arc<MarketDataCoordinator> {
        &self.coordinator
    }

    /// Run until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Starting MarketDataWorker"
        );

        if self.run_on_startup {
            info!("Running initial fetch cycle");
            self.run_cycle().await;
        }

        let mut timer = tokio::time::interval(self.interval);
        timer.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("MarketDataWorker shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Fetch every price, then push the batch to the ledger
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleSummary {
        let prices = self.coordinator.fetch_all_prices().await;
        let fallbacks = prices.iter().filter(|p| p.is_fallback()).count();
        let ledger_synced = self.coordinator.update_ledger_prices(&prices).await;

        if !ledger_synced {
            warn!(prices = prices.len(), "Ledger not updated this cycle");
        }

        CycleSummary {
            prices: prices.len(),
            fallbacks,
            ledger_synced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, MockLedgerClient};
    use crate::source::SourceRegistry;
    use crate::testing::StubSource;
    use cache::CacheStore;
    use common::{ManualClock, Variety};

    fn coordinator_with_ledger(ledger: MockLedgerClient) -> Arc<MarketDataCoordinator> {
        let clock = ManualClock::starting_now();
        let registry = SourceRegistry::new().with(Arc::new(StubSource::quoting(
            "ICE",
            &[(Variety::Arabica, 4.4)],
            clock.clone(),
        )));
        let config = config::generate_default_config();
        Arc::new(MarketDataCoordinator::new(
            &config,
            registry,
            Arc::new(ledger),
            Arc::new(CacheStore::new(clock)),
        ))
    }

    #[tokio::test]
    async fn test_cycle_summary() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_push_prices().times(1).returning(|_| Ok(()));
        let worker = MarketDataWorker::new(
            coordinator_with_ledger(ledger),
            Duration::from_secs(300),
            true,
        );

        let summary = worker.run_cycle().await;

        assert_eq!(
            summary,
            CycleSummary {
                prices: 4,
                fallbacks: 3,
                ledger_synced: true,
            }
        );
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_stop_cycle() {
        let mut ledger = MockLedgerClient::new();
        ledger
            .expect_push_prices()
            .returning(|_| Err(LedgerError::Transport("connection refused".to_string())));
        let worker = MarketDataWorker::new(
            coordinator_with_ledger(ledger),
            Duration::from_secs(300),
            false,
        );

        let first = worker.run_cycle().await;
        let second = worker.run_cycle().await;

        assert!(!first.ledger_synced);
        assert!(!second.ledger_synced);
        assert_eq!(
            worker.coordinator().get_price_history(Variety::Arabica).len(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cycles_on_interval_until_shutdown() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_push_prices().returning(|_| Ok(()));
        let coordinator = coordinator_with_ledger(ledger);
        let worker = MarketDataWorker::new(coordinator.clone(), Duration::from_secs(60), true);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        // startup cycle plus ticks at 60s and 120s
        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(coordinator.get_price_history(Variety::Arabica).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_startup_cycle_when_disabled() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_push_prices().returning(|_| Ok(()));
        let coordinator = coordinator_with_ledger(ledger);
        let worker = MarketDataWorker::new(coordinator.clone(), Duration::from_secs(60), false);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(coordinator.get_price_history(Variety::Arabica).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_worker() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_push_prices().returning(|_| Ok(()));
        let worker = MarketDataWorker::new(
            coordinator_with_ledger(ledger),
            Duration::from_secs(3600),
            false,
        );

        let (tx, rx) = watch::channel(false);
        drop(tx);
        worker.run(rx).await;
    }
}
