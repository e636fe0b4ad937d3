//! Hand-written price sources for tests

use async_trait::async_trait;
use common::{Grade, SharedClock, Variety};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::source::{PriceSource, SourceError};
use crate::types::PricePoint;

/// Quotes fixed prices, optionally after a delay or not at all; counts calls
pub(crate) struct StubSource {
    name: String,
    prices: HashMap<Variety, f64>,
    delay: Option<Duration>,
    fail: bool,
    clock: SharedClock,
    pub calls: AtomicUsize,
}

impl StubSource {
    pub(crate) fn quoting(name: &str, prices: &[(Variety, f64)], clock: SharedClock) -> Self {
        Self {
            name: name.to_string(),
            prices: prices.iter().copied().collect(),
            delay: None,
            fail: false,
            clock,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(name: &str, varieties: &[Variety], clock: SharedClock) -> Self {
        let quotes: Vec<_> = varieties.iter().map(|v| (*v, 1.0)).collect();
        let mut stub = Self::quoting(name, &quotes, clock);
        stub.fail = true;
        stub
    }

    pub(crate) fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl PriceSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, variety: Variety) -> bool {
        self.prices.contains_key(&variety)
    }

    async fn fetch(&self, variety: Variety) -> Result<PricePoint, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SourceError::Transport("connection reset".to_string()));
        }
        let price = self
            .prices
            .get(&variety)
            .copied()
            .ok_or(SourceError::UnsupportedVariety(variety))?;
        Ok(PricePoint::new(
            variety,
            Grade::STANDARD,
            price,
            self.name.clone(),
            self.clock.now(),
        ))
    }
}

/// Quotes whatever price the test last set, for every variety
pub(crate) struct DynamicSource {
    name: String,
    price: Mutex<f64>,
    clock: SharedClock,
}

impl DynamicSource {
    pub(crate) fn new(name: &str, price: f64, clock: SharedClock) -> Self {
        Self {
            name: name.to_string(),
            price: Mutex::new(price),
            clock,
        }
    }

    pub(crate) fn set_price(&self, price: f64) {
        *self.price.lock() = price;
    }
}

#[async_trait]
impl PriceSource for DynamicSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _variety: Variety) -> bool {
        true
    }

    async fn fetch(&self, variety: Variety) -> Result<PricePoint, SourceError> {
        let price = *self.price.lock();
        Ok(PricePoint::new(
            variety,
            Grade::STANDARD,
            price,
            self.name.clone(),
            self.clock.now(),
        ))
    }
}
