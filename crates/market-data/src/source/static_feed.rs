use async_trait::async_trait;
use common::{Grade, SharedClock, Variety};
use config::SourceConfig;
use std::collections::BTreeMap;

use super::{PriceSource, SourceError, SourceResult};
use crate::types::PricePoint;

/// Fixed prices, for offline deployments and lots no exchange quotes
pub struct StaticFeed {
    name: String,
    /// USD/kg
    prices: BTreeMap<Variety, f64>,
    grade: Grade,
    clock: SharedClock,
}

impl StaticFeed {
    pub fn new(
        name: impl Into<String>,
        prices: BTreeMap<Variety, f64>,
        grade: Grade,
        clock: SharedClock,
    ) -> Self {
        Self {
            name: name.into(),
            prices,
            grade,
            clock,
        }
    }

    /// Prices in the config are in the source's `unit`; they are normalised here
    pub fn from_config(source: &SourceConfig, clock: SharedClock) -> Self {
        let prices = source
            .prices
            .iter()
            .filter(|(variety, _)| source.supports(**variety))
            .map(|(variety, quote)| (*variety, source.unit.to_usd_per_kg(*quote)))
            .collect();
        Self::new(source.name.clone(), prices, Grade::new(source.grade), clock)
    }
}

#[async_trait]
impl PriceSource for StaticFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, variety: Variety) -> bool {
        self.prices.contains_key(&variety)
    }

    async fn fetch(&self, variety: Variety) -> SourceResult<PricePoint> {
        let price = self
            .prices
            .get(&variety)
            .copied()
            .ok_or(SourceError::UnsupportedVariety(variety))?;
        let price = super::ensure_positive(price)?;

        Ok(PricePoint::new(
            variety,
            self.grade,
            price,
            self.name.clone(),
            self.clock.now(),
        ))
    }
}
