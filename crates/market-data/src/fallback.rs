//! Static last-resort prices
//!
//! When every source fails for a variety the aggregator synthesizes a point
//! from this table so a cycle never comes back empty.

use chrono::{DateTime, Utc};
use common::{Grade, Variety};
use config::FallbackConfig;
use std::collections::BTreeMap;

use crate::types::{PricePoint, FALLBACK_SUFFIX};

#[derive(Debug, Clone)]
pub struct FallbackTable {
    source: String,
    prices: BTreeMap<Variety, f64>,
}

impl FallbackTable {
    pub fn new(source_tag: &str, prices: BTreeMap<Variety, f64>) -> Self {
        Self {
            source: format!("{}{}", source_tag, FALLBACK_SUFFIX),
            prices,
        }
    }

    /// Compiled-in table (`DEFAULT_FALLBACK`)
    pub fn standard() -> Self {
        Self::new(
            &config::default_fallback_source_tag(),
            config::default_fallback_prices(),
        )
    }

    /// Configured prices, with the standard table filling any gap
    pub fn from_config(fallback: &FallbackConfig) -> Self {
        let mut prices = config::default_fallback_prices();
        prices.extend(
            fallback
                .prices
                .iter()
                .filter(|(_, price)| price.is_finite() && **price > 0.0)
                .map(|(variety, price)| (*variety, *price)),
        );
        Self::new(&fallback.source_tag, prices)
    }

    /// Source tag carried by synthesized points
    pub fn source_name(&self) -> &str {
        &self.source
    }

    /// USD/kg for `variety`
    pub fn price(&self, variety: Variety) -> f64 {
        self.prices
            .get(&variety)
            .copied()
            .unwrap_or_else(|| config::default_fallback_price(variety))
    }

    pub fn point(&self, variety: Variety, grade: Grade, now: DateTime<Utc>) -> PricePoint {
        PricePoint::new(variety, grade, self.price(variety), self.source.clone(), now)
    }
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let table = FallbackTable::standard();
        assert_eq!(table.source_name(), "DEFAULT_FALLBACK");
        assert_eq!(table.price(Variety::Arabica), 4.50);
        assert_eq!(table.price(Variety::Robusta), 2.80);

        let point = table.point(Variety::Organic, Grade::STANDARD, Utc::now());
        assert!(point.is_fallback());
        assert_eq!(point.price_per_kg, 5.20);
    }

    #[test]
    fn test_sparse_table_uses_default_prices() {
        let table = FallbackTable::new("SPARSE", BTreeMap::from([(Variety::Robusta, 3.1)]));

        assert_eq!(table.price(Variety::Robusta), 3.1);
        for variety in [Variety::Arabica, Variety::Specialty, Variety::Organic] {
            assert_eq!(table.price(variety), config::default_fallback_prices()[&variety]);
        }
    }

    #[test]
    fn test_config_overrides_and_gaps() {
        let cfg = FallbackConfig {
            source_tag: "ORACLE".to_string(),
            prices: BTreeMap::from([(Variety::Arabica, 4.9), (Variety::Robusta, -1.0)]),
        };
        let table = FallbackTable::from_config(&cfg);

        assert_eq!(table.source_name(), "ORACLE_FALLBACK");
        assert_eq!(table.price(Variety::Arabica), 4.9);
        // Invalid and missing entries keep the standard price
        assert_eq!(table.price(Variety::Robusta), 2.80);
        assert_eq!(table.price(Variety::Specialty), 6.50);
    }
}
