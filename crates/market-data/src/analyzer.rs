//! Trend, volatility and price validation
//!
//! Everything here is a pure function of a history snapshot; nothing is
//! cached or persisted.

use chrono::{DateTime, Utc};
use common::Variety;
use config::MasterConfig;
use std::time::Duration;

use crate::types::{MarketConditions, PricePoint, Trend, ValidationResult};

#[derive(Debug, Clone)]
pub struct MarketAnalyzer {
    volatility_window: usize,
    trend_threshold: f64,
    acceptable_deviation: f64,
    high_volatility: f64,
    stale_after: Duration,
}

impl MarketAnalyzer {
    pub fn new(
        volatility_window: usize,
        trend_threshold: f64,
        acceptable_deviation: f64,
        high_volatility: f64,
        stale_after: Duration,
    ) -> Self {
        Self {
            volatility_window: volatility_window.max(1),
            trend_threshold,
            acceptable_deviation,
            high_volatility,
            stale_after,
        }
    }

    pub fn from_config(config: &MasterConfig) -> Self {
        Self::new(
            config.market.volatility_window,
            config.analysis.trend_threshold_percent,
            config.analysis.acceptable_deviation_percent,
            config.alerts.volatility_threshold_percent,
            config.analysis.stale_after(),
        )
    }

    pub fn acceptable_deviation(&self) -> f64 {
        self.acceptable_deviation
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Volatility over the most recent `volatility_window` prices
    pub fn volatility(&self, prices: &[f64]) -> f64 {
        let start = prices.len().saturating_sub(self.volatility_window);
        volatility_percent(&prices[start..])
    }

    pub fn trend(&self, prices: &[f64]) -> (Trend, f64) {
        let change = trend_change_percent(prices);
        (classify_trend(change, self.trend_threshold), change)
    }

    /// Derive market conditions from a history snapshot (oldest first)
    pub fn conditions(&self, variety: Variety, history: &[PricePoint]) -> MarketConditions {
        let prices: Vec<f64> = history.iter().map(|p| p.price_per_kg).collect();
        let volatility = self.volatility(&prices);
        let (trend, trend_change) = self.trend(&prices);

        MarketConditions {
            variety,
            trend,
            volatility,
            trend_change,
            recommendation: self.recommendation(prices.len(), trend, volatility),
            confidence: self.confidence(prices.len(), volatility),
            sample_size: prices.len(),
            latest_price: prices.last().copied(),
        }
    }

    /// Grows with sample size up to the volatility window and shrinks with volatility
    pub fn confidence(&self, sample_size: usize, volatility: f64) -> f64 {
        if sample_size == 0 {
            return 0.0;
        }
        let coverage = sample_size.min(self.volatility_window) as f64 / self.volatility_window as f64;
        let consistency = 1.0 / (1.0 + volatility.max(0.0) / 10.0);
        (100.0 * coverage * consistency).clamp(0.0, 100.0)
    }

    fn recommendation(&self, sample_size: usize, trend: Trend, volatility: f64) -> String {
        if sample_size == 0 {
            return "Insufficient data for a recommendation".to_string();
        }
        if volatility >= self.high_volatility {
            return format!(
                "High volatility ({:.1}%); consider hedging or staggering sales",
                volatility
            );
        }
        match trend {
            Trend::Bullish => "Prices trending upward; favorable conditions for selling",
            Trend::Bearish => "Prices trending downward; consider holding inventory",
            Trend::Stable => "Market stable; normal trading conditions",
        }
        .to_string()
    }

    /// Check `proposed` against a reference market price
    pub fn validate(
        &self,
        proposed: f64,
        reference: &PricePoint,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let market_price = reference.price_per_kg;
        let market_price_stale = reference.is_stale(now, self.stale_after);

        let (is_valid, deviation, message) = if !proposed.is_finite() || proposed <= 0.0 {
            (
                false,
                non_positive_deviation(proposed, market_price),
                "Price must be a positive number".to_string(),
            )
        } else {
            let deviation = deviation_percent(proposed, market_price);
            if deviation <= self.acceptable_deviation {
                (
                    true,
                    deviation,
                    format!(
                        "Price is within {:.2}% of the market price {:.2}",
                        deviation, market_price
                    ),
                )
            } else {
                (
                    false,
                    deviation,
                    format!(
                        "Price deviates {:.2}% from the market price {:.2} (limit {}%)",
                        deviation, market_price, self.acceptable_deviation
                    ),
                )
            }
        };

        ValidationResult {
            is_valid,
            deviation,
            market_price,
            market_source: reference.source.clone(),
            market_price_stale,
            message,
        }
    }
}

/// Sample standard deviation over mean, in percent; 0 for fewer than two prices
pub fn volatility_percent(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let n = prices.len() as f64;
    let mean = prices.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    // Deviations are taken around the first price so a flat series sums exact zeros
    let shift = prices[0];
    let (sum, sum_sq) = prices.iter().fold((0.0, 0.0), |(sum, sum_sq), p| {
        let d = p - shift;
        (sum + d, sum_sq + d * d)
    });
    let variance = ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0);
    variance.sqrt() / mean * 100.0
}

/// Percentage move of the recent half's mean over the older half's
///
/// The older half is the first `len / 2` prices; with an odd count the
/// middle price belongs to the recent half.
pub fn trend_change_percent(prices: &[f64]) -> f64 {
    let (older, recent) = prices.split_at(prices.len() / 2);
    if older.is_empty() || recent.is_empty() {
        return 0.0;
    }
    let older_mean = mean(older);
    if older_mean <= 0.0 {
        return 0.0;
    }
    (mean(recent) - older_mean) / older_mean * 100.0
}

pub fn classify_trend(change: f64, threshold: f64) -> Trend {
    if change > threshold {
        Trend::Bullish
    } else if change < -threshold {
        Trend::Bearish
    } else {
        Trend::Stable
    }
}

/// `|proposed - market| / market * 100`
pub fn deviation_percent(proposed: f64, market: f64) -> f64 {
    if market <= 0.0 {
        return f64::INFINITY;
    }
    (proposed - market).abs() / market * 100.0
}

/// Non-positive proposals always report a deviation above 100%
fn non_positive_deviation(proposed: f64, market: f64) -> f64 {
    let raw = deviation_percent(proposed, market);
    if raw.is_finite() {
        100.0 + raw
    } else {
        f64::INFINITY
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::Grade;

    fn analyzer() -> MarketAnalyzer {
        MarketAnalyzer::from_config(&config::generate_default_config())
    }

    fn history(prices: &[f64]) -> Vec<PricePoint> {
        let start = Utc::now() - ChronoDuration::minutes(prices.len() as i64 * 5);
        prices
            .iter()
            .enumerate()
            .map(|(i, price)| {
                PricePoint::new(
                    Variety::Arabica,
                    Grade::STANDARD,
                    *price,
                    "ICE_ARABICA",
                    start + ChronoDuration::minutes(i as i64 * 5),
                )
            })
            .collect()
    }

    fn reference(price: f64) -> PricePoint {
        PricePoint::new(Variety::Arabica, Grade::STANDARD, price, "ICE_ARABICA", Utc::now())
    }

    #[test]
    fn test_volatility_of_reference_series() {
        let prices = [4.00, 4.10, 3.90, 4.20, 4.05, 4.15, 3.95, 4.25];
        let vol = volatility_percent(&prices);

        assert!(vol > 0.0 && vol < 50.0);
        // sample std 0.12247 over mean 4.075
        assert!((vol - 3.0055).abs() < 1e-3, "vol = {}", vol);
        assert_eq!(vol, volatility_percent(&prices));
    }

    #[test]
    fn test_equal_prices_have_zero_volatility() {
        for price in [0.1, 2.8, 4.1, 4.5, 6.5, 1234.567] {
            for len in [2, 3, 10, 12, 20, 100] {
                let prices = vec![price; len];
                assert_eq!(volatility_percent(&prices), 0.0, "{} x {}", price, len);
            }
        }
        assert_eq!(analyzer().volatility(&[0.1; 10]), 0.0);
    }

    #[test]
    fn test_short_histories_have_zero_volatility() {
        assert_eq!(volatility_percent(&[]), 0.0);
        assert_eq!(volatility_percent(&[4.2]), 0.0);
    }

    #[test]
    fn test_volatility_uses_window() {
        let analyzer = MarketAnalyzer::new(3, 2.0, 20.0, 10.0, Duration::from_secs(86_400));
        // Only the last three equal prices count
        assert_eq!(analyzer.volatility(&[1.0, 9.0, 5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(analyzer().trend(&[4.0, 4.0, 4.3, 4.3]).0, Trend::Bullish);
        assert_eq!(analyzer().trend(&[4.3, 4.3, 4.0, 4.0]).0, Trend::Bearish);

        let (trend, change) = analyzer().trend(&[4.00, 4.10, 3.90, 4.20, 4.05, 4.15, 3.95, 4.25]);
        assert_eq!(trend, Trend::Stable);
        assert!((change - 1.2346).abs() < 1e-3);
    }

    #[test]
    fn test_trend_odd_split() {
        // older = [4.0], recent = [4.0, 5.0]
        let change = trend_change_percent(&[4.0, 4.0, 5.0]);
        assert!((change - 12.5).abs() < 1e-9);
        assert_eq!(trend_change_percent(&[4.0]), 0.0);
    }

    #[test]
    fn test_conditions_empty_history() {
        let conditions = analyzer().conditions(Variety::Robusta, &[]);
        assert_eq!(conditions.trend, Trend::Stable);
        assert_eq!(conditions.volatility, 0.0);
        assert_eq!(conditions.confidence, 0.0);
        assert_eq!(conditions.sample_size, 0);
        assert!(conditions.latest_price.is_none());
        assert!(conditions.recommendation.contains("Insufficient"));
    }

    #[test]
    fn test_conditions_high_volatility_recommendation() {
        let conditions = analyzer().conditions(Variety::Arabica, &history(&[3.0, 5.0, 3.0, 5.0]));
        assert!(conditions.volatility >= 10.0);
        assert!(conditions.recommendation.contains("High volatility"));
        assert_eq!(conditions.latest_price, Some(5.0));
    }

    #[test]
    fn test_confidence_monotonic() {
        let analyzer = analyzer();
        let small = analyzer.confidence(5, 2.0);
        let large = analyzer.confidence(20, 2.0);
        let noisy = analyzer.confidence(20, 15.0);

        assert!(large > small);
        assert!(large > noisy);
        assert_eq!(analyzer.confidence(40, 0.0), 100.0);
        assert!((0.0..=100.0).contains(&noisy));
    }

    #[test]
    fn test_validate_reflexive() {
        let result = analyzer().validate(4.5, &reference(4.5), Utc::now());
        assert!(result.is_valid);
        assert_eq!(result.deviation, 0.0);
        assert_eq!(result.market_price, 4.5);
    }

    #[test]
    fn test_validate_within_threshold() {
        let result = analyzer().validate(5.00, &reference(4.50), Utc::now());
        assert!(result.is_valid);
        assert!((result.deviation - 11.11).abs() < 0.01);
        assert!(!result.market_price_stale);
    }

    #[test]
    fn test_validate_outside_threshold() {
        let result = analyzer().validate(6.00, &reference(4.50), Utc::now());
        assert!(!result.is_valid);
        assert!((result.deviation - 33.33).abs() < 0.01);
        assert!(result.message.contains("limit 20"));
    }

    #[test]
    fn test_validate_non_positive() {
        let negative = analyzer().validate(-1.0, &reference(4.50), Utc::now());
        assert!(!negative.is_valid);
        assert!(negative.deviation > 100.0);

        let zero = analyzer().validate(0.0, &reference(4.50), Utc::now());
        assert!(!zero.is_valid);
        assert!(zero.deviation > 100.0);

        let nan = analyzer().validate(f64::NAN, &reference(4.50), Utc::now());
        assert!(!nan.is_valid);
        assert!(nan.deviation > 100.0);
    }

    #[test]
    fn test_validate_flags_stale_reference() {
        let mut old = reference(4.5);
        old.timestamp = Utc::now() - ChronoDuration::hours(25);

        let result = analyzer().validate(4.6, &old, Utc::now());
        assert!(result.is_valid);
        assert!(result.market_price_stale);
    }
}
