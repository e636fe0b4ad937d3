//! Market alert fan-out and detection
//!
//! [`AlertBus`] delivers alerts to callback subscribers and to broadcast
//! channel receivers. [`AlertDetector`] decides which price moves are worth
//! an alert.

use chrono::{DateTime, Utc};
use common::Variety;
use config::AlertConfig;
use observability::MarketMetrics;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::types::{AlertType, MarketAlert, PricePoint, Trend};

/// Callback invoked for every emitted alert
///
/// Subscriptions are identified by the `Arc` allocation: keep a clone of the
/// handle passed to [`AlertBus::subscribe`] to unsubscribe later.
pub type AlertCallback = Arc<dyn Fn(&MarketAlert) + Send + Sync>;

const CHANNEL_CAPACITY: usize = 256;

pub struct AlertBus {
    subscribers: RwLock<Vec<AlertCallback>>,
    channel: broadcast::Sender<MarketAlert>,
    metrics: MarketMetrics,
}

impl AlertBus {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            subscribers: RwLock::new(Vec::new()),
            channel,
            metrics: MarketMetrics::new(),
        }
    }

    /// Register a callback; returns false if this exact handle is already subscribed
    pub fn subscribe(&self, callback: AlertCallback) -> bool {
        let mut subscribers = self.subscribers.write();
        if subscribers.iter().any(|s| same_callback(s, &callback)) {
            return false;
        }
        subscribers.push(callback);
        debug!(subscribers = subscribers.len(), "Alert subscriber added");
        true
    }

    /// Remove a callback; unknown or already removed handles are ignored
    pub fn unsubscribe(&self, callback: &AlertCallback) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| !same_callback(s, callback));
        before != subscribers.len()
    }

    /// Receiver for alerts emitted from now on
    ///
    /// A receiver that falls more than the channel capacity behind loses the
    /// oldest alerts (`RecvError::Lagged`); the emitter never waits.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<MarketAlert> {
        self.channel.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `alert` to every current subscriber in registration order
    ///
    /// Works on a snapshot taken at call time; a panicking subscriber is
    /// logged and skipped. Returns the number of callbacks that completed.
    pub fn emit(&self, alert: &MarketAlert) -> usize {
        let snapshot: Vec<AlertCallback> = self.subscribers.read().clone();
        let mut delivered = 0;

        for (index, callback) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(alert))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    subscriber = index,
                    alert_type = %alert.alert_type,
                    variety = %alert.variety,
                    "Alert subscriber panicked"
                ),
            }
        }

        // No receivers is not an error
        let _ = self.channel.send(alert.clone());

        self.metrics.alert_emitted(alert.alert_type.as_str());
        info!(
            alert_type = %alert.alert_type,
            variety = %alert.variety,
            change_percent = alert.change_percent,
            delivered,
            "{}",
            alert.message
        );
        delivered
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlertBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertBus")
            .field("subscribers", &self.subscriber_count())
            .field("receivers", &self.channel.receiver_count())
            .finish()
    }
}

fn same_callback(a: &AlertCallback, b: &AlertCallback) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Turns price moves, volatility readings and trend shifts into alerts
///
/// Volatility and trend alerts fire on transitions only: a variety that
/// stays above the volatility threshold alerts once, not every cycle.
#[derive(Debug)]
pub struct AlertDetector {
    thresholds: AlertConfig,
    volatile: Mutex<HashMap<Variety, bool>>,
    trends: Mutex<HashMap<Variety, Trend>>,
}

impl AlertDetector {
    pub fn new(thresholds: AlertConfig) -> Self {
        Self {
            thresholds,
            volatile: Mutex::new(HashMap::new()),
            trends: Mutex::new(HashMap::new()),
        }
    }

    pub fn thresholds(&self) -> &AlertConfig {
        &self.thresholds
    }

    /// Spike or drop of `current` relative to the preceding point of the same variety
    pub fn price_move(&self, current: &PricePoint, previous: &PricePoint) -> Option<MarketAlert> {
        if previous.price_per_kg <= 0.0 {
            return None;
        }
        let change = (current.price_per_kg - previous.price_per_kg) / previous.price_per_kg * 100.0;

        let (alert_type, message) = if change >= self.thresholds.spike_threshold_percent {
            (
                AlertType::PriceSpike,
                format!(
                    "{} price rose {:.2}% to {:.2} USD/kg",
                    current.variety, change, current.price_per_kg
                ),
            )
        } else if change <= -self.thresholds.drop_threshold_percent {
            (
                AlertType::PriceDrop,
                format!(
                    "{} price fell {:.2}% to {:.2} USD/kg",
                    current.variety,
                    change.abs(),
                    current.price_per_kg
                ),
            )
        } else {
            return None;
        };

        Some(MarketAlert {
            variety: current.variety,
            grade: current.grade,
            alert_type,
            current_price: current.price_per_kg,
            previous_price: previous.price_per_kg,
            change_percent: change,
            timestamp: current.timestamp,
            message,
        })
    }

    /// Alert when `volatility` crosses above the threshold
    pub fn volatility(
        &self,
        latest: &PricePoint,
        volatility: f64,
        now: DateTime<Utc>,
    ) -> Option<MarketAlert> {
        let above = volatility >= self.thresholds.volatility_threshold_percent;
        let was_above = self
            .volatile
            .lock()
            .insert(latest.variety, above)
            .unwrap_or(false);

        if !above || was_above {
            return None;
        }

        Some(MarketAlert {
            variety: latest.variety,
            grade: latest.grade,
            alert_type: AlertType::Volatility,
            current_price: latest.price_per_kg,
            previous_price: latest.price_per_kg,
            change_percent: volatility,
            timestamp: now,
            message: format!(
                "{} volatility reached {:.2}% (threshold {}%)",
                latest.variety, volatility, self.thresholds.volatility_threshold_percent
            ),
        })
    }

    /// Alert when the trend classification differs from the previous cycle's
    ///
    /// The first classification of a variety only records the baseline.
    pub fn trend_shift(
        &self,
        latest: &PricePoint,
        trend: Trend,
        trend_change: f64,
        now: DateTime<Utc>,
    ) -> Option<MarketAlert> {
        let previous = self.trends.lock().insert(latest.variety, trend);
        if !self.thresholds.emit_trend_changes {
            return None;
        }
        let previous = previous?;
        if previous == trend {
            return None;
        }

        Some(MarketAlert {
            variety: latest.variety,
            grade: latest.grade,
            alert_type: AlertType::SeasonalChange,
            current_price: latest.price_per_kg,
            previous_price: latest.price_per_kg,
            change_percent: trend_change,
            timestamp: now,
            message: format!(
                "{} market turned {} (was {}, {:+.2}%)",
                latest.variety, trend, previous, trend_change
            ),
        })
    }
}

impl Default for AlertDetector {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Grade;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert(
        variety: Variety,
        alert_type: AlertType,
        current_price: f64,
        previous_price: f64,
    ) -> MarketAlert {
        let change_percent = if previous_price > 0.0 {
            (current_price - previous_price) / previous_price * 100.0
        } else {
            0.0
        };
        MarketAlert {
            variety,
            grade: Grade::STANDARD,
            alert_type,
            current_price,
            previous_price,
            change_percent,
            timestamp: Utc::now(),
            message: format!("{} {}", variety, alert_type),
        }
    }

    fn counting(counter: &Arc<AtomicUsize>) -> AlertCallback {
        let counter = counter.clone();
        Arc::new(move |_alert: &MarketAlert| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn point(variety: Variety, price: f64) -> PricePoint {
        PricePoint::new(variety, Grade::STANDARD, price, "TEST", Utc::now())
    }

    #[test]
    fn test_subscribe_emit_unsubscribe_delivers_once() {
        let bus = AlertBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let callback = counting(&count);

        bus.subscribe(callback.clone());
        bus.emit(&alert(Variety::Arabica, AlertType::PriceSpike, 4.8, 4.5));
        assert!(bus.unsubscribe(&callback));
        bus.emit(&alert(Variety::Arabica, AlertType::PriceSpike, 5.1, 4.8));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = AlertBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let callback = counting(&count);
        let stranger = counting(&count);

        bus.subscribe(callback.clone());
        assert!(!bus.unsubscribe(&stranger));
        assert!(bus.unsubscribe(&callback));
        assert!(!bus.unsubscribe(&callback));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_identity_is_by_handle() {
        let bus = AlertBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let first = counting(&count);
        let second = counting(&count);

        assert!(bus.subscribe(first.clone()));
        assert!(!bus.subscribe(first.clone()));
        assert!(bus.subscribe(second.clone()));
        assert_eq!(bus.subscriber_count(), 2);

        bus.unsubscribe(&first);
        bus.emit(&alert(Variety::Robusta, AlertType::PriceDrop, 2.5, 2.8));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_isolated() {
        let bus = AlertBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(|_alert: &MarketAlert| panic!("subscriber failure")));
        bus.subscribe(counting(&count));

        let delivered = bus.emit(&alert(Variety::Arabica, AlertType::Volatility, 4.5, 4.5));

        assert_eq!(delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_order() {
        let bus = AlertBus::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = order.clone();
            bus.subscribe(Arc::new(move |_alert: &MarketAlert| order.lock().push(id)));
        }
        bus.emit(&alert(Variety::Organic, AlertType::PriceSpike, 6.0, 5.2));

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_subscription_during_emit_uses_snapshot() {
        let bus = Arc::new(AlertBus::new());
        let late = Arc::new(AtomicUsize::new(0));

        let bus_handle = bus.clone();
        let late_handle = late.clone();
        bus.subscribe(Arc::new(move |_alert: &MarketAlert| {
            bus_handle.subscribe(counting(&late_handle));
        }));

        bus.emit(&alert(Variety::Arabica, AlertType::PriceSpike, 4.8, 4.5));
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_unsubscribe_during_emit_takes_effect_next_emit() {
        let bus = Arc::new(AlertBus::new());
        let second_count = Arc::new(AtomicUsize::new(0));
        let second = counting(&second_count);

        let bus_handle = bus.clone();
        let target = second.clone();
        bus.subscribe(Arc::new(move |_alert: &MarketAlert| {
            bus_handle.unsubscribe(&target);
        }));
        bus.subscribe(second);

        bus.emit(&alert(Variety::Arabica, AlertType::PriceSpike, 4.8, 4.5));
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(&alert(Variety::Arabica, AlertType::PriceSpike, 5.1, 4.8));
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let bus = AlertBus::new();
        let mut rx = bus.subscribe_channel();

        bus.emit(&alert(Variety::Robusta, AlertType::PriceDrop, 2.5, 2.8));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.alert_type, AlertType::PriceDrop);
        assert_eq!(received.variety, Variety::Robusta);
    }

    #[tokio::test]
    async fn test_lagging_channel_drops_oldest() {
        let bus = AlertBus::new();
        let mut rx = bus.subscribe_channel();

        for i in 0..(CHANNEL_CAPACITY + 4) {
            bus.emit(&alert(Variety::Arabica, AlertType::PriceSpike, 4.0 + i as f64, 4.0));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(4))
        ));
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_spike_and_drop_thresholds() {
        let detector = AlertDetector::default();
        let base = point(Variety::Arabica, 4.00);

        let spike = detector.price_move(&point(Variety::Arabica, 4.20), &base).unwrap();
        assert_eq!(spike.alert_type, AlertType::PriceSpike);
        assert!((spike.change_percent - 5.0).abs() < 1e-9);
        assert_eq!(spike.previous_price, 4.00);

        let drop = detector.price_move(&point(Variety::Arabica, 3.70), &base).unwrap();
        assert_eq!(drop.alert_type, AlertType::PriceDrop);

        assert!(detector.price_move(&point(Variety::Arabica, 4.10), &base).is_none());
        assert!(detector.price_move(&point(Variety::Arabica, 3.85), &base).is_none());
    }

    #[test]
    fn test_volatility_alerts_on_crossing_only() {
        let detector = AlertDetector::default();
        let latest = point(Variety::Robusta, 2.8);
        let now = Utc::now();

        assert!(detector.volatility(&latest, 4.0, now).is_none());
        let alert = detector.volatility(&latest, 12.0, now).unwrap();
        assert_eq!(alert.alert_type, AlertType::Volatility);
        assert_eq!(alert.change_percent, 12.0);

        // Still above: no repeat
        assert!(detector.volatility(&latest, 14.0, now).is_none());
        // Back below, then above again
        assert!(detector.volatility(&latest, 3.0, now).is_none());
        assert!(detector.volatility(&latest, 11.0, now).is_some());
    }

    #[test]
    fn test_trend_shift() {
        let detector = AlertDetector::default();
        let latest = point(Variety::Arabica, 4.5);
        let now = Utc::now();

        assert!(detector.trend_shift(&latest, Trend::Stable, 0.5, now).is_none());
        assert!(detector.trend_shift(&latest, Trend::Stable, 1.0, now).is_none());

        let alert = detector.trend_shift(&latest, Trend::Bullish, 3.2, now).unwrap();
        assert_eq!(alert.alert_type, AlertType::SeasonalChange);
        assert!(alert.message.contains("BULLISH"));
    }

    #[test]
    fn test_trend_shift_disabled() {
        let detector = AlertDetector::new(AlertConfig {
            emit_trend_changes: false,
            ..AlertConfig::default()
        });
        let latest = point(Variety::Arabica, 4.5);
        let now = Utc::now();

        detector.trend_shift(&latest, Trend::Stable, 0.0, now);
        assert!(detector.trend_shift(&latest, Trend::Bearish, -3.0, now).is_none());
    }
}
