use common::Variety;
use std::collections::BTreeMap;

pub fn default_enabled() -> bool {
    true
}

pub fn default_service_name() -> String {
    "coffeex".to_string()
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_varieties() -> Vec<Variety> {
    Variety::ALL.to_vec()
}

pub fn default_retention_window() -> usize {
    100
}

pub fn default_volatility_window() -> usize {
    20
}

pub fn default_fetch_interval_seconds() -> u64 {
    300
}

pub fn default_run_on_startup() -> bool {
    true
}

pub fn default_source_timeout_seconds() -> u64 {
    10
}

pub fn default_grade() -> u8 {
    1
}

pub fn default_fallback_source_tag() -> String {
    "DEFAULT".to_string()
}

/// Last-resort USD/kg price used when every live source fails
pub fn default_fallback_price(variety: Variety) -> f64 {
    match variety {
        Variety::Arabica => 4.50,
        Variety::Robusta => 2.80,
        Variety::Specialty => 6.50,
        Variety::Organic => 5.20,
    }
}

pub fn default_fallback_prices() -> BTreeMap<Variety, f64> {
    Variety::ALL
        .iter()
        .map(|variety| (*variety, default_fallback_price(*variety)))
        .collect()
}

pub fn default_spike_threshold_percent() -> f64 {
    5.0
}

pub fn default_drop_threshold_percent() -> f64 {
    5.0
}

pub fn default_volatility_threshold_percent() -> f64 {
    10.0
}

pub fn default_emit_trend_changes() -> bool {
    true
}

pub fn default_acceptable_deviation_percent() -> f64 {
    20.0
}

pub fn default_trend_threshold_percent() -> f64 {
    2.0
}

pub fn default_stale_after_hours() -> u64 {
    24
}

pub fn default_ledger_timeout_seconds() -> u64 {
    10
}

pub fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}
