use crate::*;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("At least one variety must be tracked")]
    NoTrackedVarieties,

    #[error("At least one price source must be enabled")]
    NoEnabledSources,

    #[error("Duplicate source name '{0}'")]
    DuplicateSourceName(String),

    #[error("Source '{name}': {message}")]
    InvalidSource { name: String, message: String },

    #[error("Fallback price for {variety} must be a positive number, got: {price}")]
    InvalidFallbackPrice { variety: Variety, price: f64 },

    #[error("No fallback price configured for tracked variety {0}")]
    MissingFallbackPrice(Variety),

    #[error("Fallback source tag is required")]
    MissingFallbackTag,

    #[error("Ledger: {message}")]
    InvalidLedger { message: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("{field} must be between 0 and 100")]
    InvalidPercentageRange { field: String },

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &MasterConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_service(&config.service, &mut report);
    validate_market(&config.market, &mut report);
    validate_sources(&config.sources, &mut report);
    validate_fallback(&config.fallback, &config.market.varieties, &mut report);
    validate_alerts(&config.alerts, &mut report);
    validate_analysis(&config.analysis, &mut report);
    validate_ledger(&config.ledger, &mut report);

    report
}

fn validate_service(service: &ServiceConfig, report: &mut ValidationReport) {
    if service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    }

    if !["pretty", "json", "compact"].contains(&service.log_format.as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(service.log_format.clone()));
    }

    if service.metrics_port.is_none() {
        report.add_default("service.metrics_port", "disabled");
    }
}

fn validate_market(market: &MarketConfig, report: &mut ValidationReport) {
    if market.varieties.is_empty() {
        report.add_error(ValidationError::NoTrackedVarieties);
    }

    check_positive_int("market.retention_window", market.retention_window as u64, report);
    check_positive_int("market.volatility_window", market.volatility_window as u64, report);
    check_positive_int(
        "market.fetch_interval_seconds",
        market.fetch_interval_seconds,
        report,
    );
    check_positive_int(
        "market.source_timeout_seconds",
        market.source_timeout_seconds,
        report,
    );

    if market.volatility_window > market.retention_window && market.retention_window > 0 {
        report.add_warning(
            "market.volatility_window",
            "Larger than retention_window; volatility uses the whole history",
        );
    }

    if market.source_timeout_seconds >= market.fetch_interval_seconds
        && market.fetch_interval_seconds > 0
    {
        report.add_warning(
            "market.source_timeout_seconds",
            "Source timeout is not shorter than the fetch interval; cycles may overlap",
        );
    }
}

fn validate_sources(sources: &[SourceConfig], report: &mut ValidationReport) {
    if !sources.iter().any(|s| s.enabled) {
        report.add_error(ValidationError::NoEnabledSources);
    }

    let mut seen = HashSet::new();
    for source in sources {
        if !seen.insert(source.name.as_str()) {
            report.add_error(ValidationError::DuplicateSourceName(source.name.clone()));
        }
        validate_source(source, report);
    }
}

fn validate_source(source: &SourceConfig, report: &mut ValidationReport) {
    let invalid = |message: &str| ValidationError::InvalidSource {
        name: source.name.clone(),
        message: message.to_string(),
    };

    if source.name.trim().is_empty() {
        report.add_error(invalid("name is required"));
    }

    if source.grade == 0 {
        report.add_error(invalid("grade must be at least 1"));
    }

    if source.timeout_seconds == Some(0) {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: format!("sources.{}.timeout_seconds", source.name),
        });
    }

    match source.kind {
        SourceKind::Exchange | SourceKind::Scraped => match source.endpoint.as_deref() {
            None => report.add_error(invalid("endpoint is required")),
            Some(endpoint) => validate_endpoint(source, endpoint, report),
        },
        SourceKind::Static => {
            if source.prices.is_empty() {
                report.add_error(invalid("static source requires at least one price"));
            }
            for (variety, price) in &source.prices {
                if !price.is_finite() || *price <= 0.0 {
                    report.add_error(invalid(&format!(
                        "price for {} must be positive, got {}",
                        variety, price
                    )));
                }
            }
        }
    }

    if source.kind == SourceKind::Scraped {
        match source.pattern.as_deref() {
            None => report.add_error(invalid("scraped source requires a pattern")),
            Some(pattern) => match Regex::new(pattern) {
                // Group 0 is the whole match
                Ok(re) if re.captures_len() < 2 => {
                    report.add_error(invalid("pattern must contain a capture group"))
                }
                Ok(_) => {}
                Err(e) => report.add_error(invalid(&format!("invalid pattern: {}", e))),
            },
        }
    }

    if source.kind == SourceKind::Exchange && source.price_field.is_none() {
        report.add_warning(
            &format!("sources.{}.price_field", source.name),
            "Not set; the response body must be a bare number",
        );
    }

    if let Some(key) = source.api_key.as_deref() {
        if has_unresolved_env_vars(key) {
            report.add_error(ValidationError::InvalidEnvVar {
                var: key.to_string(),
                message: format!("api_key for source '{}' was not substituted", source.name),
            });
        }
    }
}

fn validate_endpoint(source: &SourceConfig, endpoint: &str, report: &mut ValidationReport) {
    if has_unresolved_env_vars(endpoint) {
        report.add_error(ValidationError::InvalidEnvVar {
            var: endpoint.to_string(),
            message: format!("endpoint for source '{}' was not substituted", source.name),
        });
        return;
    }

    match url::Url::parse(endpoint) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            if url.scheme() == "http" {
                report.add_warning(
                    &format!("sources.{}.endpoint", source.name),
                    "Plain HTTP endpoint",
                );
            }
        }
        Ok(url) => report.add_error(ValidationError::InvalidSource {
            name: source.name.clone(),
            message: format!("unsupported endpoint scheme '{}'", url.scheme()),
        }),
        Err(e) => report.add_error(ValidationError::InvalidSource {
            name: source.name.clone(),
            message: format!("invalid endpoint URL: {}", e),
        }),
    }
}

fn validate_fallback(fallback: &FallbackConfig, tracked: &[Variety], report: &mut ValidationReport) {
    if fallback.source_tag.trim().is_empty() {
        report.add_error(ValidationError::MissingFallbackTag);
    }

    for (variety, price) in &fallback.prices {
        if !price.is_finite() || *price <= 0.0 {
            report.add_error(ValidationError::InvalidFallbackPrice {
                variety: *variety,
                price: *price,
            });
        }
    }

    for variety in tracked {
        if !fallback.prices.contains_key(variety) {
            report.add_error(ValidationError::MissingFallbackPrice(*variety));
        }
    }
}

fn validate_alerts(alerts: &AlertConfig, report: &mut ValidationReport) {
    check_percentage("alerts.spike_threshold_percent", alerts.spike_threshold_percent, report);
    check_percentage("alerts.drop_threshold_percent", alerts.drop_threshold_percent, report);
    check_percentage(
        "alerts.volatility_threshold_percent",
        alerts.volatility_threshold_percent,
        report,
    );
}

fn validate_analysis(analysis: &AnalysisConfig, report: &mut ValidationReport) {
    check_percentage(
        "analysis.acceptable_deviation_percent",
        analysis.acceptable_deviation_percent,
        report,
    );
    check_percentage(
        "analysis.trend_threshold_percent",
        analysis.trend_threshold_percent,
        report,
    );
    check_positive_int("analysis.stale_after_hours", analysis.stale_after_hours, report);
}

fn validate_ledger(ledger: &LedgerConfig, report: &mut ValidationReport) {
    check_positive_int("ledger.timeout_seconds", ledger.timeout_seconds, report);

    match ledger.endpoint.as_deref() {
        None => report.add_default("ledger.endpoint", "log-only"),
        Some(endpoint) if has_unresolved_env_vars(endpoint) => {
            report.add_error(ValidationError::InvalidEnvVar {
                var: endpoint.to_string(),
                message: "ledger endpoint was not substituted".to_string(),
            });
        }
        Some(endpoint) => {
            if let Err(e) = url::Url::parse(endpoint) {
                report.add_error(ValidationError::InvalidLedger {
                    message: format!("invalid endpoint URL: {}", e),
                });
            }
        }
    }
}

fn check_positive_int(field: &str, value: u64, report: &mut ValidationReport) {
    if value == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: field.to_string(),
        });
    }
}

fn check_percentage(field: &str, value: f64, report: &mut ValidationReport) {
    if !(value > 0.0 && value <= 100.0) {
        report.add_error(ValidationError::InvalidPercentageRange {
            field: field.to_string(),
        });
    }
}
