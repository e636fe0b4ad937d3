use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MasterConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());
    parse_config(&content)
}

/// Parse configuration text, substituting environment variables first
pub fn parse_config(content: &str) -> Result<MasterConfig> {
    let substituted = substitution::substitute_env_vars(content)?;

    let config: MasterConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!(
        sources = config.sources.len(),
        varieties = config.market.varieties.len(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Starter configuration written by `coffeex init`
///
/// Quotes ICE arabica from a JSON feed, scrapes robusta, and keeps a
/// static desk source for the specialty and organic lots no exchange lists.
#[instrument]
pub fn generate_default_config() -> MasterConfig {
    MasterConfig {
        service: ServiceConfig::default(),
        market: MarketConfig::default(),
        sources: vec![
            SourceConfig {
                name: "ICE_ARABICA".to_string(),
                kind: SourceKind::Exchange,
                endpoint: Some("https://query1.finance.yahoo.com/v8/finance/chart/KC=F".to_string()),
                varieties: vec![Variety::Arabica],
                unit: PriceUnit::CentsPerLb,
                pattern: None,
                price_field: Some("chart.result.0.meta.regularMarketPrice".to_string()),
                api_key: None,
                api_key_header: default_api_key_header(),
                prices: BTreeMap::new(),
                enabled: true,
                grade: default_grade(),
                timeout_seconds: None,
            },
            SourceConfig {
                name: "INVESTING_ROBUSTA".to_string(),
                kind: SourceKind::Scraped,
                endpoint: Some(
                    "https://www.investing.com/commodities/london-coffee".to_string(),
                ),
                varieties: vec![Variety::Robusta],
                unit: PriceUnit::UsdPerTonne,
                pattern: Some(r#"data-test="instrument-price-last">([\d,.]+)<"#.to_string()),
                price_field: None,
                api_key: None,
                api_key_header: default_api_key_header(),
                prices: BTreeMap::new(),
                enabled: true,
                grade: default_grade(),
                timeout_seconds: None,
            },
            SourceConfig::static_prices(
                "DESK",
                BTreeMap::from([(Variety::Specialty, 6.50), (Variety::Organic, 5.20)]),
            ),
        ],
        fallback: FallbackConfig::default(),
        alerts: AlertConfig::default(),
        analysis: AnalysisConfig::default(),
        ledger: LedgerConfig::default(),
    }
}

#[instrument(skip(config))]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &MasterConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = generate_default_config();
        let report = validate_config(&cfg);
        assert!(report.is_valid(), "errors: {:?}", report.errors);
    }

    #[test]
    fn test_default_config_survives_yaml() {
        let cfg = generate_default_config();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed = parse_config(&yaml).unwrap();

        assert_eq!(parsed.sources.len(), cfg.sources.len());
        assert_eq!(parsed.sources[1].pattern, cfg.sources[1].pattern);
        assert_eq!(parsed.fallback.prices, cfg.fallback.prices);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("coffeex-config-{}", std::process::id()));
        let path = dir.join("market.yaml");

        save_config(&generate_default_config(), &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.service.name, "coffeex");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = load_config("/nonexistent/coffeex.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
