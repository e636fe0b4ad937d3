//! CoffeeX binary
//!
//! Initializes configuration, runs one-off fetch and price checks, and
//! hosts the periodic fetch worker.

use anyhow::{Context, Result};
use cli::{Cli, Commands};
use common::{Grade, Variety};
use config::{generate_default_config, load_config, save_config, validate_config, MasterConfig};
use market_data::{MarketDataCoordinator, MarketDataWorker, PricePoint};
use observability::{init_logging, init_metrics, LogFormat};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Run { config } => run_command(config).await,
        Commands::Fetch { config, sync } => fetch_command(config, sync).await,
        Commands::CheckPrice {
            variety,
            grade,
            price,
            config,
        } => check_price_command(config, variety.into(), Grade::new(grade), price).await,
        Commands::Validate { config } => {
            init_logging("coffeex", LogFormat::Pretty)?;
            validate_command(config).await
        }
        Commands::Init { output } => {
            init_logging("coffeex", LogFormat::Pretty)?;
            init_command(output).await
        }
    }
}

/// Load, validate and install logging as the config asks
fn load_checked<P: AsRef<Path>>(config_path: P) -> Result<MasterConfig> {
    let config_path = config_path.as_ref();
    let config = load_config(config_path)?;

    let format = LogFormat::parse(&config.service.log_format).unwrap_or_default();
    init_logging(&config.service.name, format)?;
    debug!(path = ?config_path, "Configuration loaded");

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    if !report.is_valid() {
        error!(
            error_count = report.errors.len(),
            "Configuration validation failed"
        );
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot start due to configuration errors");
    }

    Ok(config)
}

async fn run_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config = load_checked(config_path)?;

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    let coordinator = Arc::new(
        MarketDataCoordinator::from_config(&config).context("Failed to build market data")?,
    );
    info!(
        sources = ?coordinator.source_names(),
        varieties = coordinator.varieties().len(),
        "Market data ready"
    );

    let alerts = coordinator.subscribe_alert_channel();
    tokio::spawn(log_alerts(alerts));

    let worker = MarketDataWorker::from_config(coordinator, &config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    shutdown_tx.send(true).ok();
    handle.await.context("Worker task failed")?;

    println!("[ok] CoffeeX stopped");
    Ok(())
}

async fn log_alerts(mut alerts: tokio::sync::broadcast::Receiver<market_data::MarketAlert>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match alerts.recv().await {
            Ok(alert) => info!(
                alert_type = %alert.alert_type,
                variety = %alert.variety,
                change_percent = alert.change_percent,
                "{}",
                alert.message
            ),
            Err(RecvError::Lagged(missed)) => warn!(missed, "Alert log fell behind"),
            Err(RecvError::Closed) => return,
        }
    }
}

async fn fetch_command<P: AsRef<Path>>(config_path: P, sync: bool) -> Result<()> {
    let config = load_checked(config_path)?;
    let coordinator =
        MarketDataCoordinator::from_config(&config).context("Failed to build market data")?;

    let prices = coordinator.fetch_all_prices().await;

    println!("\n=== Prices ({} points) ===\n", prices.len());
    print_prices(&prices);

    println!("\n=== Market Conditions ===\n");
    for variety in coordinator.varieties() {
        let conditions = coordinator.get_market_conditions(*variety);
        println!(
            "  {:<10} {:<8} volatility {:>6.2}%  confidence {:>5.1}  {}",
            variety.as_str(),
            conditions.trend.as_str(),
            conditions.volatility,
            conditions.confidence,
            conditions.recommendation
        );
    }
    println!();

    if sync {
        if coordinator.update_ledger_prices(&prices).await {
            println!("[ok] Ledger updated");
        } else {
            println!("[warn] Ledger update failed; prices above were not recorded");
        }
    }

    Ok(())
}

fn print_prices(prices: &[PricePoint]) {
    println!(
        "  {:<10} {:>5} {:>10}  {:<22} {}",
        "VARIETY", "GRADE", "USD/KG", "SOURCE", "TIMESTAMP"
    );
    for point in prices {
        println!(
            "  {:<10} {:>5} {:>10.4}  {:<22} {}",
            point.variety.as_str(),
            point.grade,
            point.price_per_kg,
            point.source,
            point.timestamp.to_rfc3339()
        );
    }
}

async fn check_price_command<P: AsRef<Path>>(
    config_path: P,
    variety: Variety,
    grade: Grade,
    price: f64,
) -> Result<()> {
    let config = load_checked(config_path)?;
    let coordinator =
        MarketDataCoordinator::from_config(&config).context("Failed to build market data")?;

    coordinator.fetch_all_prices().await;
    let result = coordinator.validate_price(variety, grade, price);

    println!();
    println!("Variety:       {} (grade {})", variety, grade);
    println!("Proposed:      {:.4} USD/kg", price);
    println!(
        "Market:        {:.4} USD/kg from {}{}",
        result.market_price,
        result.market_source,
        if result.market_price_stale { " (stale)" } else { "" }
    );
    println!("Deviation:     {:.2}%", result.deviation);
    println!();

    if result.is_valid {
        println!("[ok] {}", result.message);
        Ok(())
    } else {
        anyhow::bail!("{}", result.message)
    }
}

async fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!(
        "Varieties: {}",
        config
            .market
            .varieties
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Enabled Sources: {}", config.enabled_sources().count());
    println!(
        "Ledger: {}",
        config.ledger.endpoint.as_deref().unwrap_or("log only")
    );

    Ok(())
}

async fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();
    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("This configuration includes:");
    println!("  - {} tracked varieties", config.market.varieties.len());
    println!("  - {} price sources", config.sources.len());
    println!("  - Fallback prices for every variety");
    println!();
    println!("Next steps:");
    println!("  1. Edit the configuration file to customize sources and thresholds");
    println!("  2. Set a ledger endpoint, or leave it empty for log-only sync");
    println!(
        "  3. Run 'coffeex validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  4. Run 'coffeex run --config {:?}' to start fetching",
        output_path
    );

    Ok(())
}
