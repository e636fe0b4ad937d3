//! Coffee market data engine
//!
//! Fetches per-variety coffee prices from independent upstream sources,
//! keeps a bounded history per variety, derives market conditions from it
//! and notifies subscribers about significant moves.
//!
//! # Core Components
//!
//! - [`source`] - Price source adapters (exchange API, scraped page, static table)
//! - [`aggregator`] - Concurrent fetch cycles with per-source timeouts and fallback prices
//! - [`analyzer`] - Volatility, trend and price validation
//! - [`alerts`] - Alert detection and the subscriber bus
//! - [`ledger`] - Best-effort price sync to the external ledger
//! - [`coordinator`] - Facade over all of the above
//! - [`worker`] - Periodic fetch and sync loop
//!
//! # Key Invariants
//!
//! - A fetch cycle yields at least one price per tracked variety
//! - A cycle takes at most one source timeout, however many sources exist
//! - History is append-only per variety and bounded by the retention window
//! - Only the aggregator writes price history and `price` cache entries
//! - A ledger failure never changes history or cache

pub mod aggregator;
pub mod alerts;
pub mod analyzer;
pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod history;
pub mod ledger;
pub mod source;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{AggregatorSettings, PriceAggregator};
pub use alerts::{AlertBus, AlertCallback, AlertDetector};
pub use analyzer::MarketAnalyzer;
pub use coordinator::MarketDataCoordinator;
pub use error::MarketDataError;
pub use fallback::FallbackTable;
pub use ledger::{HttpLedgerClient, LedgerClient, LedgerError, LoggingLedgerClient};
pub use source::{PriceSource, SourceError, SourceRegistry};
pub use types::{
    AlertType, MarketAlert, MarketConditions, PricePoint, Trend, ValidationResult,
    FALLBACK_SUFFIX,
};
pub use worker::{CycleSummary, MarketDataWorker};

pub type Result<T> = std::result::Result<T, MarketDataError>;
