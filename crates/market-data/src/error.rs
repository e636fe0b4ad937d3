//! Market data error types

use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors raised while assembling the market data engine
///
/// Adapter failures never leave a fetch cycle and ledger pushes report
/// through `update_ledger_prices`; what remains are construction errors.
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Ledger client: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),
}
