//! Errors raised while interpreting domain values

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Name that is not one of the tracked coffee varieties
    #[error("unknown variety: {0}")]
    UnknownVariety(String),
}

pub type Result<T> = std::result::Result<T, Error>;
