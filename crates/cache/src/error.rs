//! Cache error types

use thiserror::Error;

use crate::kind::ResourceKind;

/// Errors that can occur during cache operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// The refresh function failed and no earlier value exists to fall back on
    #[error("Refresh failed for {kind}/{key}: {reason}")]
    RefreshFailed {
        kind: ResourceKind,
        key: String,
        reason: String,
    },

    /// An entry exists under the key but holds a different value type
    #[error("Type mismatch for {kind}/{key}: expected {expected}")]
    TypeMismatch {
        kind: ResourceKind,
        key: String,
        expected: &'static str,
    },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
