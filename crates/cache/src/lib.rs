//! Resource cache for the coffee market engine
//!
//! A single [`CacheStore`] is shared by every component that talks to a slow
//! upstream: the price aggregator, balance lookups, pool statistics,
//! distribution history and token metadata. Each owner writes only its own
//! [`ResourceKind`]; the store arbitrates per-key freshness and nothing else.
//!
//! # Core Components
//!
//! - [`kind`] - Resource kinds and the fixed TTL table
//! - [`store`] - Single-flight `get_or_refresh` store
//!
//! # Key Invariants
//!
//! - At most one refresh is in flight per (kind, key); concurrent callers
//!   await the same result
//! - Entries are replaced whole, never patched
//! - TTL governs re-fetching; the 24h stale threshold governs whether a
//!   price may still be trusted for decisions

pub mod error;
pub mod kind;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use kind::{
    is_stale, ResourceKind, TtlPolicy, BALANCE_TTL, DISTRIBUTION_HISTORY_TTL, POOL_STATISTICS_TTL,
    PRICE_STALE_THRESHOLD, PRICE_TTL, TOKEN_METADATA_TTL,
};
pub use store::{CacheStore, Freshness};
