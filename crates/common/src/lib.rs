//! Common types and utilities for the coffee market engine
//!
//! This crate provides shared types, traits, and utilities used across
//! all workspace crates.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Shared domain types (Variety, Grade, Currency)
//! - [`clock`] - Injectable time source
//! - [`units`] - Upstream quote units and conversion to USD/kg

pub mod clock;
pub mod error;
pub mod types;
pub mod units;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Error, Result};
pub use types::*;
pub use units::PriceUnit;
