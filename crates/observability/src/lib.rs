//! Observability for the coffee market engine
//!
//! This crate provides:
//! - Structured logging via tracing
//! - A Prometheus exporter
//! - [`MarketMetrics`], the counters and histograms recorded by fetch cycles
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("coffeex", LogFormat::Pretty)?;
//! observability::metrics::init_metrics(9100)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, CycleTimer, MarketMetrics};
