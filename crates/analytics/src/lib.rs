//! # Analytics
//!
//! Quantitative analysis of a finished backtest. It acts as the "unbiased judge"
//! of a run: given the equity curve and the trade ledger, it derives returns,
//! risk metrics and round-trip statistics.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** depends only on `core-types` and knows nothing about the engine
//!   that produced its inputs.
//! - **Stateless Calculation:** the `AnalyticsEngine` takes raw trading data and
//!   produces a `PerformanceReport`. The same inputs always give the same report.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: The main struct that contains the calculation logic.
//! - `PerformanceReport`: The standardized struct holding every metric.
//! - `RoundTrip`, `round_trips`: FIFO pairing of sells with the buy lots they closed.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod report;
pub mod round_trip;

// Re-export the key components to create a clean, public-facing API.
pub use engine::{AnalyticsEngine, TRADING_DAYS_PER_YEAR};
pub use error::AnalyticsError;
pub use report::PerformanceReport;
pub use round_trip::{RoundTrip, round_trips};
