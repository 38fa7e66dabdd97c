//! # Batch Runner
//!
//! Drives the backtesting engine once per instrument and aggregates the results
//! into a sorted summary.
//!
//! ## Architectural Principles
//!
//! - **Isolation:** every instrument gets its own strategy instance, engine and
//!   starting capital. Runs share nothing, so they execute in parallel on a
//!   `rayon` pool.
//! - **Fault containment:** a failure for one instrument becomes a failed row;
//!   the rest of the batch still completes.
//! - **Deterministic output:** rows are sorted after collection, so the summary
//!   does not depend on completion order.
//!
//! ## Public API
//!
//! - `BarSource`, `CsvBarSource`, `MemoryBarSource`: where bars come from.
//! - `BatchRunner`, `CancellationToken`: running and stopping a batch.
//! - `BatchReport`, `SummaryRow`, `InstrumentStatus`: the results.
//! - `write_summary_csv`, `write_report_json`: persisting them.

// Declare the modules that constitute this crate.
pub mod error;
pub mod runner;
pub mod source;
pub mod summary;

// Re-export the key components to create a clean, public-facing API.
pub use error::BatchError;
pub use runner::{BatchReport, BatchRunner, CancellationToken, InstrumentOutcome};
pub use source::{BarSource, CsvBarSource, MemoryBarSource, parse_timestamp};
pub use summary::{InstrumentStatus, SummaryRow, sort_rows, write_report_json, write_summary_csv};
