//! # Core Types
//!
//! The shared vocabulary of the backtesting workspace: bars, signals, lots,
//! trades and equity points. Every other crate depends on this one and it
//! depends on nothing in the workspace.
//!
//! All monetary values are `rust_decimal::Decimal`; share quantities are
//! whole `u64` counts.

pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{OrderSide, Signal, StrategyId};
pub use error::CoreError;
pub use structs::{Bar, EquityPoint, Lot, Trade, signed_cash_delta};
