//! # Strategy Library
//!
//! This crate defines the universal `Strategy` trait consumed by the backtesting
//! engine and provides several concrete implementations.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** strategies see one bar at a time and return a `Signal`. They
//!   never see cash, positions or fill prices, so they cannot influence execution
//!   except through the signal they return.
//! - **Strategy agnostic engine:** the backtester drives any `Box<dyn Strategy>`.
//! - **Extensibility:** adding a strategy means a new module implementing the
//!   trait, a `StrategyId` variant and a factory arm.
//!
//! ## Public API
//!
//! - `Strategy`: The core trait all strategies implement.
//! - `create_strategy`: The factory function to construct a strategy instance.
//! - The concrete strategy structs themselves (e.g., `MaCrossover`).

// Declare all the modules that constitute this crate.
pub mod error;
pub mod factory;
pub mod ma_crossover;
pub mod rsi;
pub mod weekly_dca;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use factory::create_strategy;
pub use ma_crossover::MaCrossover;
pub use rsi::RsiStrategy;
pub use weekly_dca::WeeklyDca;

// Re-export StrategyId from core_types
pub use core_types::StrategyId;

use core_types::{Bar, Signal};
use rust_decimal::prelude::ToPrimitive;

/// The contract every trading strategy fulfils.
///
/// The engine calls `on_init` once before the first bar, `on_bar` once per bar
/// in chronological order, and `on_stop` once after the last bar.
///
/// `on_bar` takes `&mut self` because most strategies keep indicator state
/// between bars. The `Send + Sync` bounds let the batch runner move strategies
/// onto worker threads.
pub trait Strategy: Send + Sync {
    /// Resets internal state before a run.
    fn on_init(&mut self) {}

    /// Evaluates one bar.
    ///
    /// # Returns
    ///
    /// * `Ok(Signal)` - the decision for this bar; `Signal::Hold` when no action should be taken.
    /// * `Err(StrategyError)` - the strategy could not evaluate the bar. The engine treats
    ///   this as a hold and keeps running.
    fn on_bar(&mut self, bar: &Bar) -> Result<Signal, StrategyError>;

    /// Called once after the last bar.
    fn on_stop(&mut self) {}
}

/// The `ta` crate works in `f64`; this is the single place prices cross over.
pub(crate) fn close_as_f64(bar: &Bar) -> Result<f64, StrategyError> {
    bar.close.to_f64().ok_or_else(|| {
        StrategyError::IndicatorError(format!("close {} is not representable as f64", bar.close))
    })
}
