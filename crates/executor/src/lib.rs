//! # Executor
//!
//! Trade execution and portfolio state for a single instrument. It defines the
//! `Executor` trait with a `SimulatedExecutor` that prices fills against a bar's
//! open, plus a `Portfolio` that tracks cash and a settlement-aware lot table.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** the `Executor` only computes what a trade would
//!   cost (price, commission, stamp duty) and never mutates state. The `Portfolio`
//!   applies an `Execution` and owns every invariant about cash and lots.
//! - **Settlement:** shares bought on bar `i` sit in a lot tagged `i` and can only be
//!   sold from bar `i + 1`. Sells consume settled lots oldest-first.
//!
//! ## Public API
//!
//! - `Executor`, `SimulatedExecutor`: fill pricing and transaction costs.
//! - `OrderRequest`, `Execution`: the order going in and the receipt coming out.
//! - `Portfolio`, `Position`: cash and lot-level position state.
//! - `ExecutorError`: invariant violations.

// Declare the modules that constitute this crate.
pub mod error;
pub mod exchange;
pub mod portfolio;

// Re-export the key components to provide a clean, public-facing API.
pub use error::ExecutorError;
pub use exchange::{Execution, Executor, OrderRequest, SimulatedExecutor};
pub use portfolio::{Portfolio, Position};
