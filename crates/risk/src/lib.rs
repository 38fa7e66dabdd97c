//! # Risk
//!
//! Buy-order sizing. Given a fill price and the cash on hand, a `RiskManager`
//! decides how many shares a buy should take. Quantities are always whole board
//! lots; zero means "skip this buy".
//!
//! The sizer is a pure calculator. It never checks settlement or touches the
//! portfolio; the engine applies the result.

pub mod error;
pub mod simple_manager;

pub use error::RiskError;
pub use simple_manager::PositionSizer;

use rust_decimal::Decimal;

/// Decides the share quantity of a buy order.
pub trait RiskManager: Send + Sync {
    /// Shares to buy at `price` with `cash_available`, rounded down to the lot size.
    fn size_buy(&self, price: Decimal, cash_available: Decimal) -> Result<u64, RiskError>;

    /// The board lot every quantity is a multiple of.
    fn lot_size(&self) -> u64;
}
