use crate::ledger::TradeLedger;
use chrono::{DateTime, Utc};
use core_types::{EquityPoint, Lot, OrderSide};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// A bar on which the strategy returned an error. The engine treated it as a hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFault {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarSkipReason {
    /// OHLC values failed validation.
    Invalid(String),
    /// The timestamp did not advance past the previous processed bar.
    NonIncreasingTimestamp,
}

impl fmt::Display for BarSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarSkipReason::Invalid(reason) => write!(f, "invalid bar: {reason}"),
            BarSkipReason::NonIncreasingTimestamp => write!(f, "timestamp does not advance"),
        }
    }
}

/// A bar the engine refused to process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedBar {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub reason: BarSkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSkipReason {
    /// The sized buy rounded down to zero lots.
    ZeroQuantity,
    /// No shares held.
    NoPosition,
    /// Shares are held but none have settled yet.
    Unsettled,
}

impl fmt::Display for OrderSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OrderSkipReason::ZeroQuantity => "affordable quantity is zero lots",
            OrderSkipReason::NoPosition => "no position to sell",
            OrderSkipReason::Unsettled => "no settled shares to sell",
        };
        f.write_str(text)
    }
}

/// A pending order that reached its execution bar but produced no trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedOrder {
    pub bar_index: usize,
    pub side: OrderSide,
    pub reason: OrderSkipReason,
}

/// Everything a single engine run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub instrument: String,
    pub initial_capital: Decimal,
    pub final_cash: Decimal,
    pub final_position: u64,
    /// Lots still held at the end, oldest first.
    pub final_lots: Vec<Lot>,
    pub equity_curve: Vec<EquityPoint>,
    pub ledger: TradeLedger,
    /// 1 when the last processed bar produced a signal that had no next bar to fill on.
    pub unexecuted_signals: u32,
    pub strategy_faults: Vec<StrategyFault>,
    pub skipped_bars: Vec<SkippedBar>,
    pub skipped_orders: Vec<SkippedOrder>,
}

impl RunResult {
    /// Equity at the last processed bar's close, or the starting capital when
    /// no bar was processed.
    pub fn final_equity(&self) -> Decimal {
        self.equity_curve
            .last()
            .map(|point| point.total_equity)
            .unwrap_or(self.initial_capital)
    }

    pub fn bars_processed(&self) -> usize {
        self.equity_curve.len()
    }
}
