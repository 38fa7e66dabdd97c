use crate::round_trip::RoundTrip;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A comprehensive, standardized report of a strategy's performance.
///
/// Returns, drawdown and win rate are fractions (0.05 = 5%). Metrics that are
/// undefined for the given inputs are `None` rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // I. Core Profitability Metrics
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub total_net_profit: Decimal,
    pub total_return: Decimal,
    pub annualized_return: Option<Decimal>, // None when the power overflows
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: Option<Decimal>, // None with no round-trips, or wins but no losses

    // II. Risk and Drawdown
    pub max_drawdown: Decimal,
    pub annualized_volatility: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>, // None for fewer than two returns or zero stdev
    pub calmar_ratio: Option<Decimal>,

    // III. Trade-Level Statistics
    pub total_trades: usize,
    pub round_trip_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: Option<Decimal>,
    pub average_win: Option<Decimal>,
    pub average_loss: Option<Decimal>,
    pub payoff_ratio: Option<Decimal>,

    // IV. Time-Based Metrics
    pub trading_days: usize,
    pub average_holding_bars: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub round_trips: Vec<RoundTrip>,
}

impl PerformanceReport {
    /// Creates a report for a flat run: equity never moved from `initial_equity`.
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            initial_equity,
            final_equity: initial_equity,
            total_net_profit: Decimal::ZERO,
            total_return: Decimal::ZERO,
            annualized_return: None,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            profit_factor: None,
            max_drawdown: Decimal::ZERO,
            annualized_volatility: None,
            sharpe_ratio: None,
            calmar_ratio: None,
            total_trades: 0,
            round_trip_count: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: None,
            average_win: None,
            average_loss: None,
            payoff_ratio: None,
            trading_days: 0,
            average_holding_bars: None,
            round_trips: Vec::new(),
        }
    }
}
