use crate::error::AnalyticsError;
use crate::report::PerformanceReport;
use crate::round_trip::round_trips;
use core_types::{EquityPoint, Trade};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Bars per year used to annualize daily figures.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

/// A stateless calculator for deriving performance metrics from a finished run.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `equity_curve` - One point per processed bar; the first point is the base for returns.
    /// * `trades` - The run's trade ledger, in execution order.
    /// * `risk_free_rate` - Annual rate, converted to a daily rate for the Sharpe ratio.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PerformanceReport` or an `AnalyticsError`.
    pub fn calculate(
        &self,
        equity_curve: &[EquityPoint],
        trades: &[Trade],
        risk_free_rate: Decimal,
    ) -> Result<PerformanceReport, AnalyticsError> {
        let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
            return Err(AnalyticsError::NotEnoughData("equity curve is empty".to_string()));
        };
        if first.total_equity <= Decimal::ZERO {
            return Err(AnalyticsError::Calculation(format!(
                "initial equity must be positive, got {}",
                first.total_equity
            )));
        }

        let mut report = PerformanceReport::new(first.total_equity);
        report.final_equity = last.total_equity;
        report.trading_days = equity_curve.len();
        report.total_trades = trades.len();

        self.calculate_returns(&mut report)?;
        self.calculate_drawdown(equity_curve, &mut report);
        self.calculate_risk(equity_curve, risk_free_rate, &mut report)?;
        self.calculate_trade_stats(trades, &mut report)?;

        if let Some(annualized) = report.annualized_return {
            if report.max_drawdown > Decimal::ZERO {
                report.calmar_ratio = annualized.checked_div(report.max_drawdown);
            }
        }

        tracing::debug!(
            total_return = %report.total_return,
            max_drawdown = %report.max_drawdown,
            round_trips = report.round_trip_count,
            "performance calculated"
        );
        Ok(report)
    }

    /// Total and annualized return: (1 + total)^(252 / days) - 1.
    fn calculate_returns(&self, report: &mut PerformanceReport) -> Result<(), AnalyticsError> {
        report.total_net_profit = report
            .final_equity
            .checked_sub(report.initial_equity)
            .ok_or_else(|| AnalyticsError::Calculation("net profit overflows".to_string()))?;
        report.total_return = report
            .total_net_profit
            .checked_div(report.initial_equity)
            .ok_or_else(|| AnalyticsError::Calculation("total return overflows".to_string()))?;

        let growth = Decimal::ONE + report.total_return;
        report.annualized_return = if growth <= Decimal::ZERO {
            Some(-Decimal::ONE)
        } else {
            let exponent = Decimal::from(TRADING_DAYS_PER_YEAR) / Decimal::from(report.trading_days);
            growth.checked_powd(exponent).map(|g| g - Decimal::ONE)
        };
        Ok(())
    }

    /// Largest peak-to-trough decline, as a positive fraction of the peak.
    fn calculate_drawdown(&self, equity_curve: &[EquityPoint], report: &mut PerformanceReport) {
        let mut peak = report.initial_equity;
        let mut max_drawdown = Decimal::ZERO;

        for point in equity_curve {
            peak = peak.max(point.total_equity);
            if peak > Decimal::ZERO {
                max_drawdown = max_drawdown.max((peak - point.total_equity) / peak);
            }
        }

        report.max_drawdown = max_drawdown;
    }

    /// Annualized volatility and Sharpe from bar-to-bar returns (sample stdev).
    fn calculate_risk(
        &self,
        equity_curve: &[EquityPoint],
        risk_free_rate: Decimal,
        report: &mut PerformanceReport,
    ) -> Result<(), AnalyticsError> {
        // A zero-equity bar makes every later return undefined.
        let Some(returns) = equity_curve
            .windows(2)
            .map(|w| w[1].total_equity.checked_div(w[0].total_equity).map(|r| r - Decimal::ONE))
            .collect::<Option<Vec<Decimal>>>()
        else {
            return Ok(());
        };

        if returns.len() < 2 {
            return Ok(());
        }

        let overflow = || AnalyticsError::Calculation("return series overflows".to_string());
        let n = Decimal::from(returns.len());
        let total = returns
            .iter()
            .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(*r))
            .ok_or_else(overflow)?;
        let mean = total / n;
        let squared = returns
            .iter()
            .try_fold(Decimal::ZERO, |acc, r| {
                let deviation = r.checked_sub(mean)?;
                acc.checked_add(deviation.checked_mul(deviation)?)
            })
            .ok_or_else(overflow)?;
        let variance = squared / (n - Decimal::ONE);

        let sqrt = |value: Decimal| {
            value
                .sqrt()
                .ok_or_else(|| AnalyticsError::Calculation(format!("square root of {value} is undefined")))
        };
        let std_dev = sqrt(variance)?;
        let days = Decimal::from(TRADING_DAYS_PER_YEAR);
        let annualizer = sqrt(days)?;

        report.annualized_volatility = std_dev.checked_mul(annualizer);
        let daily_risk_free = risk_free_rate / days;
        report.sharpe_ratio = mean
            .checked_sub(daily_risk_free)
            .and_then(|excess| excess.checked_div(std_dev))
            .and_then(|ratio| ratio.checked_mul(annualizer));

        Ok(())
    }

    /// Win/loss statistics over FIFO round-trips.
    fn calculate_trade_stats(&self, trades: &[Trade], report: &mut PerformanceReport) -> Result<(), AnalyticsError> {
        let trips = round_trips(trades)?;
        report.round_trip_count = trips.len();
        if trips.is_empty() {
            return Ok(());
        }

        let mut holding_bars = 0usize;
        for trip in &trips {
            let overflow = || AnalyticsError::Calculation("round-trip totals overflow".to_string());
            if trip.is_win() {
                report.winning_trades += 1;
                report.gross_profit = report.gross_profit.checked_add(trip.pnl).ok_or_else(overflow)?;
            } else {
                report.losing_trades += 1;
                report.gross_loss = report.gross_loss.checked_add(trip.pnl.abs()).ok_or_else(overflow)?;
            }
            holding_bars += trip.holding_bars();
        }

        let count = Decimal::from(trips.len());
        report.win_rate = Some(Decimal::from(report.winning_trades) / count);
        report.average_holding_bars = Some(Decimal::from(holding_bars) / count);

        if report.winning_trades > 0 {
            report.average_win = Some(report.gross_profit / Decimal::from(report.winning_trades));
        }
        if report.losing_trades > 0 {
            report.average_loss = Some(report.gross_loss / Decimal::from(report.losing_trades));
        }
        if let (Some(win), Some(loss)) = (report.average_win, report.average_loss) {
            if loss > Decimal::ZERO {
                report.payoff_ratio = win.checked_div(loss);
            }
        }

        report.profit_factor = if report.gross_loss > Decimal::ZERO {
            report.gross_profit.checked_div(report.gross_loss)
        } else if report.gross_profit > Decimal::ZERO {
            None
        } else {
            // Only break-even round-trips.
            Some(Decimal::ZERO)
        };

        report.round_trips = trips;
        Ok(())
    }
}
