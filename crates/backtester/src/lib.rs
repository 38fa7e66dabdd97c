//! # Backtester
//!
//! The single-instrument execution engine. A `Backtester` replays an ordered bar
//! sequence through a strategy, fills each signal at the open of the following
//! bar, enforces T+1 settlement on sells and records every fill in a
//! `TradeLedger`.
//!
//! Each run owns its own `Portfolio`, strategy instance and ledger; nothing is
//! shared between runs, so the batch runner can drive many engines in parallel.

use configuration::{EngineConfig, SizingConfig};
use core_types::{Bar, EquityPoint, OrderSide, Trade};
use executor::{Execution, Executor, OrderRequest, Portfolio, SimulatedExecutor};
use risk::{PositionSizer, RiskManager};
use rust_decimal::Decimal;
use strategies::Strategy;

pub mod error;
pub mod ledger;
pub mod result;

pub use error::BacktestError;
pub use ledger::TradeLedger;
pub use result::{BarSkipReason, OrderSkipReason, RunResult, SkippedBar, SkippedOrder, StrategyFault};

/// A signal waiting for the next bar's open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOrder {
    pub side: OrderSide,
    /// Index of the bar whose close produced the signal.
    pub created_at: usize,
}

/// The engine's position in its per-bar cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    AwaitingSignal,
    OrderPending(PendingOrder),
}

#[derive(Debug, Default)]
struct Diagnostics {
    strategy_faults: Vec<StrategyFault>,
    skipped_bars: Vec<SkippedBar>,
    skipped_orders: Vec<SkippedOrder>,
}

/// The main backtesting engine.
pub struct Backtester {
    // --- Context ---
    instrument: String,
    initial_capital: Decimal,
    // --- Components ---
    portfolio: Portfolio,
    strategy: Box<dyn Strategy>,
    risk_manager: Box<dyn RiskManager>,
    executor: Box<dyn Executor>,
    // --- Run state ---
    ledger: TradeLedger,
    state: EngineState,
    diagnostics: Diagnostics,
}

impl Backtester {
    /// Builds an engine with the standard simulated executor and position sizer.
    pub fn new(
        instrument: impl Into<String>,
        engine: EngineConfig,
        sizing: SizingConfig,
        strategy: Box<dyn Strategy>,
    ) -> Result<Self, BacktestError> {
        engine.validate()?;
        sizing.validate()?;
        let risk_manager = PositionSizer::new(sizing, &engine)?;
        let initial_capital = engine.initial_capital;
        let executor = SimulatedExecutor::new(engine);
        Ok(Self::with_components(
            instrument,
            initial_capital,
            strategy,
            Box::new(risk_manager),
            Box::new(executor),
        ))
    }

    /// Builds an engine from explicit components.
    pub fn with_components(
        instrument: impl Into<String>,
        initial_capital: Decimal,
        strategy: Box<dyn Strategy>,
        risk_manager: Box<dyn RiskManager>,
        executor: Box<dyn Executor>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            initial_capital,
            portfolio: Portfolio::new(initial_capital),
            strategy,
            risk_manager,
            executor,
            ledger: TradeLedger::new(),
            state: EngineState::AwaitingSignal,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Runs the simulation over `bars`, which must be in ascending time order.
    ///
    /// Malformed or out-of-order bars are skipped and reported in the result.
    /// Returns an error only when no bar is usable or when an engine invariant
    /// breaks, in which case the error carries the offending bar index.
    pub fn run(mut self, bars: &[Bar]) -> Result<RunResult, BacktestError> {
        let span = tracing::info_span!("backtest", instrument = %self.instrument);
        let _guard = span.enter();

        if bars.is_empty() {
            return Err(BacktestError::DataUnavailable);
        }
        tracing::info!(bars = bars.len(), initial_capital = %self.initial_capital, "starting backtest");

        let mut equity_curve = Vec::with_capacity(bars.len());
        let mut last_timestamp = None;
        self.strategy.on_init();

        for (bar_index, bar) in bars.iter().enumerate() {
            // --- 0. DATA CHECK ---
            if let Err(reason) = check_bar(bar, last_timestamp) {
                tracing::warn!(bar_index, timestamp = %bar.timestamp, %reason, "skipping bar");
                self.diagnostics.skipped_bars.push(SkippedBar {
                    bar_index,
                    timestamp: bar.timestamp,
                    reason,
                });
                continue;
            }
            last_timestamp = Some(bar.timestamp);

            // --- 1-3. FILL THE PENDING ORDER AT THIS BAR'S OPEN ---
            if let EngineState::OrderPending(order) = std::mem::take(&mut self.state) {
                self.execute_pending(order, bar_index, bar)?;
            }

            // --- 4-5. STRATEGY EVALUATION ---
            match self.strategy.on_bar(bar) {
                Ok(signal) => {
                    if let Some(side) = signal.side() {
                        tracing::debug!(bar_index, %side, "signal queued for next open");
                        self.state = EngineState::OrderPending(PendingOrder { side, created_at: bar_index });
                    }
                }
                Err(e) => {
                    tracing::warn!(bar_index, error = %e, "strategy failed on bar; holding");
                    self.diagnostics.strategy_faults.push(StrategyFault {
                        bar_index,
                        timestamp: bar.timestamp,
                        message: e.to_string(),
                    });
                }
            }

            // --- 6. MARK TO MARKET ---
            let position_value = self
                .portfolio
                .position_value(bar.close)
                .map_err(|e| BacktestError::violation(bar_index, e))?;
            let point = EquityPoint::new(bar.timestamp, self.portfolio.cash(), position_value)
                .ok_or_else(|| BacktestError::violation(bar_index, "total equity overflowed"))?;
            equity_curve.push(point);
        }

        self.strategy.on_stop();

        if equity_curve.is_empty() {
            return Err(BacktestError::DataUnavailable);
        }

        let unexecuted_signals = match self.state {
            EngineState::OrderPending(order) => {
                tracing::warn!(
                    side = %order.side,
                    created_at = order.created_at,
                    "signal on the final bar was never executed"
                );
                1
            }
            EngineState::AwaitingSignal => 0,
        };

        let result = RunResult {
            instrument: self.instrument,
            initial_capital: self.initial_capital,
            final_cash: self.portfolio.cash(),
            final_position: self.portfolio.position().quantity(),
            final_lots: self.portfolio.position().lots().copied().collect(),
            equity_curve,
            ledger: self.ledger,
            unexecuted_signals,
            strategy_faults: self.diagnostics.strategy_faults,
            skipped_bars: self.diagnostics.skipped_bars,
            skipped_orders: self.diagnostics.skipped_orders,
        };

        tracing::info!(
            trades = result.ledger.len(),
            final_cash = %result.final_cash,
            final_position = result.final_position,
            final_equity = %result.final_equity(),
            "backtest finished"
        );
        Ok(result)
    }

    fn execute_pending(&mut self, order: PendingOrder, bar_index: usize, bar: &Bar) -> Result<(), BacktestError> {
        if order.created_at >= bar_index {
            return Err(BacktestError::violation(
                bar_index,
                format!("order created at bar {} cannot fill on or before it", order.created_at),
            ));
        }

        let price = self
            .executor
            .fill_price(order.side, bar)
            .map_err(|e| BacktestError::violation(bar_index, e))?;
        let execution = match order.side {
            OrderSide::Buy => self.size_buy(price, bar_index)?,
            OrderSide::Sell => self.size_sell(price, bar_index)?,
        };

        match execution {
            Some(execution) => self.record_fill(execution, bar_index, bar),
            None => Ok(()),
        }
    }

    /// Sizes a buy and steps it down one lot at a time until cash covers
    /// notional plus costs.
    fn size_buy(&mut self, price: Decimal, bar_index: usize) -> Result<Option<Execution>, BacktestError> {
        let cash = self.portfolio.cash();
        let lot_size = self.risk_manager.lot_size().max(1);
        let mut quantity = self
            .risk_manager
            .size_buy(price, cash)
            .map_err(|e| BacktestError::violation(bar_index, e))?;

        while quantity > 0 {
            let execution = self
                .executor
                .quote(&OrderRequest { side: OrderSide::Buy, quantity }, price)
                .map_err(|e| BacktestError::violation(bar_index, e))?;
            let cash_delta = execution
                .cash_delta()
                .map_err(|e| BacktestError::violation(bar_index, e))?;
            if cash.checked_add(cash_delta).is_some_and(|left| left >= Decimal::ZERO) {
                return Ok(Some(execution));
            }
            quantity = quantity.saturating_sub(lot_size);
        }

        self.skip_order(bar_index, OrderSide::Buy, OrderSkipReason::ZeroQuantity);
        Ok(None)
    }

    /// Sells every settled share.
    fn size_sell(&mut self, price: Decimal, bar_index: usize) -> Result<Option<Execution>, BacktestError> {
        let position = self.portfolio.position();
        let quantity = position.sellable_at(bar_index);
        if quantity == 0 {
            let reason = if position.is_flat() {
                OrderSkipReason::NoPosition
            } else {
                OrderSkipReason::Unsettled
            };
            self.skip_order(bar_index, OrderSide::Sell, reason);
            return Ok(None);
        }

        self.executor
            .quote(&OrderRequest { side: OrderSide::Sell, quantity }, price)
            .map(Some)
            .map_err(|e| BacktestError::violation(bar_index, e))
    }

    fn record_fill(&mut self, execution: Execution, bar_index: usize, bar: &Bar) -> Result<(), BacktestError> {
        let cash_before = self.portfolio.cash();
        let cash_delta = execution
            .cash_delta()
            .map_err(|e| BacktestError::violation(bar_index, e))?;
        self.portfolio
            .apply(&execution, bar_index)
            .map_err(|e| BacktestError::violation(bar_index, e))?;

        let cash_after = self.portfolio.cash();
        if cash_before.checked_add(cash_delta) != Some(cash_after) {
            return Err(BacktestError::violation(
                bar_index,
                format!("cash moved from {cash_before} to {cash_after}, expected a change of {cash_delta}"),
            ));
        }

        let trade = Trade {
            side: execution.side,
            bar_index,
            timestamp: bar.timestamp,
            quantity: execution.quantity,
            price: execution.price,
            commission: execution.commission,
            stamp_duty: execution.stamp_duty,
            resulting_cash: cash_after,
            resulting_position: self.portfolio.position().quantity(),
        };
        tracing::debug!(
            bar_index,
            side = %trade.side,
            quantity = trade.quantity,
            price = %trade.price,
            commission = %trade.commission,
            stamp_duty = %trade.stamp_duty,
            cash = %trade.resulting_cash,
            position = trade.resulting_position,
            "filled order"
        );
        self.ledger.append(trade)
    }

    fn skip_order(&mut self, bar_index: usize, side: OrderSide, reason: OrderSkipReason) {
        tracing::warn!(bar_index, %side, %reason, "pending order skipped");
        self.diagnostics.skipped_orders.push(SkippedOrder { bar_index, side, reason });
    }
}

fn check_bar(bar: &Bar, last_timestamp: Option<chrono::DateTime<chrono::Utc>>) -> Result<(), BarSkipReason> {
    bar.validate().map_err(|e| BarSkipReason::Invalid(e.to_string()))?;
    match last_timestamp {
        Some(last) if bar.timestamp <= last => Err(BarSkipReason::NonIncreasingTimestamp),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use configuration::SizingMethod;
    use core_types::Signal;
    use executor::ExecutorError;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strategies::StrategyError;

    /// Replays a fixed list of strategy outcomes, one per processed bar.
    struct Scripted {
        script: Vec<Result<Signal, StrategyError>>,
        cursor: usize,
        inits: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(signals: &[Signal]) -> Self {
            Self::with_faults(signals.iter().copied().map(Ok).collect())
        }

        fn with_faults(script: Vec<Result<Signal, StrategyError>>) -> Self {
            Self {
                script,
                cursor: 0,
                inits: Arc::default(),
                stops: Arc::default(),
            }
        }
    }

    impl Strategy for Scripted {
        fn on_init(&mut self) {
            self.cursor = 0;
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn on_bar(&mut self, _bar: &Bar) -> Result<Signal, StrategyError> {
            let outcome = self.script.get(self.cursor).cloned().unwrap_or(Ok(Signal::Hold));
            self.cursor += 1;
            outcome
        }

        fn on_stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn day(i: usize) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
    }

    /// Bars from (open, close) pairs, one day apart.
    fn bars(prices: &[(Decimal, Decimal)]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, (open, close))| Bar {
                timestamp: day(i),
                open: *open,
                high: (*open).max(*close),
                low: (*open).min(*close),
                close: *close,
                volume: dec!(1000),
            })
            .collect()
    }

    fn engine(config: EngineConfig, sizing: SizingConfig, strategy: Scripted) -> Backtester {
        Backtester::new("600000", config, sizing, Box::new(strategy)).unwrap()
    }

    fn run(signals: &[Signal], prices: &[(Decimal, Decimal)]) -> RunResult {
        engine(EngineConfig::default(), SizingConfig::default(), Scripted::new(signals))
            .run(&bars(prices))
            .unwrap()
    }

    fn scenario_prices() -> Vec<(Decimal, Decimal)> {
        vec![(dec!(98), dec!(100)), (dec!(101.5), dec!(99)), (dec!(100), dec!(102))]
    }

    #[test]
    fn buy_signal_fills_at_next_open() {
        let result = run(&[Signal::Buy, Signal::Hold, Signal::Hold], &scenario_prices());

        assert_eq!(result.ledger.len(), 1);
        let trade = &result.ledger.as_slice()[0];
        assert_eq!(trade.side, OrderSide::Buy);
        assert_eq!(trade.bar_index, 1);
        assert_eq!(trade.timestamp, day(1));
        assert_eq!(trade.price, dec!(101.5));
        // 100000 * 0.99 / 101.5 = 975.36 -> 900 shares
        assert_eq!(trade.quantity, 900);
        assert_eq!(trade.commission, dec!(27.405));
        assert_eq!(trade.resulting_cash, dec!(8622.595));
        assert_eq!(result.unexecuted_signals, 0);
    }

    #[test]
    fn settled_shares_sell_on_the_bar_after_purchase() {
        let result = run(&[Signal::Buy, Signal::Sell, Signal::Hold], &scenario_prices());

        let trades = result.ledger.as_slice();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].side, OrderSide::Sell);
        assert_eq!(trades[1].bar_index, 2);
        assert_eq!(trades[1].quantity, 900);
        assert_eq!(trades[1].price, dec!(100));
        assert_eq!(result.final_position, 0);
        assert!(result.final_lots.is_empty());
    }

    #[test]
    fn round_trip_costs_follow_commission_floor_and_stamp_duty() {
        let config = EngineConfig { initial_capital: dec!(10000), ..EngineConfig::default() };
        let sizing = SizingConfig {
            method: SizingMethod::FixedCash,
            fixed_cash: dec!(1000),
            ..SizingConfig::default()
        };
        let prices = [(dec!(10), dec!(10)), (dec!(10), dec!(11)), (dec!(12), dec!(12))];
        let result = engine(config, sizing, Scripted::new(&[Signal::Buy, Signal::Sell]))
            .run(&bars(&prices))
            .unwrap();

        let trades = result.ledger.as_slice();
        assert_eq!(trades[0].quantity, 100);
        assert_eq!(trades[0].cash_delta(), Some(dec!(-1005)));
        assert_eq!(trades[1].commission, dec!(5));
        assert_eq!(trades[1].stamp_duty, dec!(1.2));
        assert_eq!(trades[1].cash_delta(), Some(dec!(1193.8)));
        assert_eq!(result.final_cash, dec!(10188.8));
    }

    #[test]
    fn signal_on_final_bar_is_counted_not_traded() {
        let result = run(&[Signal::Hold, Signal::Hold, Signal::Buy], &scenario_prices());
        assert!(result.ledger.is_empty());
        assert_eq!(result.unexecuted_signals, 1);
    }

    #[test]
    fn records_one_equity_point_per_bar() {
        let result = run(&[Signal::Buy], &scenario_prices());
        assert_eq!(result.equity_curve.len(), 3);
        assert_eq!(result.equity_curve[0].total_equity, dec!(100000));
        // Marked at the close of bar 2: 8622.595 + 900 * 102
        assert_eq!(result.equity_curve[2].total_equity, dec!(100422.595));
        for point in &result.equity_curve {
            assert_eq!(point.total_equity, point.cash + point.position_value);
        }
        assert_eq!(result.final_equity(), dec!(100422.595));
    }

    #[test]
    fn strategy_fault_is_a_hold() {
        let script = vec![
            Err(StrategyError::IndicatorError("boom".to_string())),
            Ok(Signal::Buy),
            Ok(Signal::Hold),
        ];
        let result = engine(EngineConfig::default(), SizingConfig::default(), Scripted::with_faults(script))
            .run(&bars(&scenario_prices()))
            .unwrap();

        assert_eq!(result.strategy_faults.len(), 1);
        assert_eq!(result.strategy_faults[0].bar_index, 0);
        assert_eq!(result.ledger.len(), 1);
        assert_eq!(result.ledger.as_slice()[0].bar_index, 2);
    }

    #[test]
    fn invalid_bar_is_skipped_and_order_waits_for_next_valid_open() {
        let mut data = bars(&scenario_prices());
        data[1].high = dec!(50);
        let result = engine(EngineConfig::default(), SizingConfig::default(), Scripted::new(&[Signal::Buy]))
            .run(&data)
            .unwrap();

        assert_eq!(result.skipped_bars.len(), 1);
        assert_eq!(result.skipped_bars[0].bar_index, 1);
        assert!(matches!(result.skipped_bars[0].reason, BarSkipReason::Invalid(_)));
        assert_eq!(result.equity_curve.len(), 2);
        assert_eq!(result.ledger.as_slice()[0].bar_index, 2);
        assert_eq!(result.ledger.as_slice()[0].price, dec!(100));
    }

    #[test]
    fn repeated_timestamp_is_skipped() {
        let mut data = bars(&scenario_prices());
        data[2].timestamp = data[1].timestamp;
        let result = run_on(&data);
        assert_eq!(result.skipped_bars.len(), 1);
        assert_eq!(result.skipped_bars[0].reason, BarSkipReason::NonIncreasingTimestamp);
    }

    fn run_on(data: &[Bar]) -> RunResult {
        engine(EngineConfig::default(), SizingConfig::default(), Scripted::new(&[]))
            .run(data)
            .unwrap()
    }

    #[test]
    fn unaffordable_buy_is_skipped() {
        let config = EngineConfig { initial_capital: dec!(1000), ..EngineConfig::default() };
        let result = engine(config, SizingConfig::default(), Scripted::new(&[Signal::Buy]))
            .run(&bars(&scenario_prices()))
            .unwrap();

        assert!(result.ledger.is_empty());
        assert_eq!(
            result.skipped_orders,
            vec![SkippedOrder { bar_index: 1, side: OrderSide::Buy, reason: OrderSkipReason::ZeroQuantity }]
        );
        assert_eq!(result.final_cash, dec!(1000));
    }

    #[test]
    fn buy_steps_down_a_lot_when_costs_exceed_cash() {
        let config = EngineConfig {
            initial_capital: dec!(10000),
            deployable_fraction: Decimal::ONE,
            ..EngineConfig::default()
        };
        let prices = [(dec!(10), dec!(10)), (dec!(10), dec!(10))];
        let result = engine(config, SizingConfig::default(), Scripted::new(&[Signal::Buy]))
            .run(&bars(&prices))
            .unwrap();

        // 1000 shares would cost 10005.
        assert_eq!(result.ledger.as_slice()[0].quantity, 900);
        assert_eq!(result.final_cash, dec!(995));
    }

    #[test]
    fn sell_without_position_is_skipped() {
        let result = run(&[Signal::Sell], &scenario_prices());
        assert!(result.ledger.is_empty());
        assert_eq!(result.skipped_orders[0].reason, OrderSkipReason::NoPosition);
    }

    #[test]
    fn lifecycle_hooks_run_once() {
        let strategy = Scripted::new(&[Signal::Buy]);
        let (inits, stops) = (strategy.inits.clone(), strategy.stops.clone());
        engine(EngineConfig::default(), SizingConfig::default(), strategy)
            .run(&bars(&scenario_prices()))
            .unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_input_is_data_unavailable() {
        let err = engine(EngineConfig::default(), SizingConfig::default(), Scripted::new(&[]))
            .run(&[])
            .unwrap_err();
        assert!(matches!(err, BacktestError::DataUnavailable));
    }

    /// Sells twice what it is asked to.
    struct OversellingExecutor(SimulatedExecutor);

    impl Executor for OversellingExecutor {
        fn fill_price(&self, side: OrderSide, bar: &Bar) -> Result<Decimal, ExecutorError> {
            self.0.fill_price(side, bar)
        }

        fn quote(&self, order: &OrderRequest, price: Decimal) -> Result<Execution, ExecutorError> {
            let quantity = match order.side {
                OrderSide::Buy => order.quantity,
                OrderSide::Sell => order.quantity * 2,
            };
            self.0.quote(&OrderRequest { side: order.side, quantity }, price)
        }
    }

    #[test]
    fn invariant_violation_aborts_with_bar_index() {
        let config = EngineConfig::default();
        let sizer = PositionSizer::new(SizingConfig::default(), &config).unwrap();
        let backtester = Backtester::with_components(
            "600000",
            config.initial_capital,
            Box::new(Scripted::new(&[Signal::Buy, Signal::Sell])),
            Box::new(sizer),
            Box::new(OversellingExecutor(SimulatedExecutor::new(config))),
        );

        let err = backtester.run(&bars(&scenario_prices())).unwrap_err();
        assert!(matches!(err, BacktestError::InvariantViolation { bar_index: 2, .. }));
    }

    #[test]
    fn mark_beyond_decimal_range_is_an_invariant_violation() {
        let huge = Decimal::from_i128_with_scale(10_i128.pow(25), 0);
        let prices = [(dec!(10), dec!(10)), (dec!(10), dec!(10)), (dec!(10), huge)];
        let err = engine(EngineConfig::default(), SizingConfig::default(), Scripted::new(&[Signal::Buy]))
            .run(&bars(&prices))
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvariantViolation { bar_index: 2, .. }));
    }

    #[test]
    fn unsizeable_open_is_an_invariant_violation() {
        let tiny = Decimal::new(1, 24);
        let prices = [(dec!(10), dec!(10)), (tiny, tiny)];
        let err = engine(EngineConfig::default(), SizingConfig::default(), Scripted::new(&[Signal::Buy]))
            .run(&bars(&prices))
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvariantViolation { bar_index: 1, .. }));
    }

    #[test]
    fn rejects_invalid_sizing_config() {
        let sizing = SizingConfig { min_cash_fraction: Decimal::ONE, ..SizingConfig::default() };
        let result = Backtester::new("600000", EngineConfig::default(), sizing, Box::new(Scripted::new(&[])));
        assert!(matches!(result, Err(BacktestError::Config(_))));

        let sizing = SizingConfig { fixed_cash: Decimal::ZERO, ..SizingConfig::default() };
        let result = Backtester::new("600000", EngineConfig::default(), sizing, Box::new(Scripted::new(&[])));
        assert!(matches!(result, Err(BacktestError::Config(_))));
    }
}
