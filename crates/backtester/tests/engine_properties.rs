use backtester::{Backtester, RunResult};
use chrono::{Duration, TimeZone, Utc};
use configuration::{EngineConfig, SizingConfig};
use core_types::{Bar, OrderSide, Signal};
use proptest::prelude::*;
use rust_decimal::Decimal;
use strategies::{Strategy as TradingStrategy, StrategyError};

/// Emits a fixed signal per bar.
struct Scripted {
    signals: Vec<Signal>,
    cursor: usize,
}

impl TradingStrategy for Scripted {
    fn on_init(&mut self) {
        self.cursor = 0;
    }

    fn on_bar(&mut self, _bar: &Bar) -> Result<Signal, StrategyError> {
        let signal = self.signals.get(self.cursor).copied().unwrap_or_default();
        self.cursor += 1;
        Ok(signal)
    }
}

fn make_bars(prices: &[(i64, i64)]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    prices
        .iter()
        .enumerate()
        .map(|(i, (open, close))| {
            let open = Decimal::new(*open, 2);
            let close = Decimal::new(*close, 2);
            Bar {
                timestamp: start + Duration::days(i as i64),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: Decimal::ONE_HUNDRED,
            }
        })
        .collect()
}

fn run(signals: &[Signal], bars: &[Bar]) -> RunResult {
    let strategy = Scripted { signals: signals.to_vec(), cursor: 0 };
    Backtester::new("000001", EngineConfig::default(), SizingConfig::default(), Box::new(strategy))
        .unwrap()
        .run(bars)
        .unwrap()
}

fn signal() -> impl Strategy<Value = Signal> {
    prop_oneof![Just(Signal::Buy), Just(Signal::Sell), Just(Signal::Hold)]
}

fn scenario() -> impl Strategy<Value = (Vec<(i64, i64)>, Vec<Signal>)> {
    (2usize..60).prop_flat_map(|len| {
        (
            prop::collection::vec((500i64..20_000, 500i64..20_000), len),
            prop::collection::vec(signal(), len),
        )
    })
}

proptest! {
    #[test]
    fn identical_inputs_replay_identically((prices, signals) in scenario()) {
        let bars = make_bars(&prices);
        prop_assert_eq!(run(&signals, &bars), run(&signals, &bars));
    }

    #[test]
    fn fills_happen_at_the_open_after_the_signal((prices, signals) in scenario()) {
        let bars = make_bars(&prices);
        let result = run(&signals, &bars);
        for trade in &result.ledger {
            prop_assert!(trade.bar_index >= 1);
            prop_assert_eq!(trade.price, bars[trade.bar_index].open);
            prop_assert_eq!(signals[trade.bar_index - 1].side(), Some(trade.side));
        }
    }

    #[test]
    fn cash_moves_exactly_by_each_trade((prices, signals) in scenario()) {
        let result = run(&signals, &make_bars(&prices));
        let mut cash = result.initial_capital;
        for trade in &result.ledger {
            prop_assert_eq!(trade.cash_delta().map(|delta| cash + delta), Some(trade.resulting_cash));
            prop_assert!(trade.resulting_cash >= Decimal::ZERO);
            cash = trade.resulting_cash;
        }
        prop_assert_eq!(cash, result.final_cash);
    }

    #[test]
    fn sells_only_touch_settled_lots((prices, signals) in scenario()) {
        let result = run(&signals, &make_bars(&prices));
        // (quantity, acquired_at) still held, oldest first.
        let mut lots: Vec<(u64, usize)> = Vec::new();
        for trade in &result.ledger {
            match trade.side {
                OrderSide::Buy => lots.push((trade.quantity, trade.bar_index)),
                OrderSide::Sell => {
                    let settled: u64 = lots
                        .iter()
                        .filter(|(_, acquired_at)| *acquired_at < trade.bar_index)
                        .map(|(quantity, _)| quantity)
                        .sum();
                    prop_assert!(trade.quantity <= settled);
                    let mut remaining = trade.quantity;
                    while remaining > 0 {
                        let taken = remaining.min(lots[0].0);
                        lots[0].0 -= taken;
                        remaining -= taken;
                        if lots[0].0 == 0 {
                            lots.remove(0);
                        }
                    }
                }
            }
            prop_assert_eq!(trade.quantity % 100, 0);
        }
    }

    #[test]
    fn only_a_final_bar_signal_goes_unexecuted((prices, signals) in scenario()) {
        let result = run(&signals, &make_bars(&prices));
        let expected = u32::from(signals.last().and_then(|s| s.side()).is_some());
        prop_assert_eq!(result.unexecuted_signals, expected);
        prop_assert_eq!(result.equity_curve.len(), prices.len());
    }
}
