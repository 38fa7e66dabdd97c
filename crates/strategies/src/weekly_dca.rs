use crate::Strategy;
use crate::error::StrategyError;
use chrono::Datelike;
use core_types::{Bar, Signal};

/// Weekly dollar-cost averaging.
///
/// Emits a buy on the first bar of every ISO week regardless of price. The
/// amount invested per buy is decided by the engine's sizing rule, so this is
/// normally paired with the `fixed_cash` sizing method and a zero
/// `min_cash_fraction`; any reserve stops the buys once cash falls to it.
#[derive(Debug, Default)]
pub struct WeeklyDca {
    last_week: Option<(i32, u32)>,
    buys: usize,
}

impl WeeklyDca {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for WeeklyDca {
    fn on_init(&mut self) {
        self.last_week = None;
        self.buys = 0;
    }

    fn on_bar(&mut self, bar: &Bar) -> Result<Signal, StrategyError> {
        let week = bar.timestamp.iso_week();
        let key = (week.year(), week.week());

        if self.last_week == Some(key) {
            return Ok(Signal::Hold);
        }
        self.last_week = Some(key);
        self.buys += 1;
        Ok(Signal::Buy)
    }

    fn on_stop(&mut self) {
        tracing::debug!(buys = self.buys, "WeeklyDca: stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bars_from_closes;
    use rust_decimal_macros::dec;

    #[test]
    fn buys_once_per_iso_week() {
        // 2024-01-01 is a Monday; 14 daily bars span two full ISO weeks.
        let bars = bars_from_closes(&[dec!(10); 14]);
        let mut dca = WeeklyDca::new();
        dca.on_init();
        let signals: Vec<Signal> = bars.iter().map(|b| dca.on_bar(b).unwrap()).collect();

        assert_eq!(signals[0], Signal::Buy);
        assert_eq!(signals[7], Signal::Buy);
        assert_eq!(signals.iter().filter(|s| **s == Signal::Buy).count(), 2);
    }
}
