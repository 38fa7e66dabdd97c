use crate::Strategy;
use crate::error::StrategyError;
use configuration::RsiParams;
use core_types::{Bar, Signal};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Mean-reversion on RSI thresholds: buy when oversold, sell when overbought.
///
/// The RSI is the simple-average form: average gain and average loss over the
/// last `period` close-to-close changes, recomputed on every bar. No smoothing
/// carries over from changes that have left the window.
pub struct RsiStrategy {
    period: usize,
    overbought: Decimal,
    oversold: Decimal,
    prev_close: Option<Decimal>,
    changes: VecDeque<Decimal>,
    bars_seen: usize,
}

impl RsiStrategy {
    pub fn new(params: RsiParams) -> Result<Self, StrategyError> {
        if params.period == 0 {
            return Err(StrategyError::InvalidParameters("RSI period must be at least 1".to_string()));
        }
        if params.oversold >= params.overbought {
            return Err(StrategyError::InvalidParameters(
                "RSI oversold threshold must be below the overbought threshold".to_string(),
            ));
        }

        Ok(Self {
            period: params.period,
            overbought: params.overbought,
            oversold: params.oversold,
            prev_close: None,
            changes: VecDeque::with_capacity(params.period),
            bars_seen: 0,
        })
    }
}

/// RSI over `changes`, with gains and losses averaged over `period`.
///
/// Returns 100 when there are no losses in the window, flat windows included.
/// `None` if the summed gains or losses overflow.
fn simple_rsi(changes: &VecDeque<Decimal>, period: usize) -> Option<Decimal> {
    let hundred = Decimal::ONE_HUNDRED;
    let (gains, losses) = changes
        .iter()
        .try_fold((Decimal::ZERO, Decimal::ZERO), |(gains, losses), change| {
            if change.is_sign_positive() {
                Some((gains.checked_add(*change)?, losses))
            } else {
                Some((gains, losses.checked_sub(*change)?))
            }
        })?;

    let period = Decimal::from(period);
    let avg_loss = losses / period;
    if avg_loss.is_zero() {
        return Some(hundred);
    }
    let rsi = match (gains / period).checked_div(avg_loss) {
        Some(rs) => hundred - hundred / (Decimal::ONE + rs),
        // Relative strength beyond the Decimal range rounds to 100.
        None => hundred,
    };
    Some(rsi)
}

impl Strategy for RsiStrategy {
    fn on_init(&mut self) {
        tracing::debug!(period = self.period, "RsiStrategy: initializing");
        self.prev_close = None;
        self.changes.clear();
        self.bars_seen = 0;
    }

    fn on_bar(&mut self, bar: &Bar) -> Result<Signal, StrategyError> {
        self.bars_seen += 1;
        let close = bar.close;
        let prev = self.prev_close.replace(close);
        let Some(prev) = prev else {
            return Ok(Signal::Hold);
        };

        let change = close
            .checked_sub(prev)
            .ok_or_else(|| StrategyError::IndicatorError(format!("close change {prev} -> {close} overflows")))?;
        if self.changes.len() == self.period {
            self.changes.pop_front();
        }
        self.changes.push_back(change);

        // At least `period` price changes are needed before the value means anything.
        if self.changes.len() < self.period {
            return Ok(Signal::Hold);
        }

        let rsi = simple_rsi(&self.changes, self.period)
            .ok_or_else(|| StrategyError::IndicatorError("RSI gains or losses overflow".to_string()))?;
        let signal = if rsi < self.oversold {
            Signal::Buy
        } else if rsi > self.overbought {
            Signal::Sell
        } else {
            Signal::Hold
        };
        tracing::debug!(%rsi, ?signal, "RsiStrategy: evaluated");
        Ok(signal)
    }

    fn on_stop(&mut self) {
        tracing::debug!(bars = self.bars_seen, "RsiStrategy: stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bars_from_closes;
    use rust_decimal_macros::dec;

    fn params() -> RsiParams {
        RsiParams { period: 3, overbought: dec!(70), oversold: dec!(30) }
    }

    fn signals(closes: &[i64]) -> Vec<Signal> {
        let closes: Vec<Decimal> = closes.iter().map(|c| Decimal::from(*c)).collect();
        let mut strategy = RsiStrategy::new(params()).unwrap();
        strategy.on_init();
        bars_from_closes(&closes)
            .iter()
            .map(|bar| strategy.on_bar(bar).unwrap())
            .collect()
    }

    #[test]
    fn holds_until_period_changes_are_seen() {
        let s = signals(&[10, 9, 8]);
        assert!(s.iter().all(|s| *s == Signal::Hold));
    }

    #[test]
    fn steady_decline_is_oversold() {
        let s = signals(&[20, 19, 18, 17, 16, 15, 14]);
        assert_eq!(*s.last().unwrap(), Signal::Buy);
    }

    #[test]
    fn steady_rally_is_overbought() {
        let s = signals(&[10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(*s.last().unwrap(), Signal::Sell);
    }

    #[test]
    fn averages_gains_and_losses_over_the_window() {
        // +6, -3, +3: avg gain 3, avg loss 1, RS 3.
        let changes: VecDeque<Decimal> = [dec!(6), dec!(-3), dec!(3)].into_iter().collect();
        assert_eq!(simple_rsi(&changes, 3), Some(dec!(75)));

        let flat: VecDeque<Decimal> = [Decimal::ZERO; 3].into_iter().collect();
        assert_eq!(simple_rsi(&flat, 3), Some(dec!(100)));
    }

    #[test]
    fn changes_outside_the_window_are_forgotten() {
        // The +3 jump has left the window by the last bar, leaving three
        // losses and an RSI of 0.
        let s = signals(&[10, 13, 12, 11, 10]);
        assert_eq!(s[3], Signal::Hold);
        assert_eq!(s[4], Signal::Buy);
    }

    #[test]
    fn rejects_crossed_thresholds() {
        let bad = RsiParams { period: 14, overbought: dec!(30), oversold: dec!(70) };
        assert!(RsiStrategy::new(bad).is_err());
    }
}
