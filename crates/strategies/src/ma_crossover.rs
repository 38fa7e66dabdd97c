use crate::error::StrategyError;
use crate::{Strategy, close_as_f64};
use configuration::MaCrossoverParams;
use core_types::{Bar, Signal};
use ta::indicators::SimpleMovingAverage as Sma;
use ta::{Next, Reset};

/// The dual simple moving average crossover strategy.
///
/// Buys on a golden cross (short MA crosses above long MA) and sells on a
/// death cross. Holds until both averages have a full window and a previous
/// value to compare against.
pub struct MaCrossover {
    params: MaCrossoverParams,
    ma_short: Sma,
    ma_long: Sma,
    bars_seen: usize,
    // State: the previous values of both MAs, to detect a crossover event.
    prev_short: Option<f64>,
    prev_long: Option<f64>,
}

impl MaCrossover {
    /// Creates a new `MaCrossover` instance with the given parameters.
    ///
    /// It performs validation to ensure the parameters are logical.
    pub fn new(params: MaCrossoverParams) -> Result<Self, StrategyError> {
        if params.short_window == 0 || params.short_window >= params.long_window {
            return Err(StrategyError::InvalidParameters(
                "Short MA window must be positive and less than the long MA window".to_string(),
            ));
        }

        let sma = |period: usize| {
            Sma::new(period).map_err(|e| {
                StrategyError::InvalidParameters(format!("Failed to initialize SMA({period}): {e:?}"))
            })
        };

        Ok(Self {
            ma_short: sma(params.short_window)?,
            ma_long: sma(params.long_window)?,
            params,
            bars_seen: 0,
            prev_short: None,
            prev_long: None,
        })
    }
}

impl Strategy for MaCrossover {
    fn on_init(&mut self) {
        tracing::debug!(
            short = self.params.short_window,
            long = self.params.long_window,
            "MaCrossover: initializing"
        );
        self.ma_short.reset();
        self.ma_long.reset();
        self.bars_seen = 0;
        self.prev_short = None;
        self.prev_long = None;
    }

    fn on_bar(&mut self, bar: &Bar) -> Result<Signal, StrategyError> {
        let close = close_as_f64(bar)?;

        let short = self.ma_short.next(close);
        let long = self.ma_long.next(close);
        self.bars_seen += 1;

        // The SMA averages whatever it has seen during warm-up; only a full long
        // window counts as a real value.
        if self.bars_seen < self.params.long_window {
            return Ok(Signal::Hold);
        }

        let mut signal = Signal::Hold;
        if let (Some(prev_short), Some(prev_long)) = (self.prev_short, self.prev_long) {
            let golden_cross = prev_short <= prev_long && short > long;
            let death_cross = prev_short >= prev_long && short < long;

            if golden_cross {
                signal = Signal::Buy;
            } else if death_cross {
                signal = Signal::Sell;
            }
            tracing::debug!(short, long, prev_short, prev_long, ?signal, "MaCrossover: evaluated");
        }

        // Update state for the next evaluation.
        self.prev_short = Some(short);
        self.prev_long = Some(long);

        Ok(signal)
    }

    fn on_stop(&mut self) {
        tracing::debug!(bars = self.bars_seen, "MaCrossover: stopping");
    }
}
