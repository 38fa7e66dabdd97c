use crate::Strategy;
use crate::error::StrategyError;
use crate::ma_crossover::MaCrossover;
use crate::rsi::RsiStrategy;
use crate::weekly_dca::WeeklyDca;
use configuration::StrategyConfig;
use core_types::StrategyId;

/// Creates a new strategy instance from the strategy section of the configuration.
///
/// Every call returns a fresh instance with its own indicator state, so the batch
/// runner can call it once per instrument.
pub fn create_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>, StrategyError> {
    // The compiler will error if a new StrategyId is added but not handled here.
    match config.id {
        StrategyId::MaCrossover => Ok(Box::new(MaCrossover::new(config.ma_crossover.clone())?)),
        StrategyId::Rsi => Ok(Box::new(RsiStrategy::new(config.rsi.clone())?)),
        StrategyId::WeeklyDca => Ok(Box::new(WeeklyDca::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::MaCrossoverParams;

    #[test]
    fn builds_every_strategy_id() {
        for id in [StrategyId::MaCrossover, StrategyId::Rsi, StrategyId::WeeklyDca] {
            let config = StrategyConfig { id, ..StrategyConfig::default() };
            assert!(create_strategy(&config).is_ok(), "{id:?}");
        }
    }

    #[test]
    fn surfaces_parameter_errors() {
        let config = StrategyConfig {
            id: StrategyId::MaCrossover,
            ma_crossover: MaCrossoverParams { short_window: 40, long_window: 20 },
            ..StrategyConfig::default()
        };
        assert!(matches!(create_strategy(&config), Err(StrategyError::InvalidParameters(_))));
    }
}
