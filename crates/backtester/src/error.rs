use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Configuration error: {0}")]
    Config(#[from] configuration::ConfigError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Engine invariant violated at bar {bar_index}: {description}")]
    InvariantViolation { bar_index: usize, description: String },

    #[error("No usable bars were supplied for the backtest.")]
    DataUnavailable,
}

impl BacktestError {
    pub(crate) fn violation(bar_index: usize, description: impl ToString) -> Self {
        BacktestError::InvariantViolation {
            bar_index,
            description: description.to_string(),
        }
    }
}
