use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] configuration::ConfigError),

    #[error("Strategy creation failed: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Backtest failed: {0}")]
    Backtest(#[from] backtester::BacktestError),

    #[error("Performance analysis failed: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("No data for instrument '{instrument}': {reason}")]
    DataUnavailable { instrument: String, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run for '{instrument}' panicked: {message}")]
    Panicked { instrument: String, message: String },

    #[error("The batch has no instruments to run.")]
    NoInstruments,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}
