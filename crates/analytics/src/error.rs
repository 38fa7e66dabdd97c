use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Not enough data to perform calculation: {0}")]
    NotEnoughData(String),

    #[error("Trade ledger is inconsistent at bar {bar_index}: {reason}")]
    InconsistentLedger { bar_index: usize, reason: String },

    #[error("Error in calculation: {0}")]
    Calculation(String),
}
