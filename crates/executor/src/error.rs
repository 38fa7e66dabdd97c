use thiserror::Error;

/// Portfolio invariant violations. Any of these means the caller broke the
/// execution contract; the backtester treats them as fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Not enough cash available to execute trade. Required: {required}, Available: {available}")]
    InsufficientCash { required: String, available: String },

    #[error("Cannot sell {requested} shares: only {sellable} have settled by bar {bar_index}")]
    UnsettledQuantity { requested: u64, sellable: u64, bar_index: usize },

    #[error("Invalid order quantity: {0}")]
    InvalidQuantity(u64),

    #[error("Arithmetic overflow while computing {0}")]
    Overflow(String),

    #[error("An unexpected portfolio state was encountered: {0}")]
    PortfolioError(String),
}
