use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Sized quantity for budget {budget} at price {price} does not fit in a share count")]
    QuantityOverflow { budget: Decimal, price: Decimal },
}
