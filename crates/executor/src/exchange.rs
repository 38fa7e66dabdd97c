use crate::error::ExecutorError;
use configuration::EngineConfig;
use core_types::{Bar, OrderSide, signed_cash_delta};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A sized market order, to be filled at a bar's open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub quantity: u64,
}

/// The receipt of a simulated fill. Applying it to a `Portfolio` is the
/// caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub side: OrderSide,
    pub quantity: u64,
    pub price: Decimal,
    pub commission: Decimal,
    pub stamp_duty: Decimal,
}

fn overflow(what: &str) -> ExecutorError {
    ExecutorError::Overflow(what.to_string())
}

impl Execution {
    pub fn notional(&self) -> Result<Decimal, ExecutorError> {
        Decimal::from(self.quantity)
            .checked_mul(self.price)
            .ok_or_else(|| overflow("notional"))
    }

    pub fn costs(&self) -> Result<Decimal, ExecutorError> {
        self.commission
            .checked_add(self.stamp_duty)
            .ok_or_else(|| overflow("transaction costs"))
    }

    /// Signed cash movement: negative for buys (notional plus costs), positive
    /// for sells (notional minus costs).
    pub fn cash_delta(&self) -> Result<Decimal, ExecutorError> {
        signed_cash_delta(self.side, self.notional()?, self.costs()?).ok_or_else(|| overflow("cash movement"))
    }
}

/// A generic trait for an execution engine.
///
/// The backtester only talks to this trait, so the cost model can be swapped
/// without touching the bar loop.
pub trait Executor: Send + Sync {
    /// The price an order on `side` fills at on `bar`.
    fn fill_price(&self, side: OrderSide, bar: &Bar) -> Result<Decimal, ExecutorError>;

    /// Prices `order` at `price`, including transaction costs.
    ///
    /// This function calculates the costs of the trade but crucially **does not
    /// modify the portfolio state itself**.
    fn quote(&self, order: &OrderRequest, price: Decimal) -> Result<Execution, ExecutorError>;

    /// Fills `order` against `bar`.
    fn execute(&self, order: &OrderRequest, bar: &Bar) -> Result<Execution, ExecutorError> {
        self.quote(order, self.fill_price(order.side, bar)?)
    }
}

/// The "virtual exchange" for backtesting.
///
/// Orders fill at the bar's open, moved against the trader by `slippage`.
/// Commission is charged on both sides with a minimum; stamp duty only on sells.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    params: EngineConfig,
}

impl SimulatedExecutor {
    pub fn new(params: EngineConfig) -> Self {
        Self { params }
    }

    /// notional × commission_rate, floored at `min_commission`.
    pub fn commission(&self, notional: Decimal) -> Result<Decimal, ExecutorError> {
        notional
            .checked_mul(self.params.commission_rate)
            .map(|fee| fee.max(self.params.min_commission))
            .ok_or_else(|| overflow("commission"))
    }

    /// notional × stamp_duty_rate on sells; zero on buys.
    pub fn stamp_duty(&self, side: OrderSide, notional: Decimal) -> Result<Decimal, ExecutorError> {
        match side {
            OrderSide::Buy => Ok(Decimal::ZERO),
            OrderSide::Sell => notional
                .checked_mul(self.params.stamp_duty_rate)
                .ok_or_else(|| overflow("stamp duty")),
        }
    }
}

impl Executor for SimulatedExecutor {
    fn fill_price(&self, side: OrderSide, bar: &Bar) -> Result<Decimal, ExecutorError> {
        if self.params.slippage.is_zero() {
            return Ok(bar.open);
        }
        let factor = match side {
            // For a buy, slippage makes the price HIGHER (worse).
            OrderSide::Buy => Decimal::ONE + self.params.slippage,
            // For a sell, slippage makes the price LOWER (worse).
            OrderSide::Sell => Decimal::ONE - self.params.slippage,
        };
        bar.open.checked_mul(factor).ok_or_else(|| overflow("fill price"))
    }

    fn quote(&self, order: &OrderRequest, price: Decimal) -> Result<Execution, ExecutorError> {
        if order.quantity == 0 {
            return Err(ExecutorError::InvalidQuantity(order.quantity));
        }

        let notional = Decimal::from(order.quantity)
            .checked_mul(price)
            .ok_or_else(|| overflow("notional"))?;
        let execution = Execution {
            side: order.side,
            quantity: order.quantity,
            price,
            commission: self.commission(notional)?,
            stamp_duty: self.stamp_duty(order.side, notional)?,
        };
        // Rejects fills whose cash movement cannot be represented.
        execution.cash_delta()?;

        tracing::debug!(
            side = %execution.side,
            quantity = execution.quantity,
            %price,
            commission = %execution.commission,
            stamp_duty = %execution.stamp_duty,
            "SimulatedExecutor: priced order"
        );
        Ok(execution)
    }
}
