use crate::error::ExecutorError;
use crate::exchange::Execution;
use core_types::{Lot, OrderSide};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// A long position held as a queue of lots, oldest first.
///
/// Lots are appended in bar order, so the settled lots at any bar always form
/// a prefix of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
    quantity: u64,
    lots: VecDeque<Lot>,
}

impl Position {
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Shares that have settled by `bar_index`.
    pub fn sellable_at(&self, bar_index: usize) -> u64 {
        self.lots
            .iter()
            .take_while(|lot| lot.is_sellable_at(bar_index))
            .map(|lot| lot.quantity)
            .sum()
    }

    fn push_lot(&mut self, lot: Lot) -> Result<(), ExecutorError> {
        if let Some(last) = self.lots.back() {
            if lot.acquired_at < last.acquired_at {
                return Err(ExecutorError::PortfolioError(format!(
                    "lot acquired at bar {} is older than the newest lot (bar {})",
                    lot.acquired_at, last.acquired_at
                )));
            }
        }
        self.quantity = self
            .quantity
            .checked_add(lot.quantity)
            .ok_or_else(|| ExecutorError::PortfolioError("position quantity overflow".to_string()))?;
        self.lots.push_back(lot);
        Ok(())
    }

    /// Removes `quantity` settled shares oldest-first and returns the lots (or
    /// lot fragments) that were consumed.
    fn consume_fifo(&mut self, quantity: u64, bar_index: usize) -> Result<Vec<Lot>, ExecutorError> {
        let sellable = self.sellable_at(bar_index);
        if quantity > sellable {
            return Err(ExecutorError::UnsettledQuantity { requested: quantity, sellable, bar_index });
        }

        let mut remaining = quantity;
        let mut consumed = Vec::new();
        while remaining > 0 {
            let Some(front) = self.lots.front_mut() else {
                return Err(ExecutorError::PortfolioError("lot table exhausted during sell".to_string()));
            };
            let taken = remaining.min(front.quantity);
            consumed.push(Lot::new(taken, front.acquired_at));
            front.quantity -= taken;
            remaining -= taken;
            if front.quantity == 0 {
                self.lots.pop_front();
            }
        }
        self.quantity -= quantity;
        Ok(consumed)
    }
}

/// Cash plus a single-instrument position.
///
/// Its sole responsibility is to accurately reflect the account after each
/// execution; every mutation is checked before it is applied, so a rejected
/// execution leaves the portfolio untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    cash: Decimal,
    position: Position,
}

impl Portfolio {
    /// Creates a new `Portfolio` with a given amount of starting capital.
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            cash: initial_capital,
            position: Position::default(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Applies an execution that filled on `bar_index`.
    ///
    /// A buy opens a new lot tagged with `bar_index`; a sell consumes settled
    /// lots oldest-first. Returns the lots a sell consumed (empty for buys).
    pub fn apply(&mut self, execution: &Execution, bar_index: usize) -> Result<Vec<Lot>, ExecutorError> {
        if execution.quantity == 0 {
            return Err(ExecutorError::InvalidQuantity(0));
        }

        let cash_delta = execution.cash_delta()?;
        let new_cash = self
            .cash
            .checked_add(cash_delta)
            .ok_or_else(|| ExecutorError::Overflow("cash balance".to_string()))?;
        if new_cash.is_sign_negative() && !new_cash.is_zero() {
            return Err(ExecutorError::InsufficientCash {
                required: (-cash_delta).to_string(),
                available: self.cash.to_string(),
            });
        }

        let consumed = match execution.side {
            OrderSide::Buy => {
                self.position.push_lot(Lot::new(execution.quantity, bar_index))?;
                Vec::new()
            }
            OrderSide::Sell => self.position.consume_fifo(execution.quantity, bar_index)?,
        };
        self.cash = new_cash;
        Ok(consumed)
    }

    /// Market value of the position at `mark`.
    pub fn position_value(&self, mark: Decimal) -> Result<Decimal, ExecutorError> {
        Decimal::from(self.position.quantity())
            .checked_mul(mark)
            .ok_or_else(|| ExecutorError::Overflow(format!("position value at {mark}")))
    }

    /// Equity = Cash + Market Value of the open position.
    pub fn total_equity(&self, mark: Decimal) -> Result<Decimal, ExecutorError> {
        self.cash
            .checked_add(self.position_value(mark)?)
            .ok_or_else(|| ExecutorError::Overflow("total equity".to_string()))
    }
}
