use crate::error::BacktestError;
use core_types::{OrderSide, Trade};
use rust_decimal::Decimal;
use serde::Serialize;

/// The append-only record of every fill in a run, in execution order.
///
/// Performance analysis reads from here; nothing removes or edits a trade once
/// it has been appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TradeLedger {
    trades: Vec<Trade>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a trade. Trades must arrive in strictly increasing bar order,
    /// which also limits the ledger to one fill per bar.
    pub fn append(&mut self, trade: Trade) -> Result<(), BacktestError> {
        if let Some(last) = self.trades.last() {
            if trade.bar_index <= last.bar_index {
                return Err(BacktestError::violation(
                    trade.bar_index,
                    format!("trade out of order: previous fill was at bar {}", last.bar_index),
                ));
            }
        }
        self.trades.push(trade);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }

    pub fn as_slice(&self) -> &[Trade] {
        &self.trades
    }

    pub fn last(&self) -> Option<&Trade> {
        self.trades.last()
    }

    pub fn buy_count(&self) -> usize {
        self.count_side(OrderSide::Buy)
    }

    pub fn sell_count(&self) -> usize {
        self.count_side(OrderSide::Sell)
    }

    /// Sum of sell notionals, before costs. `None` if the total overflows.
    pub fn gross_proceeds(&self) -> Option<Decimal> {
        self.sum_side(OrderSide::Sell, Trade::notional)
    }

    /// Sum of buy notionals, before costs. `None` if the total overflows.
    pub fn gross_purchases(&self) -> Option<Decimal> {
        self.sum_side(OrderSide::Buy, Trade::notional)
    }

    pub fn total_commission(&self) -> Option<Decimal> {
        checked_sum(self.trades.iter().map(|t| Some(t.commission)))
    }

    pub fn total_stamp_duty(&self) -> Option<Decimal> {
        checked_sum(self.trades.iter().map(|t| Some(t.stamp_duty)))
    }

    /// Commission plus stamp duty across all trades.
    pub fn total_costs(&self) -> Option<Decimal> {
        checked_sum(self.trades.iter().map(Trade::costs))
    }

    fn count_side(&self, side: OrderSide) -> usize {
        self.trades.iter().filter(|t| t.side == side).count()
    }

    fn sum_side(&self, side: OrderSide, value: fn(&Trade) -> Option<Decimal>) -> Option<Decimal> {
        checked_sum(self.trades.iter().filter(|t| t.side == side).map(value))
    }
}

fn checked_sum(values: impl Iterator<Item = Option<Decimal>>) -> Option<Decimal> {
    values.fold(Some(Decimal::ZERO), |total, value| total?.checked_add(value?))
}

impl<'a> IntoIterator for &'a TradeLedger {
    type Item = &'a Trade;
    type IntoIter = std::slice::Iter<'a, Trade>;

    fn into_iter(self) -> Self::IntoIter {
        self.trades.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn trade(side: OrderSide, bar_index: usize, price: Decimal, commission: Decimal, stamp_duty: Decimal) -> Trade {
        Trade {
            side,
            bar_index,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1 + bar_index as u32, 0, 0, 0).unwrap(),
            quantity: 100,
            price,
            commission,
            stamp_duty,
            resulting_cash: Decimal::ZERO,
            resulting_position: 0,
        }
    }

    #[test]
    fn aggregates_by_side() {
        let mut ledger = TradeLedger::new();
        ledger.append(trade(OrderSide::Buy, 1, dec!(10), dec!(5), Decimal::ZERO)).unwrap();
        ledger.append(trade(OrderSide::Sell, 3, dec!(12), dec!(5), dec!(1.2))).unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.buy_count(), 1);
        assert_eq!(ledger.sell_count(), 1);
        assert_eq!(ledger.gross_purchases(), Some(dec!(1000)));
        assert_eq!(ledger.gross_proceeds(), Some(dec!(1200)));
        assert_eq!(ledger.total_commission(), Some(dec!(10)));
        assert_eq!(ledger.total_stamp_duty(), Some(dec!(1.2)));
        assert_eq!(ledger.total_costs(), Some(dec!(11.2)));
    }

    #[test]
    fn rejects_out_of_order_trades() {
        let mut ledger = TradeLedger::new();
        ledger.append(trade(OrderSide::Buy, 4, dec!(10), dec!(5), Decimal::ZERO)).unwrap();
        let err = ledger.append(trade(OrderSide::Sell, 4, dec!(10), dec!(5), dec!(1))).unwrap_err();
        assert!(matches!(err, BacktestError::InvariantViolation { bar_index: 4, .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn empty_ledger_totals_are_zero() {
        let ledger = TradeLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.total_costs(), Some(Decimal::ZERO));
        assert_eq!(ledger.gross_proceeds(), Some(Decimal::ZERO));
        assert_eq!(ledger.iter().count(), 0);
    }
}
