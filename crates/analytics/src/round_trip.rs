use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use core_types::{OrderSide, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One sell paired with the buy lots it consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    /// Bar of the oldest lot this sell consumed.
    pub entry_bar_index: usize,
    pub entry_time: DateTime<Utc>,
    pub exit_bar_index: usize,
    pub exit_time: DateTime<Utc>,
    pub quantity: u64,
    /// Purchase cost of the consumed shares, buy commission included.
    pub cost: Decimal,
    /// Sale notional net of commission and stamp duty.
    pub proceeds: Decimal,
    pub pnl: Decimal,
}

impl RoundTrip {
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn return_pct(&self) -> Option<Decimal> {
        self.pnl.checked_div(self.cost)
    }

    pub fn holding_bars(&self) -> usize {
        self.exit_bar_index - self.entry_bar_index
    }
}

/// A bought tranche with its cost still to be matched.
struct OpenLot {
    bar_index: usize,
    time: DateTime<Utc>,
    quantity: u64,
    cost: Decimal,
}

/// Replays the ledger and pairs every sell with the buy lots it consumed,
/// oldest first. Buy costs are split pro rata when a lot is partially sold.
pub fn round_trips(trades: &[Trade]) -> Result<Vec<RoundTrip>, AnalyticsError> {
    let mut open: VecDeque<OpenLot> = VecDeque::new();
    let mut completed = Vec::new();

    for trade in trades {
        match trade.side {
            OrderSide::Buy => open.push_back(OpenLot {
                bar_index: trade.bar_index,
                time: trade.timestamp,
                quantity: trade.quantity,
                cost: trade.cash_delta().map(|delta| -delta).ok_or_else(|| overflow(trade))?,
            }),
            OrderSide::Sell => completed.push(close_lots(&mut open, trade)?),
        }
    }

    Ok(completed)
}

fn overflow(trade: &Trade) -> AnalyticsError {
    AnalyticsError::Calculation(format!("trade value at bar {} overflows", trade.bar_index))
}

fn close_lots(open: &mut VecDeque<OpenLot>, sell: &Trade) -> Result<RoundTrip, AnalyticsError> {
    let inconsistent = |reason: String| AnalyticsError::InconsistentLedger {
        bar_index: sell.bar_index,
        reason,
    };

    let Some(first) = open.front() else {
        return Err(inconsistent("sell with no open position".to_string()));
    };
    let (entry_bar_index, entry_time) = (first.bar_index, first.time);

    let mut remaining = sell.quantity;
    let mut cost = Decimal::ZERO;
    while remaining > 0 {
        let Some(lot) = open.front_mut() else {
            return Err(inconsistent(format!(
                "sell of {} exceeds open quantity by {remaining}",
                sell.quantity
            )));
        };
        let share = if lot.quantity <= remaining {
            remaining -= lot.quantity;
            let share = lot.cost;
            open.pop_front();
            share
        } else {
            let share = lot
                .cost
                .checked_mul(Decimal::from(remaining))
                .ok_or_else(|| overflow(sell))?
                / Decimal::from(lot.quantity);
            lot.cost -= share;
            lot.quantity -= remaining;
            remaining = 0;
            share
        };
        cost = cost.checked_add(share).ok_or_else(|| overflow(sell))?;
    }

    let proceeds = sell.cash_delta().ok_or_else(|| overflow(sell))?;
    Ok(RoundTrip {
        entry_bar_index,
        entry_time,
        exit_bar_index: sell.bar_index,
        exit_time: sell.timestamp,
        quantity: sell.quantity,
        cost,
        proceeds,
        pnl: proceeds.checked_sub(cost).ok_or_else(|| overflow(sell))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn trade(side: OrderSide, bar_index: usize, quantity: u64, price: Decimal, commission: Decimal, stamp_duty: Decimal) -> Trade {
        Trade {
            side,
            bar_index,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(bar_index as i64),
            quantity,
            price,
            commission,
            stamp_duty,
            resulting_cash: Decimal::ZERO,
            resulting_position: 0,
        }
    }

    #[test]
    fn partial_sell_splits_lot_cost() {
        let trades = vec![
            trade(OrderSide::Buy, 1, 100, dec!(10), dec!(5), Decimal::ZERO),
            trade(OrderSide::Buy, 3, 100, dec!(11), dec!(5), Decimal::ZERO),
            trade(OrderSide::Sell, 5, 150, dec!(12), dec!(5), dec!(1.8)),
            trade(OrderSide::Sell, 7, 50, dec!(9), dec!(5), dec!(0.45)),
        ];
        let trips = round_trips(&trades).unwrap();

        assert_eq!(trips.len(), 2);
        // 1005 + half of 1105
        assert_eq!(trips[0].cost, dec!(1557.5));
        assert_eq!(trips[0].proceeds, dec!(1793.2));
        assert_eq!(trips[0].pnl, dec!(235.7));
        assert_eq!(trips[0].entry_bar_index, 1);
        assert_eq!(trips[0].holding_bars(), 4);
        assert!(trips[0].is_win());

        assert_eq!(trips[1].cost, dec!(552.5));
        assert_eq!(trips[1].pnl, dec!(-107.95));
        assert_eq!(trips[1].entry_bar_index, 3);
        assert!(!trips[1].is_win());
    }

    #[test]
    fn open_buys_are_not_round_trips() {
        let trades = vec![trade(OrderSide::Buy, 1, 100, dec!(10), dec!(5), Decimal::ZERO)];
        assert!(round_trips(&trades).unwrap().is_empty());
    }

    #[test]
    fn sell_without_buy_is_rejected() {
        let trades = vec![trade(OrderSide::Sell, 2, 100, dec!(10), dec!(5), dec!(1))];
        let err = round_trips(&trades).unwrap_err();
        assert!(matches!(err, AnalyticsError::InconsistentLedger { bar_index: 2, .. }));
    }

    #[test]
    fn unrepresentable_trade_value_is_a_calculation_error() {
        let huge = Decimal::from_i128_with_scale(10_i128.pow(25), 0);
        let trades = vec![trade(OrderSide::Buy, 1, 10_000, huge, dec!(5), Decimal::ZERO)];
        assert!(matches!(round_trips(&trades), Err(AnalyticsError::Calculation(_))));
    }

    #[test]
    fn oversell_is_rejected() {
        let trades = vec![
            trade(OrderSide::Buy, 1, 100, dec!(10), dec!(5), Decimal::ZERO),
            trade(OrderSide::Sell, 2, 200, dec!(10), dec!(5), dec!(2)),
        ];
        assert!(round_trips(&trades).is_err());
    }
}
