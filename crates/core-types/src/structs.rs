use crate::enums::OrderSide;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV price bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    /// Builds a bar and checks its price invariants.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, CoreError> {
        let bar = Self { timestamp, open, high, low, close, volume };
        bar.validate()?;
        Ok(bar)
    }

    /// Checks that prices are non-negative and that high/low bracket open and close.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: String| CoreError::InvalidBar {
            timestamp: self.timestamp.to_rfc3339(),
            reason,
        };

        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(invalid(format!("{name} is negative ({value})")));
            }
        }

        if self.high < self.open.max(self.close) {
            return Err(invalid(format!(
                "high {} is below max(open, close) {}",
                self.high,
                self.open.max(self.close)
            )));
        }
        if self.low > self.open.min(self.close) {
            return Err(invalid(format!(
                "low {} is above min(open, close) {}",
                self.low,
                self.open.min(self.close)
            )));
        }

        Ok(())
    }
}

/// A tranche of shares bought on one bar.
///
/// Lots exist for settlement: a lot acquired on bar `i` becomes sellable
/// from bar `i + 1` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub quantity: u64,
    pub acquired_at: usize,
}

impl Lot {
    pub fn new(quantity: u64, acquired_at: usize) -> Self {
        Self { quantity, acquired_at }
    }

    /// Whether this lot has settled by `bar_index` (T+1).
    pub fn is_sellable_at(&self, bar_index: usize) -> bool {
        bar_index > self.acquired_at
    }
}

/// An executed fill, as recorded in the trade ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: OrderSide,
    /// Index of the bar whose open this trade filled at.
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub quantity: u64,
    pub price: Decimal,
    pub commission: Decimal,
    pub stamp_duty: Decimal,
    pub resulting_cash: Decimal,
    pub resulting_position: u64,
}

impl Trade {
    /// quantity × price, before costs. `None` if it does not fit in a `Decimal`.
    pub fn notional(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.price)
    }

    /// Commission plus stamp duty.
    pub fn costs(&self) -> Option<Decimal> {
        self.commission.checked_add(self.stamp_duty)
    }

    /// The signed change this trade applied to cash.
    pub fn cash_delta(&self) -> Option<Decimal> {
        signed_cash_delta(self.side, self.notional()?, self.costs()?)
    }
}

/// Negative notional plus costs for buys; notional minus costs for sells.
pub fn signed_cash_delta(side: OrderSide, notional: Decimal, costs: Decimal) -> Option<Decimal> {
    match side {
        OrderSide::Buy => notional.checked_add(costs).map(|total| -total),
        OrderSide::Sell => notional.checked_sub(costs),
    }
}

/// Portfolio valuation at the close of one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub cash: Decimal,
    pub position_value: Decimal,
    pub total_equity: Decimal,
}

impl EquityPoint {
    /// `None` if cash plus position value overflows.
    pub fn new(timestamp: DateTime<Utc>, cash: Decimal, position_value: Decimal) -> Option<Self> {
        Some(Self {
            timestamp,
            cash,
            position_value,
            total_equity: cash.checked_add(position_value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn accepts_well_formed_bar() {
        let bar = Bar::new(ts(), dec!(10), dec!(11), dec!(9.5), dec!(10.5), dec!(1000));
        assert!(bar.is_ok());
    }

    #[test]
    fn rejects_high_below_close() {
        let err = Bar::new(ts(), dec!(10), dec!(10.2), dec!(9.5), dec!(10.5), dec!(1000)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidBar { .. }));
    }

    #[test]
    fn rejects_low_above_open() {
        assert!(Bar::new(ts(), dec!(10), dec!(11), dec!(10.1), dec!(10.5), dec!(0)).is_err());
    }

    #[test]
    fn rejects_negative_price() {
        assert!(Bar::new(ts(), dec!(-1), dec!(11), dec!(-2), dec!(10.5), dec!(0)).is_err());
    }

    #[test]
    fn lot_settles_on_the_next_bar() {
        let lot = Lot::new(100, 3);
        assert!(!lot.is_sellable_at(2));
        assert!(!lot.is_sellable_at(3));
        assert!(lot.is_sellable_at(4));
    }

    #[test]
    fn trade_cash_delta_is_signed_by_side() {
        let buy = Trade {
            side: OrderSide::Buy,
            bar_index: 1,
            timestamp: ts(),
            quantity: 100,
            price: dec!(10),
            commission: dec!(5),
            stamp_duty: dec!(0),
            resulting_cash: dec!(8995),
            resulting_position: 100,
        };
        assert_eq!(buy.cash_delta(), Some(dec!(-1005)));

        let sell = Trade {
            side: OrderSide::Sell,
            price: dec!(12),
            stamp_duty: dec!(1.2),
            ..buy
        };
        assert_eq!(sell.cash_delta(), Some(dec!(1193.8)));
    }

    #[test]
    fn equity_point_sums_components() {
        let point = EquityPoint::new(ts(), dec!(500), dec!(1020)).unwrap();
        assert_eq!(point.total_equity, dec!(1520));
    }

    #[test]
    fn notional_beyond_decimal_range_is_none() {
        let trade = Trade {
            side: OrderSide::Buy,
            bar_index: 1,
            timestamp: ts(),
            quantity: 10_000,
            price: Decimal::from_i128_with_scale(10_i128.pow(25), 0),
            commission: dec!(5),
            stamp_duty: dec!(0),
            resulting_cash: dec!(0),
            resulting_position: 10_000,
        };
        assert_eq!(trade.notional(), None);
        assert_eq!(trade.cash_delta(), None);
        assert!(EquityPoint::new(ts(), Decimal::MAX, dec!(1)).is_none());
    }
}
