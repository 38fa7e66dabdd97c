use crate::RiskManager;
use crate::error::RiskError;
use configuration::{EngineConfig, SizingConfig, SizingMethod};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Lot-rounded buy sizing with three budget rules.
///
/// - `AllIn`: `deployable_fraction` of current cash.
/// - `FixedFraction`: `fraction` of the cash above the reserve.
/// - `FixedCash`: `fixed_cash`, capped at the cash above the reserve.
///
/// The reserve is `min_cash_fraction` × initial capital and only applies to the
/// last two rules.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    params: SizingConfig,
    lot_size: u64,
    deployable_fraction: Decimal,
    initial_capital: Decimal,
}

impl PositionSizer {
    /// Creates a new `PositionSizer` with the given configuration parameters.
    pub fn new(params: SizingConfig, engine: &EngineConfig) -> Result<Self, RiskError> {
        if engine.lot_size == 0 {
            return Err(RiskError::InvalidParameters("lot_size must be at least 1".to_string()));
        }
        if engine.deployable_fraction <= Decimal::ZERO || engine.deployable_fraction > Decimal::ONE {
            return Err(RiskError::InvalidParameters(
                "deployable_fraction must be within (0, 1]".to_string(),
            ));
        }
        if params.fraction <= Decimal::ZERO || params.fraction > Decimal::ONE {
            return Err(RiskError::InvalidParameters("fraction must be within (0, 1]".to_string()));
        }
        Ok(Self {
            params,
            lot_size: engine.lot_size,
            deployable_fraction: engine.deployable_fraction,
            initial_capital: engine.initial_capital,
        })
    }

    /// Rounds a share count down to a whole number of lots.
    pub fn round_to_lot(&self, quantity: u64) -> u64 {
        (quantity / self.lot_size) * self.lot_size
    }

    /// The cash this buy may spend under the configured rule. `None` on overflow.
    fn budget(&self, cash_available: Decimal) -> Option<Decimal> {
        let allocatable = || {
            let reserve = self.initial_capital.checked_mul(self.params.min_cash_fraction)?;
            Some(cash_available.checked_sub(reserve)?.max(Decimal::ZERO))
        };
        match self.params.method {
            SizingMethod::AllIn => cash_available.checked_mul(self.deployable_fraction),
            SizingMethod::FixedFraction => allocatable()?.checked_mul(self.params.fraction),
            SizingMethod::FixedCash => Some(self.params.fixed_cash.min(allocatable()?)),
        }
    }
}

impl RiskManager for PositionSizer {
    fn size_buy(&self, price: Decimal, cash_available: Decimal) -> Result<u64, RiskError> {
        if price <= Decimal::ZERO || cash_available <= Decimal::ZERO {
            return Ok(0);
        }

        let budget = self.budget(cash_available).ok_or(RiskError::QuantityOverflow {
            budget: cash_available,
            price,
        })?;
        if budget <= Decimal::ZERO {
            return Ok(0);
        }

        let shares = budget
            .checked_div(price)
            .and_then(|shares| shares.floor().to_u64())
            .ok_or(RiskError::QuantityOverflow { budget, price })?;
        let quantity = self.round_to_lot(shares);

        tracing::debug!(
            method = ?self.params.method,
            %budget,
            %price,
            shares,
            quantity,
            "sized buy order"
        );
        Ok(quantity)
    }

    fn lot_size(&self) -> u64 {
        self.lot_size
    }
}
