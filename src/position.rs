// 4.0: trader position in one market. size is signed: positive = long, negative = short.
// a position with zero size is never stored; full closes and full liquidations delete it.

use crate::types::{Pair, TraderAddr};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("position margin must be non-negative, got {0}")]
    NegativeMargin(Decimal),

    #[error("position open notional must be non-negative, got {0}")]
    NegativeOpenNotional(Decimal),

    #[error("position size must be non-zero")]
    ZeroSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub trader: TraderAddr,
    pub pair: Pair,
    pub size: Decimal,
    pub margin: Decimal,
    /// Quote value at which the current size was opened.
    pub open_notional: Decimal,
    /// Market funding accumulator at the last settlement.
    pub latest_cumulative_premium_fraction: Decimal,
    pub last_updated_block_number: i64,
}

impl Position {
    pub fn new(
        trader: TraderAddr,
        pair: Pair,
        size: Decimal,
        margin: Decimal,
        open_notional: Decimal,
        cpf: Decimal,
        block: i64,
    ) -> Self {
        Self {
            trader,
            pair,
            size,
            margin,
            open_notional,
            latest_cumulative_premium_fraction: cpf,
            last_updated_block_number: block,
        }
    }

    // 4.1: starting point for a trader with no position in the market
    pub fn zero(trader: TraderAddr, pair: Pair, cpf: Decimal, block: i64) -> Self {
        Self::new(trader, pair, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, cpf, block)
    }

    pub fn is_long(&self) -> bool {
        self.size > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.size < Decimal::ZERO
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    pub fn validate(&self) -> Result<(), PositionError> {
        if self.size.is_zero() {
            return Err(PositionError::ZeroSize);
        }
        if self.margin < Decimal::ZERO {
            return Err(PositionError::NegativeMargin(self.margin));
        }
        if self.open_notional < Decimal::ZERO {
            return Err(PositionError::NegativeOpenNotional(self.open_notional));
        }
        Ok(())
    }
}
