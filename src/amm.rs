// 2.0: virtual AMM. reserves exist only for pricing, no real liquidity sits behind them.
// constant product: base_reserve * quote_reserve = sqrt_depth^2.
// quote reserves are scaled by price_multiplier when converted to quote assets.
//
// every function here is pure over the struct. callers persist the result and
// append a reserve snapshot.

use crate::types::{ceil_int, quantize, Direction, Pair};
use rust_decimal::prelude::MathematicalOps;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmmError {
    #[error("base reserve would reach zero")]
    BaseReserveAtZero,

    #[error("quote reserve would reach zero")]
    QuoteReserveAtZero,

    #[error("base reserve must be positive, got {0}")]
    BaseReserveNonPositive(Decimal),

    #[error("quote reserve must be positive, got {0}")]
    QuoteReserveNonPositive(Decimal),

    #[error("price multiplier must be positive, got {0}")]
    NonPositivePegMultiplier(Decimal),

    #[error("swap invariant must be positive, got {0}")]
    NonPositiveSwapInvariant(Decimal),

    #[error("sqrt depth {stored} does not match reserves (computed {computed})")]
    LiquidityDepth { stored: Decimal, computed: Decimal },

    #[error("total short {0} exceeds what the base reserve can return")]
    BaseBorrowedTooHigh(Decimal),

    #[error("decimal overflow computing {0}")]
    Overflow(&'static str),
}

/** 2.1: reserves, peg and open interest of one market */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amm {
    pub pair: Pair,
    pub base_reserve: Decimal,
    pub quote_reserve: Decimal,
    pub sqrt_depth: Decimal,
    pub price_multiplier: Decimal,
    pub total_long: Decimal,
    pub total_short: Decimal,
}

impl Amm {
    /// Balanced pool: both reserves equal `sqrt_depth`, so mark price equals the multiplier.
    pub fn new(
        pair: Pair,
        sqrt_depth: Decimal,
        price_multiplier: Decimal,
    ) -> Result<Self, AmmError> {
        let amm = Self {
            pair,
            base_reserve: sqrt_depth,
            quote_reserve: sqrt_depth,
            sqrt_depth,
            price_multiplier,
            total_long: Decimal::ZERO,
            total_short: Decimal::ZERO,
        };
        amm.validate()?;
        Ok(amm)
    }

    pub fn validate(&self) -> Result<(), AmmError> {
        if self.base_reserve <= Decimal::ZERO {
            return Err(AmmError::BaseReserveNonPositive(self.base_reserve));
        }
        if self.quote_reserve <= Decimal::ZERO {
            return Err(AmmError::QuoteReserveNonPositive(self.quote_reserve));
        }
        if self.price_multiplier <= Decimal::ZERO {
            return Err(AmmError::NonPositivePegMultiplier(self.price_multiplier));
        }
        if self.sqrt_depth <= Decimal::ZERO {
            return Err(AmmError::NonPositiveSwapInvariant(self.sqrt_depth));
        }

        check_price_fits(self.quote_reserve, self.price_multiplier)?;

        let computed = self.compute_sqrt_depth()?;
        if (self.sqrt_depth - computed).abs() > Decimal::ONE {
            return Err(AmmError::LiquidityDepth {
                stored: self.sqrt_depth,
                computed,
            });
        }

        // shorts borrowed base from the pool. they must be able to buy it back.
        let mut buyback = self.clone();
        buyback
            .swap_base_asset(self.total_short, Direction::Long)
            .map_err(|_| AmmError::BaseBorrowedTooHigh(self.total_short))?;

        Ok(())
    }

    pub fn invariant(&self) -> Result<Decimal, AmmError> {
        self.base_reserve
            .checked_mul(self.quote_reserve)
            .ok_or(AmmError::Overflow("swap invariant"))
    }

    pub fn compute_sqrt_depth(&self) -> Result<Decimal, AmmError> {
        let k = self.invariant()?;
        k.sqrt().map(quantize).ok_or(AmmError::Overflow("sqrt depth"))
    }

    pub fn quote_asset_to_reserve(&self, quote_assets: Decimal) -> Result<Decimal, AmmError> {
        quote_assets
            .checked_div(self.price_multiplier)
            .map(quantize)
            .ok_or(AmmError::Overflow("quote reserve"))
    }

    pub fn quote_reserve_to_asset(&self, quote_reserve: Decimal) -> Result<Decimal, AmmError> {
        quote_reserve
            .checked_mul(self.price_multiplier)
            .map(quantize)
            .ok_or(AmmError::Overflow("quote assets"))
    }

    // 2.2: base reserve moved when `quote_reserve_amt` of quote reserve enters (Long)
    // or leaves (Short) the pool. unsigned.
    pub fn get_base_reserve_amt(
        &self,
        quote_reserve_amt: Decimal,
        dir: Direction,
    ) -> Result<Decimal, AmmError> {
        if quote_reserve_amt <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let k = self.invariant()?;
        let quote_after = match dir {
            Direction::Long => checked_add(self.quote_reserve, quote_reserve_amt, "quote reserve")?,
            Direction::Short => self.quote_reserve - quote_reserve_amt,
        };
        if quote_after <= Decimal::ZERO {
            return Err(AmmError::QuoteReserveAtZero);
        }

        let base_after = k
            .checked_div(quote_after)
            .map(quantize)
            .ok_or(AmmError::Overflow("base reserve"))?;
        Ok((base_after - self.base_reserve).abs())
    }

    // 2.3: quote reserve moved when `base_amt` of base leaves (Long) or enters (Short). unsigned.
    pub fn get_quote_reserve_amt(
        &self,
        base_amt: Decimal,
        dir: Direction,
    ) -> Result<Decimal, AmmError> {
        if base_amt <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let k = self.invariant()?;
        let base_after = match dir {
            Direction::Long => self.base_reserve - base_amt,
            Direction::Short => checked_add(self.base_reserve, base_amt, "base reserve")?,
        };
        if base_after <= Decimal::ZERO {
            return Err(AmmError::BaseReserveAtZero);
        }

        let quote_after = k
            .checked_div(base_after)
            .map(quantize)
            .ok_or(AmmError::Overflow("quote reserve"))?;
        Ok((quote_after - self.quote_reserve).abs())
    }

    /// Instantaneous price: quote_reserve * multiplier / base_reserve. Zero for an empty pool.
    /// Swaps and `validate` keep the product representable.
    pub fn mark_price(&self) -> Decimal {
        if self.base_reserve.is_zero() || self.quote_reserve.is_zero() {
            return Decimal::ZERO;
        }
        self.quote_reserve
            .checked_mul(self.price_multiplier)
            .and_then(|quote| quote.checked_div(self.base_reserve))
            .map(quantize)
            .unwrap_or(Decimal::MAX)
    }

    /// Net open interest skew: total long minus total short, in base units.
    pub fn bias(&self) -> Decimal {
        self.total_long - self.total_short
    }

    // 2.4: trade `quote_amt` quote assets. returns the base amount exchanged (unsigned).
    // reserves are untouched when the swap fails.
    pub fn swap_quote_asset(
        &mut self,
        quote_amt: Decimal,
        dir: Direction,
    ) -> Result<Decimal, AmmError> {
        let quote_reserve_delta = self.quote_asset_to_reserve(quote_amt)?;
        let base_delta = self.get_base_reserve_amt(quote_reserve_delta, dir)?;
        if base_delta.is_zero() {
            return Ok(Decimal::ZERO);
        }

        match dir {
            Direction::Long => {
                let total_long = checked_add(self.total_long, base_delta, "total long")?;
                check_price_fits(self.quote_reserve + quote_reserve_delta, self.price_multiplier)?;
                self.quote_reserve += quote_reserve_delta;
                self.base_reserve -= base_delta;
                self.total_long = total_long;
            }
            Direction::Short => {
                let total_short = checked_add(self.total_short, base_delta, "total short")?;
                self.quote_reserve -= quote_reserve_delta;
                self.base_reserve += base_delta;
                self.total_short = total_short;
            }
        }

        Ok(base_delta)
    }

    // 2.5: trade `base_amt` base. returns the quote assets exchanged (unsigned).
    pub fn swap_base_asset(
        &mut self,
        base_amt: Decimal,
        dir: Direction,
    ) -> Result<Decimal, AmmError> {
        let quote_reserve_delta = self.get_quote_reserve_amt(base_amt, dir)?;
        if quote_reserve_delta.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let quote_assets = self.quote_reserve_to_asset(quote_reserve_delta)?;
        match dir {
            Direction::Long => {
                let total_long = checked_add(self.total_long, base_amt, "total long")?;
                check_price_fits(self.quote_reserve + quote_reserve_delta, self.price_multiplier)?;
                self.quote_reserve += quote_reserve_delta;
                self.base_reserve -= base_amt;
                self.total_long = total_long;
            }
            Direction::Short => {
                let total_short = checked_add(self.total_short, base_amt, "total short")?;
                self.quote_reserve -= quote_reserve_delta;
                self.base_reserve += base_amt;
                self.total_short = total_short;
            }
        }

        Ok(quote_assets)
    }

    // 2.6: quote assets the pool owes traders if every position closed at once.
    // positive when longs dominate.
    pub fn market_value(&self) -> Result<Decimal, AmmError> {
        let bias = self.bias();
        if bias.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let value_in_reserves = self.get_quote_reserve_amt(bias.abs(), Direction::closing(bias))?;
        let signed = if bias < Decimal::ZERO {
            -value_in_reserves
        } else {
            value_in_reserves
        };
        self.quote_reserve_to_asset(signed)
    }

    /// Whole quote units the ecosystem fund must pay the vault to move the peg.
    /// Negative when the repeg releases funds.
    pub fn repeg_cost(&self, new_multiplier: Decimal) -> Result<Decimal, AmmError> {
        if new_multiplier <= Decimal::ZERO {
            return Err(AmmError::NonPositivePegMultiplier(new_multiplier));
        }

        let bias = self.bias();
        if bias.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let bias_in_quote_reserve =
            self.get_quote_reserve_amt(bias.abs(), Direction::closing(bias))?;
        let mut cost = bias_in_quote_reserve
            .checked_mul(new_multiplier - self.price_multiplier)
            .map(quantize)
            .ok_or(AmmError::Overflow("repeg cost"))?;
        if bias < Decimal::ZERO {
            cost = -cost;
        }
        Ok(ceil_int(cost))
    }

    // 2.7: rescale both reserves by the same factor. price is unchanged, depth is not.
    pub fn update_swap_invariant(&mut self, new_invariant: Decimal) -> Result<(), AmmError> {
        if new_invariant <= Decimal::ZERO {
            return Err(AmmError::NonPositiveSwapInvariant(new_invariant));
        }

        let new_sqrt_depth = new_invariant
            .sqrt()
            .map(quantize)
            .ok_or(AmmError::Overflow("new sqrt depth"))?;
        let factor = quantize(new_sqrt_depth / self.sqrt_depth);
        let scale = |reserve: Decimal| {
            reserve
                .checked_mul(factor)
                .map(quantize)
                .ok_or(AmmError::Overflow("rescaled reserve"))
        };

        let updated = Amm {
            base_reserve: scale(self.base_reserve)?,
            quote_reserve: scale(self.quote_reserve)?,
            sqrt_depth: new_sqrt_depth,
            ..self.clone()
        };
        updated.validate()?;

        *self = updated;
        Ok(())
    }

    pub fn swap_invariant_cost(&self, new_invariant: Decimal) -> Result<Decimal, AmmError> {
        let before = self.market_value()?;
        let mut rescaled = self.clone();
        rescaled.update_swap_invariant(new_invariant)?;
        let after = rescaled.market_value()?;
        Ok(ceil_int(after - before))
    }
}

fn checked_add(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, AmmError> {
    a.checked_add(b).ok_or(AmmError::Overflow(what))
}

fn check_price_fits(quote_reserve: Decimal, multiplier: Decimal) -> Result<(), AmmError> {
    quote_reserve
        .checked_mul(multiplier)
        .map(|_| ())
        .ok_or(AmmError::Overflow("mark price"))
}
