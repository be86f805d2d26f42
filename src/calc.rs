// 3.0: notional, pnl and margin ratio. notional is what closing the whole position
// would return right now, priced by simulating the counter swap on a copy of the pool.

use crate::amm::{Amm, AmmError};
use crate::funding::{funding_payment, FundingError};
use crate::position::Position;
use crate::types::{quantize, Direction};
use rust_decimal::Decimal;

// 3.1: quote value of |size| base sold (long) or bought back (short) against the pool
pub fn position_notional_spot(amm: &Amm, position: &Position) -> Result<Decimal, AmmError> {
    if position.size.is_zero() {
        return Ok(Decimal::ZERO);
    }

    let dir = Direction::closing(position.size);
    let quote_reserve = amm.get_quote_reserve_amt(position.size.abs(), dir)?;
    amm.quote_reserve_to_asset(quote_reserve)
}

// long: notional - open notional. short: open notional - notional.
pub fn unrealized_pnl(position: &Position, notional: Decimal) -> Decimal {
    if position.size > Decimal::ZERO {
        notional - position.open_notional
    } else if position.size < Decimal::ZERO {
        position.open_notional - notional
    } else {
        Decimal::ZERO
    }
}

// 3.2: (margin + pnl - funding) / notional. zero for empty positions or zero notional.
pub fn margin_ratio(
    position: &Position,
    notional: Decimal,
    market_cpf: Decimal,
) -> Result<Decimal, FundingError> {
    if position.size.is_zero() || notional.is_zero() {
        return Ok(Decimal::ZERO);
    }

    let pnl = unrealized_pnl(position, notional);
    let funding = funding_payment(position, market_cpf)?;
    position
        .margin
        .checked_add(pnl)
        .and_then(|equity| equity.checked_sub(funding))
        .and_then(|equity| equity.checked_div(notional))
        .map(quantize)
        .ok_or(FundingError::Overflow("margin ratio"))
}

// notional used for health checks, the one more favourable to the trader:
// longs are valued at the higher quote, shorts at the lower one.
pub fn preferred_notional(position: &Position, spot: Decimal, twap: Decimal) -> Decimal {
    if position.size > Decimal::ZERO {
        spot.max(twap)
    } else {
        spot.min(twap)
    }
}

/// Margin that can leave the position: the worse of spot and TWAP pnl is
/// counted, then maintenance on open notional is held back.
pub fn free_collateral(
    position: &Position,
    spot_notional: Decimal,
    twap_notional: Decimal,
    mmr: Decimal,
) -> Decimal {
    let spot_pnl = unrealized_pnl(position, spot_notional);
    let twap_pnl = unrealized_pnl(position, twap_notional);
    let worst_pnl = spot_pnl.min(twap_pnl);

    let collateral = position.margin.min(position.margin + worst_pnl);
    let maintenance = quantize(position.open_notional * mmr);
    collateral - maintenance
}
