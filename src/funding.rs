// 5.0: funding. the market keeps a cumulative premium fraction (cpf). a position owes
// (market cpf - position cpf) * size since its last touch. positive = trader pays.
// 5.1 settles that payment against margin, 5.2 computes the next epoch's premium.

use crate::position::Position;
use crate::types::quantize;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FundingError {
    #[error("decimal overflow computing {0}")]
    Overflow(&'static str),
}

pub fn funding_payment(position: &Position, market_cpf: Decimal) -> Result<Decimal, FundingError> {
    market_cpf
        .checked_sub(position.latest_cumulative_premium_fraction)
        .and_then(|delta| delta.checked_mul(position.size))
        .map(quantize)
        .ok_or(FundingError::Overflow("funding payment"))
}

/// Margin left after applying `margin_delta` and settling funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingMargin {
    /// Never negative. zero when the position is underwater.
    pub margin: Decimal,
    /// Shortfall below zero, unsigned.
    pub bad_debt: Decimal,
    pub funding_payment: Decimal,
}

// 5.1: margin + delta - funding. the negative part becomes bad debt.
pub fn remaining_margin_with_funding(
    position: &Position,
    margin_delta: Decimal,
    market_cpf: Decimal,
) -> Result<RemainingMargin, FundingError> {
    let funding = funding_payment(position, market_cpf)?;
    let signed = position
        .margin
        .checked_add(margin_delta)
        .and_then(|margin| margin.checked_sub(funding))
        .ok_or(FundingError::Overflow("remaining margin"))?;

    Ok(if signed < Decimal::ZERO {
        RemainingMargin {
            margin: Decimal::ZERO,
            bad_debt: signed.abs(),
            funding_payment: funding,
        }
    } else {
        RemainingMargin {
            margin: signed,
            bad_debt: Decimal::ZERO,
            funding_payment: funding,
        }
    })
}

// 5.2: premium accrued over one epoch: (mark twap - index) scaled to the epoch's share of a day.
// a positive max_rate caps |premium| at max_rate * index.
pub fn epoch_premium_fraction(
    mark_twap: Decimal,
    index_price: Decimal,
    epoch_ms: i64,
    max_rate: Decimal,
) -> Result<Decimal, FundingError> {
    let raw = mark_twap
        .checked_sub(index_price)
        .and_then(|premium| premium.checked_mul(Decimal::from(epoch_ms)))
        .map(|scaled| quantize(scaled / Decimal::from(DAY_MS)))
        .ok_or(FundingError::Overflow("premium fraction"))?;
    if max_rate <= Decimal::ZERO {
        return Ok(raw);
    }
    let cap = max_rate
        .checked_mul(index_price)
        .map(quantize)
        .ok_or(FundingError::Overflow("funding rate cap"))?;
    Ok(raw.max(-cap).min(cap))
}

/// Funding rate implied by a premium fraction, for reporting.
pub fn funding_rate(premium_fraction: Decimal, index_price: Decimal) -> Decimal {
    if index_price.is_zero() {
        return dec!(0);
    }
    quantize(premium_fraction / index_price)
}
