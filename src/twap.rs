//! Time-weighted prices over the reserve snapshot log.
//!
//! Every operation that moves a pool appends a [`ReserveSnapshot`] at block
//! time. A TWAP walks the log backwards from `now`, weighting each snapshot's
//! price by how long it was the latest one, with the oldest segment clipped to
//! `now - lookback`.

use crate::amm::{Amm, AmmError};
use crate::types::{quantize, Direction, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TwapError {
    #[error("no reserve snapshots in the lookback window")]
    NoValidTwap,

    #[error("snapshot pricing failed: {0}")]
    Amm(#[from] AmmError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub amm: Amm,
    pub timestamp: Timestamp,
}

impl ReserveSnapshot {
    pub fn new(amm: Amm, timestamp: Timestamp) -> Self {
        Self { amm, timestamp }
    }
}

/// How each snapshot is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwapCalcOption {
    /// Mark price of the snapshot.
    Spot,
    /// Base received for `asset_amount` quote.
    QuoteAssetSwap,
    /// Quote received for `asset_amount` base.
    BaseAssetSwap,
}

// 7.1: price of one snapshot. simulated against the snapshot's reserves, nothing is mutated.
pub fn snapshot_price(
    snapshot: &ReserveSnapshot,
    option: TwapCalcOption,
    dir: Direction,
    asset_amount: Decimal,
) -> Result<Decimal, AmmError> {
    let amm = &snapshot.amm;
    match option {
        TwapCalcOption::Spot => Ok(amm.mark_price()),
        TwapCalcOption::QuoteAssetSwap => {
            let quote_reserve = amm.quote_asset_to_reserve(asset_amount)?;
            amm.get_base_reserve_amt(quote_reserve, dir)
        }
        TwapCalcOption::BaseAssetSwap => {
            let quote_reserve = amm.get_quote_reserve_amt(asset_amount, dir)?;
            amm.quote_reserve_to_asset(quote_reserve)
        }
    }
}

// 7.2: `newest_first` must yield the pair's snapshots with timestamp <= now, newest first.
// iteration stops at the first snapshot at or before the lower bound.
pub fn calc_twap<'a, I>(
    newest_first: I,
    now: Timestamp,
    lookback_ms: i64,
    option: TwapCalcOption,
    dir: Direction,
    asset_amount: Decimal,
) -> Result<Decimal, TwapError>
where
    I: IntoIterator<Item = &'a ReserveSnapshot>,
{
    let lower = now.saturating_sub_millis(lookback_ms);

    let mut window: Vec<&ReserveSnapshot> = Vec::new();
    for snapshot in newest_first {
        window.push(snapshot);
        if snapshot.timestamp <= lower {
            break;
        }
    }

    let Some(newest) = window.first() else {
        return Err(TwapError::NoValidTwap);
    };
    if window.len() == 1 {
        return Ok(snapshot_price(newest, option, dir, asset_amount)?);
    }

    let mut prev = now;
    let mut cumulative = Decimal::ZERO;
    let mut elapsed_total: i64 = 0;

    for snapshot in &window {
        let price = snapshot_price(snapshot, option, dir, asset_amount)?;
        let start = snapshot.timestamp.max(lower);
        let elapsed = prev.as_millis() - start.as_millis();

        cumulative += price * Decimal::from(elapsed);
        elapsed_total += elapsed;

        if snapshot.timestamp <= lower {
            break;
        }
        prev = snapshot.timestamp;
    }

    if elapsed_total == 0 {
        return Ok(snapshot_price(newest, option, dir, asset_amount)?);
    }

    Ok(quantize(cumulative / Decimal::from(elapsed_total)))
}
