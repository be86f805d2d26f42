//! Read-only views over committed state.

use super::core::Engine;
use super::results::{EngineError, MarketInfo, QueryPositionResp};
use super::state::Tx;
use crate::amm::Amm;
use crate::calc::{margin_ratio, position_notional_spot, unrealized_pnl};
use crate::ledger::Ledger;
use crate::oracle::Oracle;
use crate::position::Position;
use crate::store::Order;
use crate::twap::TwapCalcOption;
use crate::types::{Direction, Pair, TraderAddr};
use rust_decimal::Decimal;

impl<L: Ledger, O: Oracle> Engine<L, O> {
    /// Position valued at spot, with its unrealized pnl and margin ratio.
    pub fn query_position(
        &self,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<QueryPositionResp, EngineError> {
        let market = self
            .state
            .market(pair)?
            .ok_or_else(|| EngineError::PairNotFound(pair.clone()))?;
        let amm = self
            .state
            .amm(pair)?
            .ok_or_else(|| EngineError::PairNotFound(pair.clone()))?;
        let position = self
            .state
            .position(pair, trader)?
            .ok_or_else(|| EngineError::PositionNotFound {
                pair: pair.clone(),
                trader: trader.clone(),
            })?;
        value_position(position, &amm, market.latest_cumulative_premium_fraction)
    }

    /// Every position the trader holds, across all markets.
    pub fn query_positions(
        &self,
        trader: &TraderAddr,
    ) -> Result<Vec<QueryPositionResp>, EngineError> {
        let mut out = Vec::new();
        for ((pair, owner), position) in self.state.positions.iter(Order::Ascending)? {
            if &owner != trader {
                continue;
            }
            // a stored position always has a market
            let (Some(market), Some(amm)) = (self.state.market(&pair)?, self.state.amm(&pair)?)
            else {
                tracing::error!(%pair, %trader, "position without market");
                return Err(EngineError::MarketCorrupted { pair, trader: owner });
            };
            out.push(value_position(position, &amm, market.latest_cumulative_premium_fraction)?);
        }
        Ok(out)
    }

    pub fn query_markets(&self) -> Result<Vec<MarketInfo>, EngineError> {
        let mut out = Vec::new();
        for (pair, market) in self.state.markets.iter(Order::Ascending)? {
            let amm = self
                .state
                .amm(&pair)?
                .ok_or_else(|| EngineError::PairNotFound(pair.clone()))?;
            let index_price = self.oracle.get_index_price(&pair).ok();
            out.push(MarketInfo {
                mark_price: amm.mark_price(),
                market,
                amm,
                index_price,
            });
        }
        Ok(out)
    }

    /// Mark price averaged over `lookback_ms` of committed snapshots.
    pub fn mark_price_twap(&self, pair: &Pair, lookback_ms: i64) -> Result<Decimal, EngineError> {
        if !self.state.markets.contains(pair) {
            return Err(EngineError::PairNotFound(pair.clone()));
        }
        let tx = Tx::new(&self.state, &self.ledger, self.block);
        tx.twap(pair, TwapCalcOption::Spot, Direction::Long, Decimal::ZERO, lookback_ms)
    }

    /// Quote the position would return on close, averaged over `lookback_ms`.
    pub fn position_notional_twap(
        &self,
        pair: &Pair,
        trader: &TraderAddr,
        lookback_ms: i64,
    ) -> Result<Decimal, EngineError> {
        let tx = Tx::new(&self.state, &self.ledger, self.block);
        let position = tx.position(pair, trader)?;
        tx.position_notional_twap(&position, lookback_ms)
    }

    pub fn index_price(&self, pair: &Pair) -> Result<Decimal, EngineError> {
        Ok(self.oracle.get_index_price(pair)?)
    }

    /// Number of reserve snapshots kept for the pair.
    pub fn snapshot_count(&self, pair: &Pair) -> Result<usize, EngineError> {
        Ok(self.state.snapshots.prefix(pair, Order::Ascending)?.len())
    }
}

fn value_position(
    position: Position,
    amm: &Amm,
    cpf: Decimal,
) -> Result<QueryPositionResp, EngineError> {
    let position_notional = position_notional_spot(amm, &position)?;
    Ok(QueryPositionResp {
        unrealized_pnl: unrealized_pnl(&position, position_notional),
        margin_ratio: margin_ratio(&position, position_notional, cpf)?,
        position_notional,
        position,
    })
}
