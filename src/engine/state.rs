// 8.0.1 engine/state.rs: the four persisted tables and the per operation overlay.
// every operation runs against a Tx. nothing reaches the tables or the ledger
// until the operation returned Ok and the engine commits the Tx's writes.

use super::results::EngineError;
use crate::amm::Amm;
use crate::events::EventPayload;
use crate::ledger::{Ledger, PendingTransfers, Transfer};
use crate::market::Market;
use crate::position::Position;
use crate::store::{Order, PrefixKey, Staged, Table};
use crate::twap::{calc_twap, ReserveSnapshot, TwapCalcOption};
use crate::types::{BlockContext, Direction, Pair, Timestamp, TraderAddr};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::ops::Bound;

pub type PositionKey = (Pair, TraderAddr);
pub type SnapshotKey = (Pair, Timestamp);

impl PrefixKey for (Pair, TraderAddr) {
    type Prefix = Pair;

    fn prefix(&self) -> &Pair {
        &self.0
    }

    fn prefix_start(prefix: &Pair) -> Self {
        (prefix.clone(), TraderAddr::new(""))
    }
}

impl PrefixKey for (Pair, Timestamp) {
    type Prefix = Pair;

    fn prefix(&self) -> &Pair {
        &self.0
    }

    fn prefix_start(prefix: &Pair) -> Self {
        (prefix.clone(), Timestamp::MIN)
    }
}

/** 8.0.1: committed state. one table per record kind */
#[derive(Debug, Clone, Default)]
pub struct PerpState {
    pub(super) markets: Table<Pair, Market>,
    pub(super) amms: Table<Pair, Amm>,
    pub(super) positions: Table<PositionKey, Position>,
    pub(super) snapshots: Table<SnapshotKey, ReserveSnapshot>,
}

impl PerpState {
    pub fn market(&self, pair: &Pair) -> Result<Option<Market>, EngineError> {
        Ok(self.markets.get(pair)?)
    }

    pub fn amm(&self, pair: &Pair) -> Result<Option<Amm>, EngineError> {
        Ok(self.amms.get(pair)?)
    }

    pub fn position(
        &self,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<Option<Position>, EngineError> {
        Ok(self.positions.get(&(pair.clone(), trader.clone()))?)
    }

    /// Reserve snapshots of one pair, oldest first.
    pub fn snapshots(&self, pair: &Pair) -> Result<Vec<ReserveSnapshot>, EngineError> {
        let log = self.snapshots.prefix(pair, Order::Ascending)?;
        Ok(log.into_iter().map(|(_, snapshot)| snapshot).collect())
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub(super) fn apply(&mut self, writes: TableWrites) {
        self.markets.apply(writes.markets);
        self.amms.apply(writes.amms);
        self.positions.apply(writes.positions);
        self.snapshots.apply(writes.snapshots);
    }
}

pub(super) struct TableWrites {
    pub markets: BTreeMap<Pair, Option<Vec<u8>>>,
    pub amms: BTreeMap<Pair, Option<Vec<u8>>>,
    pub positions: BTreeMap<PositionKey, Option<Vec<u8>>>,
    pub snapshots: BTreeMap<SnapshotKey, Option<Vec<u8>>>,
}

/// Everything a successful operation hands back for commit.
pub(super) struct TxOutput {
    pub tables: TableWrites,
    pub transfers: PendingTransfers,
    pub events: Vec<EventPayload>,
}

/// One operation's view: staged table writes, planned transfers, pending events.
/// Cloning forks the view, which is how a batch isolates each request.
#[derive(Clone)]
pub(super) struct Tx<'a> {
    pub(super) markets: Staged<'a, Pair, Market>,
    pub(super) amms: Staged<'a, Pair, Amm>,
    pub(super) positions: Staged<'a, PositionKey, Position>,
    pub(super) snapshots: Staged<'a, SnapshotKey, ReserveSnapshot>,
    pub(super) transfers: PendingTransfers,
    pub(super) events: Vec<EventPayload>,
    pub(super) ledger: &'a dyn Ledger,
    pub(super) ctx: BlockContext,
}

impl<'a> Tx<'a> {
    pub(super) fn new(state: &'a PerpState, ledger: &'a dyn Ledger, ctx: BlockContext) -> Self {
        Self {
            markets: Staged::new(&state.markets),
            amms: Staged::new(&state.amms),
            positions: Staged::new(&state.positions),
            snapshots: Staged::new(&state.snapshots),
            transfers: PendingTransfers::new(),
            events: Vec::new(),
            ledger,
            ctx,
        }
    }

    pub(super) fn into_output(self) -> TxOutput {
        TxOutput {
            tables: TableWrites {
                markets: self.markets.into_writes(),
                amms: self.amms.into_writes(),
                positions: self.positions.into_writes(),
                snapshots: self.snapshots.into_writes(),
            },
            transfers: self.transfers,
            events: self.events,
        }
    }

    pub(super) fn market(&self, pair: &Pair) -> Result<Market, EngineError> {
        self.markets
            .get(pair)?
            .ok_or_else(|| EngineError::PairNotFound(pair.clone()))
    }

    pub(super) fn amm(&self, pair: &Pair) -> Result<Amm, EngineError> {
        self.amms.get(pair)?.ok_or_else(|| EngineError::PairNotFound(pair.clone()))
    }

    pub(super) fn find_position(
        &self,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<Option<Position>, EngineError> {
        Ok(self.positions.get(&(pair.clone(), trader.clone()))?)
    }

    pub(super) fn position(
        &self,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<Position, EngineError> {
        self.find_position(pair, trader)?
            .ok_or_else(|| EngineError::PositionNotFound {
                pair: pair.clone(),
                trader: trader.clone(),
            })
    }

    pub(super) fn save_market(&mut self, market: &Market) -> Result<(), EngineError> {
        self.markets.insert(market.pair.clone(), market)?;
        Ok(())
    }

    // every pool write is logged. a second write in the same block replaces the first snapshot.
    pub(super) fn save_amm(&mut self, amm: &Amm) -> Result<(), EngineError> {
        self.amms.insert(amm.pair.clone(), amm)?;
        let snapshot = ReserveSnapshot::new(amm.clone(), self.ctx.time);
        self.snapshots.insert((amm.pair.clone(), self.ctx.time), &snapshot)?;
        Ok(())
    }

    pub(super) fn save_position(&mut self, position: &Position) -> Result<(), EngineError> {
        let key = (position.pair.clone(), position.trader.clone());
        if position.is_empty() {
            self.positions.remove(&key);
        } else {
            self.positions.insert(key, position)?;
        }
        Ok(())
    }

    pub(super) fn delete_position(&mut self, pair: &Pair, trader: &TraderAddr) {
        self.positions.remove(&(pair.clone(), trader.clone()));
    }

    /// Latest snapshot committed before this operation started.
    pub(super) fn committed_snapshot(
        &self,
        pair: &Pair,
    ) -> Result<Option<ReserveSnapshot>, EngineError> {
        let log = self.snapshots.base().range(
            Bound::Included((pair.clone(), Timestamp::MIN)),
            Bound::Included((pair.clone(), self.ctx.time)),
            Order::Descending,
        )?;
        Ok(log.into_iter().next().map(|(_, snapshot)| snapshot))
    }

    pub(super) fn twap(
        &self,
        pair: &Pair,
        option: TwapCalcOption,
        dir: Direction,
        asset_amount: Decimal,
        lookback_ms: i64,
    ) -> Result<Decimal, EngineError> {
        let log = self.snapshots.range(
            Bound::Included((pair.clone(), Timestamp::MIN)),
            Bound::Included((pair.clone(), self.ctx.time)),
            Order::Descending,
        )?;
        let twap = calc_twap(
            log.iter().map(|(_, snapshot)| snapshot),
            self.ctx.time,
            lookback_ms,
            option,
            dir,
            asset_amount,
        )?;
        Ok(twap)
    }

    // 3.3: quote value of closing the position, averaged over the lookback window
    pub(super) fn position_notional_twap(
        &self,
        position: &Position,
        lookback_ms: i64,
    ) -> Result<Decimal, EngineError> {
        if position.is_empty() {
            return Ok(Decimal::ZERO);
        }
        self.twap(
            &position.pair,
            TwapCalcOption::BaseAssetSwap,
            Direction::closing(position.size),
            position.size.abs(),
            lookback_ms,
        )
    }

    pub(super) fn transfer(&mut self, transfer: Transfer) -> Result<(), EngineError> {
        self.transfers.push(self.ledger, transfer)?;
        Ok(())
    }

    /// Ledger balance including the transfers this operation already planned.
    pub(super) fn balance(&self, account: &str, denom: &str) -> Decimal {
        self.transfers.balance(self.ledger, account, denom)
    }

    pub(super) fn emit(&mut self, payload: EventPayload) {
        self.events.push(payload);
    }
}
