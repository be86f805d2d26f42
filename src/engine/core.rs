// 8.0 engine/core.rs: main engine. holds the tables, the ledger and oracle handles,
// the block context and the event log.

use super::results::EngineError;
use super::state::{PerpState, Tx, TxOutput};
use crate::config::EngineConfig;
use crate::events::{Event, EventLog, EventPayload};
use crate::ledger::Ledger;
use crate::oracle::Oracle;
use crate::position::Position;
use crate::types::{BlockContext, Timestamp};

/** 8.1: main engine struct. all perp state lives here */
pub struct Engine<L: Ledger, O: Oracle> {
    pub(super) config: EngineConfig,
    pub(super) state: PerpState,
    pub(super) ledger: L,
    pub(super) oracle: O,
    pub(super) events: EventLog,
    pub(super) block: BlockContext,
}

impl<L: Ledger, O: Oracle> Engine<L, O> {
    pub fn new(config: EngineConfig, ledger: L, oracle: O) -> Result<Self, EngineError> {
        config.validate()?;
        let events = EventLog::new(config.max_events);
        Ok(Self {
            config,
            state: PerpState::default(),
            ledger,
            oracle,
            events,
            block: BlockContext::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_block(&mut self, height: i64, time: Timestamp) {
        self.block = BlockContext::new(height, time);
    }

    // next block, `millis` later
    pub fn advance_block(&mut self, millis: i64) {
        self.block = BlockContext::new(
            self.block.height + 1,
            Timestamp::from_millis(self.block.time.as_millis() + millis),
        );
    }

    pub fn block(&self) -> BlockContext {
        self.block
    }

    pub fn state(&self) -> &PerpState {
        &self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        self.events.recent(count)
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Host side restore of a position, e.g. from an exported state.
    pub fn import_position(&mut self, position: Position) -> Result<(), EngineError> {
        position.validate()?;
        self.execute(|tx| {
            tx.market(&position.pair)?;
            tx.save_position(&position)
        })
    }

    // 8.2: run `op` on a fresh Tx and commit its writes only when it returns Ok.
    pub(super) fn execute<T, F>(&mut self, op: F) -> Result<T, EngineError>
    where
        F: for<'t> FnOnce(&mut Tx<'t>) -> Result<T, EngineError>,
    {
        let output = {
            let ledger: &dyn Ledger = &self.ledger;
            let mut tx = Tx::new(&self.state, ledger, self.block);
            let value = op(&mut tx)?;
            (value, tx.into_output())
        };
        let (value, output) = output;
        self.commit(output)?;
        Ok(value)
    }

    // 8.3: transfers first. they were checked against the same balances when planned,
    // and a batch the ledger refuses part way is moved back before the tables change.
    fn commit(&mut self, output: TxOutput) -> Result<(), EngineError> {
        let TxOutput {
            tables,
            transfers,
            events,
        } = output;

        transfers.execute(&mut self.ledger)?;

        self.state.apply(tables);

        for payload in events {
            self.emit_event(payload);
        }
        Ok(())
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        tracing::debug!(height = self.block.height, ?payload, "event");
        self.events.emit(self.block.time, self.block.height, payload);
    }
}
