// 8.0: settlement engine. every operation stages its table writes, ledger
// transfers and events on a Tx and commits them together, or not at all.
// deterministic, no I/O beyond the ledger and oracle collaborators.

mod admin;
mod core;
mod liquidations;
mod margin;
mod positions;
mod queries;
mod results;
mod state;
mod withdraw;

pub use core::Engine;
pub use results::{
    EngineError, LiquidateRequest, LiquidateResp, LiquidationResponse, MarginResp, MarketInfo,
    PositionResp, QueryPositionResp,
};
pub use state::{PerpState, PositionKey, SnapshotKey};
