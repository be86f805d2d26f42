// vamm-perps: perpetual futures settlement on a virtual AMM.
// margin, funding and liquidation math first, then the engine that commits it.
// all computation is deterministic. the ledger and oracle are injected.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Pair, TraderAddr, Direction, Timestamp, rounding
//   2.x  amm.rs: reserves, swaps, repeg and depth shift costs
//   3.x  calc.rs: notional, pnl, margin ratio, free collateral
//   4.x  position.rs: position record
//   5.x  funding.rs: funding payment, remaining margin, epoch premium
//   6.x  oracle.rs: index price collaborator
//   7.x  twap.rs: reserve snapshots and time weighted prices
//   8.x  engine/: settlement engine: positions, margin, liquidations, withdraw, admin
//   9.x  store.rs: ordered tables with pluggable codec
//   10.x ledger.rs: bank collaborator, module accounts, staged transfers
//   11.x events.rs: state transition events for audit
//   12.x market.rs: market parameters
//   13.x config.rs: engine config and market presets

// core settlement modules
pub mod amm;
pub mod calc;
pub mod engine;
pub mod funding;
pub mod market;
pub mod position;
pub mod twap;
pub mod types;

// collaborators
pub mod ledger;
pub mod oracle;
pub mod store;

// integration modules
pub mod config;
pub mod events;

// re exports for convenience
pub use amm::*;
pub use calc::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use ledger::*;
pub use market::*;
pub use oracle::*;
pub use position::*;
pub use store::*;
pub use twap::*;
pub use types::*;
