// 8.0.2: result types and errors for engine operations.

use crate::amm::{Amm, AmmError};
use crate::config::ConfigError;
use crate::funding::FundingError;
use crate::ledger::LedgerError;
use crate::market::{Market, MarketError};
use crate::oracle::OracleError;
use crate::position::{Position, PositionError};
use crate::store::StoreError;
use crate::twap::TwapError;
use crate::types::{Pair, TraderAddr};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of one position change, before fees and vault transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResp {
    /// Position after the change. zero size once fully closed.
    pub position: Position,
    /// Quote moved through the pool, unsigned.
    pub exchanged_notional: Decimal,
    /// Signed base moved into the position.
    pub exchanged_size: Decimal,
    pub bad_debt: Decimal,
    pub funding_payment: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl_after: Decimal,
    /// Positive: trader pays the vault. negative: vault pays the trader.
    pub margin_to_vault: Decimal,
    pub position_notional: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateResp {
    pub bad_debt: Decimal,
    pub fee_to_liquidator: Decimal,
    pub fee_to_ecosystem_fund: Decimal,
    pub liquidator: TraderAddr,
    pub position_resp: PositionResp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateRequest {
    pub pair: Pair,
    pub trader: TraderAddr,
}

impl LiquidateRequest {
    pub fn new(pair: Pair, trader: TraderAddr) -> Self {
        Self { pair, trader }
    }
}

/// Per request outcome of a batch liquidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResponse {
    pub success: bool,
    pub error: Option<String>,
    pub liquidator_fee: Decimal,
    pub ecosystem_fund_fee: Decimal,
    pub pair: Pair,
    pub trader: TraderAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginResp {
    pub position: Position,
    pub funding_payment: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPositionResp {
    pub position: Position,
    pub position_notional: Decimal,
    pub unrealized_pnl: Decimal,
    pub margin_ratio: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub market: Market,
    pub amm: Amm,
    pub mark_price: Decimal,
    /// None when the oracle has no price for the pair.
    pub index_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("pair {0} not found")]
    PairNotFound(Pair),

    #[error("market {0} already exists")]
    MarketAlreadyExists(Pair),

    #[error("market {0} is not enabled")]
    MarketNotEnabled(Pair),

    #[error("position of {trader} on {pair} not found")]
    PositionNotFound { pair: Pair, trader: TraderAddr },

    #[error("quote amount must be positive, got {0}")]
    QuoteAmountIsZero(Decimal),

    #[error("leverage must be positive, got {0}")]
    LeverageIsZero(Decimal),

    #[error("leverage {leverage} exceeds market max {max}")]
    LeverageIsTooHigh { leverage: Decimal, max: Decimal },

    #[error("margin amount must be positive, got {0}")]
    MarginIsZero(Decimal),

    #[error("base amount must be non-zero, got {0}")]
    BaseAmountIsZero(Decimal),

    #[error("{what} must be a whole number of quote units, got {value}")]
    NonIntegerAmount { what: &'static str, value: Decimal },

    #[error("decimal overflow computing {0}")]
    Overflow(&'static str),

    #[error("removing margin would leave bad debt {0}")]
    FailedRemoveMarginCanCauseBadDebt(Decimal),

    #[error("not enough free collateral: {0}")]
    NotEnoughFreeCollateral(Decimal),

    #[error("swap amount {amount} fails user limit {limit}")]
    AssetFailsUserLimit { limit: Decimal, amount: Decimal },

    #[error("mark price {price} outside fluctuation band [{lower}, {upper}]")]
    OverFluctuationLimit { price: Decimal, lower: Decimal, upper: Decimal },

    #[error("margin ratio {ratio} below maintenance {maintenance}")]
    MarginRatioTooLow { ratio: Decimal, maintenance: Decimal },

    #[error("position is healthy: margin ratio {ratio} at or above maintenance {maintenance}")]
    MarginRatioTooHigh { ratio: Decimal, maintenance: Decimal },

    #[error("position has bad debt {0}")]
    BadDebt(Decimal),

    #[error("position is underwater by {0}, cannot reverse")]
    UnderwaterPosition(Decimal),

    #[error("{what} went negative: {value}")]
    NegativeValue { what: &'static str, value: Decimal },

    #[error("all {} liquidations failed", .0.len())]
    AllLiquidationsFailed(Vec<LiquidationResponse>),

    #[error("batch rejected: {} of {} liquidations failed", failed_count(.0), .0.len())]
    LiquidationBatchRejected(Vec<LiquidationResponse>),

    #[error("position of {trader} on {pair} has no market")]
    MarketCorrupted { pair: Pair, trader: TraderAddr },

    #[error("AMM error: {0}")]
    Amm(#[from] AmmError),

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("TWAP error: {0}")]
    Twap(#[from] TwapError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Funding error: {0}")]
    Funding(#[from] FundingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

fn failed_count(results: &[LiquidationResponse]) -> usize {
    results.iter().filter(|r| !r.success).count()
}
