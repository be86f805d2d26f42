// 13.0 config.rs: engine settings and market presets in one place.
// 13.1 MarketDefaults is a template for CreateMarket, not live market state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::amm::Amm;
use crate::market::Market;
use crate::types::Pair;

/** 13.2: engine wide settings */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    // Maximum number of events to retain in memory
    pub max_events: usize,
    // Used by MultiLiquidate when the caller does not pass the flag
    pub all_liquidations_must_succeed_default: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            all_liquidations_must_succeed_default: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "max_events must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/** 13.3: market template. risk params plus the initial pool shape */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDefaults {
    pub maintenance_margin_ratio: Decimal,
    pub max_leverage: Decimal,
    pub exchange_fee_ratio: Decimal,
    pub ecosystem_fund_fee_ratio: Decimal,
    pub liquidation_fee_ratio: Decimal,
    pub partial_liquidation_ratio: Decimal,
    pub max_funding_rate: Decimal,
    pub twap_lookback_window_ms: i64,
    pub price_fluctuation_limit_ratio: Decimal,
    // sqrt of the constant product. both reserves start here
    pub sqrt_depth: Decimal,
    pub price_multiplier: Decimal,
}

impl Default for MarketDefaults {
    fn default() -> Self {
        Self {
            maintenance_margin_ratio: dec!(0.0625),
            max_leverage: dec!(10),
            exchange_fee_ratio: dec!(0.001),
            ecosystem_fund_fee_ratio: dec!(0.001),
            liquidation_fee_ratio: dec!(0.05),
            partial_liquidation_ratio: dec!(0.5),
            max_funding_rate: Decimal::ZERO,
            twap_lookback_window_ms: 30 * 60 * 1000,
            price_fluctuation_limit_ratio: dec!(0.1),
            sqrt_depth: dec!(1_000_000_000_000),
            price_multiplier: Decimal::ONE,
        }
    }
}

impl MarketDefaults {
    // 5x, 10% maintenance, capped funding, tight fluctuation band
    pub fn conservative() -> Self {
        Self {
            maintenance_margin_ratio: dec!(0.1),
            max_leverage: dec!(5),
            max_funding_rate: dec!(0.01),
            price_fluctuation_limit_ratio: dec!(0.05),
            ..Self::default()
        }
    }

    // 20x, no fees, short twap window so scenarios move quickly
    pub fn testnet() -> Self {
        Self {
            maintenance_margin_ratio: dec!(0.025),
            max_leverage: dec!(20),
            exchange_fee_ratio: Decimal::ZERO,
            ecosystem_fund_fee_ratio: Decimal::ZERO,
            twap_lookback_window_ms: 60 * 1000,
            price_fluctuation_limit_ratio: Decimal::ZERO,
            ..Self::default()
        }
    }

    pub fn market(&self, pair: Pair) -> Market {
        Market::new(pair)
            .with_maintenance_margin_ratio(self.maintenance_margin_ratio)
            .with_max_leverage(self.max_leverage)
            .with_exchange_fee_ratio(self.exchange_fee_ratio)
            .with_ecosystem_fund_fee_ratio(self.ecosystem_fund_fee_ratio)
            .with_liquidation_fee_ratio(self.liquidation_fee_ratio)
            .with_partial_liquidation_ratio(self.partial_liquidation_ratio)
            .with_max_funding_rate(self.max_funding_rate)
            .with_twap_lookback_window_ms(self.twap_lookback_window_ms)
            .with_price_fluctuation_limit_ratio(self.price_fluctuation_limit_ratio)
    }

    pub fn amm(&self, pair: Pair) -> Result<Amm, ConfigError> {
        Amm::new(pair, self.sqrt_depth, self.price_multiplier).map_err(|e| ConfigError::InvalidAmm {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pair = Pair::new("base", "quote");
        self.market(pair.clone())
            .validate()
            .map_err(|e| ConfigError::InvalidMarket { reason: e.to_string() })?;
        self.amm(pair)?;
        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine config: {reason}")]
    InvalidEngine { reason: String },

    #[error("invalid market config: {reason}")]
    InvalidMarket { reason: String },

    #[error("invalid amm config: {reason}")]
    InvalidAmm { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn market_defaults(&self) -> MarketDefaults {
        match self {
            Environment::Development => MarketDefaults::default(),
            Environment::Testnet => MarketDefaults::testnet(),
            Environment::Mainnet => MarketDefaults::conservative(),
        }
    }
}
