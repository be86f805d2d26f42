//! Market parameters.
//!
//! A market is the risk configuration of one pair: leverage cap, maintenance
//! margin, fee ratios, liquidation split, TWAP window and the running funding
//! accumulator. Reserves live in the pair's [`Amm`](crate::amm::Amm).

use crate::types::Pair;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("{field} must be within [0, 1], got {value}")]
    RatioOutOfRange { field: &'static str, value: Decimal },

    #[error("max leverage must be positive, got {0}")]
    NonPositiveMaxLeverage(Decimal),

    #[error("max funding rate must be non-negative, got {0}")]
    NegativeMaxFundingRate(Decimal),

    #[error("1 / max leverage ({inverse}) is below maintenance margin ratio {mmr}")]
    LeverageExceedsMaintenance { inverse: Decimal, mmr: Decimal },

    #[error("twap lookback window must be positive, got {0}ms")]
    NonPositiveLookback(i64),
}

/// Risk parameters and running state of one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub pair: Pair,
    /// Trading is rejected while false.
    pub enabled: bool,
    pub maintenance_margin_ratio: Decimal,
    pub max_leverage: Decimal,
    /// Funding accumulator, advanced by the external funding hook.
    pub latest_cumulative_premium_fraction: Decimal,
    pub exchange_fee_ratio: Decimal,
    pub ecosystem_fund_fee_ratio: Decimal,
    pub liquidation_fee_ratio: Decimal,
    pub partial_liquidation_ratio: Decimal,
    pub max_funding_rate: Decimal,
    /// Lookback for TWAP notional, in milliseconds.
    pub twap_lookback_window_ms: i64,
    /// Ecosystem fund advances not yet offset by realized bad debt. whole units.
    pub prepaid_bad_debt: Decimal,
    /// Zero disables the fluctuation check.
    pub price_fluctuation_limit_ratio: Decimal,
}

impl Market {
    /// Default risk parameters: 10x, 6.25% maintenance, 5% liquidation fee.
    pub fn new(pair: Pair) -> Self {
        Self {
            pair,
            enabled: true,
            maintenance_margin_ratio: dec!(0.0625),
            max_leverage: dec!(10),
            latest_cumulative_premium_fraction: Decimal::ZERO,
            exchange_fee_ratio: dec!(0.001),
            ecosystem_fund_fee_ratio: dec!(0.001),
            liquidation_fee_ratio: dec!(0.05),
            partial_liquidation_ratio: dec!(0.5),
            max_funding_rate: Decimal::ZERO,
            twap_lookback_window_ms: 30 * 60 * 1000,
            prepaid_bad_debt: Decimal::ZERO,
            price_fluctuation_limit_ratio: dec!(0.1),
        }
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        let ratios = [
            ("maintenance_margin_ratio", self.maintenance_margin_ratio),
            ("exchange_fee_ratio", self.exchange_fee_ratio),
            ("ecosystem_fund_fee_ratio", self.ecosystem_fund_fee_ratio),
            ("liquidation_fee_ratio", self.liquidation_fee_ratio),
            ("partial_liquidation_ratio", self.partial_liquidation_ratio),
            ("price_fluctuation_limit_ratio", self.price_fluctuation_limit_ratio),
        ];
        for (field, value) in ratios {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(MarketError::RatioOutOfRange { field, value });
            }
        }

        if self.max_leverage <= Decimal::ZERO {
            return Err(MarketError::NonPositiveMaxLeverage(self.max_leverage));
        }

        if self.max_funding_rate < Decimal::ZERO {
            return Err(MarketError::NegativeMaxFundingRate(self.max_funding_rate));
        }

        // a position opened at max leverage must start above maintenance
        let inverse = Decimal::ONE / self.max_leverage;
        if inverse < self.maintenance_margin_ratio {
            return Err(MarketError::LeverageExceedsMaintenance {
                inverse,
                mmr: self.maintenance_margin_ratio,
            });
        }

        if self.twap_lookback_window_ms <= 0 {
            return Err(MarketError::NonPositiveLookback(self.twap_lookback_window_ms));
        }

        Ok(())
    }

    pub fn with_maintenance_margin_ratio(mut self, ratio: Decimal) -> Self {
        self.maintenance_margin_ratio = ratio;
        self
    }

    pub fn with_max_leverage(mut self, leverage: Decimal) -> Self {
        self.max_leverage = leverage;
        self
    }

    pub fn with_exchange_fee_ratio(mut self, ratio: Decimal) -> Self {
        self.exchange_fee_ratio = ratio;
        self
    }

    pub fn with_ecosystem_fund_fee_ratio(mut self, ratio: Decimal) -> Self {
        self.ecosystem_fund_fee_ratio = ratio;
        self
    }

    pub fn with_liquidation_fee_ratio(mut self, ratio: Decimal) -> Self {
        self.liquidation_fee_ratio = ratio;
        self
    }

    pub fn with_partial_liquidation_ratio(mut self, ratio: Decimal) -> Self {
        self.partial_liquidation_ratio = ratio;
        self
    }

    pub fn with_max_funding_rate(mut self, rate: Decimal) -> Self {
        self.max_funding_rate = rate;
        self
    }

    pub fn with_twap_lookback_window_ms(mut self, window_ms: i64) -> Self {
        self.twap_lookback_window_ms = window_ms;
        self
    }

    pub fn with_prepaid_bad_debt(mut self, amount: Decimal) -> Self {
        self.prepaid_bad_debt = amount;
        self
    }

    pub fn with_price_fluctuation_limit_ratio(mut self, ratio: Decimal) -> Self {
        self.price_fluctuation_limit_ratio = ratio;
        self
    }
}
