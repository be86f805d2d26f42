// 6.0: index price collaborator. the engine only reads prices, it never discovers them.

use crate::types::Pair;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("no index price for {0}")]
    PriceUnavailable(Pair),

    #[error("index price for {pair} must be positive, got {price}")]
    NonPositivePrice { pair: Pair, price: Decimal },
}

pub trait Oracle {
    fn get_index_price(&self, pair: &Pair) -> Result<Decimal, OracleError>;
}

/// Fixed prices set by the host. used by the simulator and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    prices: BTreeMap<Pair, Decimal>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, pair: Pair, price: Decimal) -> Self {
        self.prices.insert(pair, price);
        self
    }

    pub fn set_price(&mut self, pair: Pair, price: Decimal) {
        self.prices.insert(pair, price);
    }
}

impl Oracle for StaticOracle {
    fn get_index_price(&self, pair: &Pair) -> Result<Decimal, OracleError> {
        let price = self
            .prices
            .get(pair)
            .copied()
            .ok_or_else(|| OracleError::PriceUnavailable(pair.clone()))?;
        if price <= Decimal::ZERO {
            return Err(OracleError::NonPositivePrice { pair: pair.clone(), price });
        }
        Ok(price)
    }
}
