// 1.0: all the primitives live here. nothing in the engine works without these types.
// pairs, trader addresses, direction, block time, and the 18 decimal rounding rules.
// each id is a newtype so the compiler catches type mixups.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fractional digits every stored ratio, reserve and notional is quantized to.
pub const PRECISION: u32 = 18;

// 1.1: banker's rounding to 18 dp. applied after every product and quotient so
// replicas agree on the last digit.
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointNearestEven)
}

// ledger amounts are whole units of the quote denom
pub fn round_int(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
}

pub fn ceil_int(value: Decimal) -> Decimal {
    value.ceil()
}

// 1.2: market pair, written base:quote. the quote denom is what margin settles in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn base_denom(&self) -> &str {
        &self.base
    }

    pub fn quote_denom(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pair {0:?}: expected base:quote")]
pub struct ParsePairError(pub String);

impl FromStr for Pair {
    type Err = ParsePairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains(':') =>
            {
                Ok(Self::new(base, quote))
            }
            _ => Err(ParsePairError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraderAddr(pub String);

impl TraderAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraderAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// 1.3: direction of a trade against the vAMM.
// Long = trader buys base (base leaves the pool, quote enters). Short is the inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => dec!(1),
            Direction::Short => dec!(-1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    // closing a long sells base, so it trades Short against the pool
    pub fn closing(size: Decimal) -> Self {
        if size > Decimal::ZERO {
            Direction::Short
        } else {
            Direction::Long
        }
    }
}

// 1.4: millisecond block timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i64::MIN);

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn saturating_sub_millis(&self, ms: i64) -> Self {
        Self(self.0.saturating_sub(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// 1.5: the block the current operation executes in. supplied by the host chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: i64,
    pub time: Timestamp,
}

impl BlockContext {
    pub fn new(height: i64, time: Timestamp) -> Self {
        Self { height, time }
    }
}

impl Default for BlockContext {
    fn default() -> Self {
        Self::new(1, Timestamp::from_millis(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantize_uses_bankers_rounding() {
        // 19th digit is exactly half: round to even
        assert_eq!(
            quantize(dec!(0.0000000000000000025)),
            dec!(0.000000000000000002)
        );
        assert_eq!(
            quantize(dec!(0.0000000000000000035)),
            dec!(0.000000000000000004)
        );
        assert_eq!(quantize(dec!(1.5)), dec!(1.5));
    }

    #[test]
    fn round_int_half_to_even() {
        assert_eq!(round_int(dec!(124.5)), dec!(124));
        assert_eq!(round_int(dec!(125.5)), dec!(126));
        assert_eq!(round_int(dec!(124.999999)), dec!(125));
    }

    #[test]
    fn pair_parse_and_display() {
        let pair: Pair = "ubtc:unusd".parse().unwrap();
        assert_eq!(pair.base_denom(), "ubtc");
        assert_eq!(pair.quote_denom(), "unusd");
        assert_eq!(pair.to_string(), "ubtc:unusd");

        assert!("ubtc".parse::<Pair>().is_err());
        assert!(":unusd".parse::<Pair>().is_err());
        assert!("a:b:c".parse::<Pair>().is_err());
    }

    #[test]
    fn closing_direction_opposes_position() {
        assert_eq!(Direction::closing(dec!(10)), Direction::Short);
        assert_eq!(Direction::closing(dec!(-10)), Direction::Long);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
        assert_eq!(Direction::Short.sign(), dec!(-1));
    }
}
