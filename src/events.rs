// 11.0: every committed state change produces an event. failed operations produce
// none, except the liquidation failures a batch reports per request.
// the EventPayload enum lists all event types.

use crate::types::{Pair, Timestamp, TraderAddr};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub block_height: i64,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionChanged(PositionChangedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    LiquidationFailed(LiquidationFailedEvent),

    // Bad debt events
    BadDebtRealized(BadDebtRealizedEvent),
    PrepaidBadDebtBorrowed(PrepaidBadDebtBorrowedEvent),

    // Market admin events
    MarketCreated(MarketCreatedEvent),
    MarketClosed(MarketClosedEvent),
    PegShifted(PegShiftedEvent),
    SwapInvariantShifted(SwapInvariantShiftedEvent),
    FundingRateChanged(FundingRateChangedEvent),

    // Ecosystem fund events
    EcosystemFundDonation(EcosystemFundTransferEvent),
    EcosystemFundWithdrawal(EcosystemFundTransferEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChangedEvent {
    pub pair: Pair,
    pub trader: TraderAddr,
    pub margin: Decimal,
    pub position_notional: Decimal,
    pub exchanged_notional: Decimal,
    pub exchanged_size: Decimal,
    pub transaction_fee: Decimal,
    pub position_size: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl_after: Decimal,
    pub bad_debt: Decimal,
    pub funding_payment: Decimal,
    pub mark_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub pair: Pair,
    pub trader: TraderAddr,
    pub liquidator: TraderAddr,
    pub exchanged_quote_amount: Decimal,
    pub exchanged_position_size: Decimal,
    pub fee_to_liquidator: Decimal,
    pub fee_to_ecosystem_fund: Decimal,
    pub bad_debt: Decimal,
    pub margin: Decimal,
    pub position_notional: Decimal,
    pub position_size: Decimal,
    pub unrealized_pnl: Decimal,
    pub mark_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidationFailedReason {
    Unspecified,
    PositionHealthy,
    NonexistentPair,
    NonexistentPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationFailedEvent {
    pub pair: Pair,
    pub trader: TraderAddr,
    pub liquidator: TraderAddr,
    pub reason: LiquidationFailedReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadDebtRealizedEvent {
    pub pair: Pair,
    pub amount: Decimal,
    pub covered_by_prepaid: Decimal,
    pub drawn_from_ecosystem_fund: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepaidBadDebtBorrowedEvent {
    pub pair: Pair,
    pub shortfall: Decimal,
    pub prepaid_bad_debt: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCreatedEvent {
    pub pair: Pair,
    pub sqrt_depth: Decimal,
    pub price_multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketClosedEvent {
    pub pair: Pair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PegShiftedEvent {
    pub pair: Pair,
    pub old_multiplier: Decimal,
    pub new_multiplier: Decimal,
    /// Positive: paid by the ecosystem fund into the vault.
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapInvariantShiftedEvent {
    pub pair: Pair,
    pub old_sqrt_depth: Decimal,
    pub new_sqrt_depth: Decimal,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRateChangedEvent {
    pub pair: Pair,
    pub mark_price_twap: Decimal,
    pub index_price: Decimal,
    pub premium_fraction: Decimal,
    pub cumulative_premium_fraction: Decimal,
    pub funding_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcosystemFundTransferEvent {
    pub account: TraderAddr,
    pub denom: String,
    pub amount: Decimal,
}

/// Append-only event log with bounded retention. ids keep increasing after old
/// events are dropped.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn emit(
        &mut self,
        timestamp: Timestamp,
        block_height: i64,
        payload: EventPayload,
    ) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push(Event {
            id,
            timestamp,
            block_height,
            payload,
        });

        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
        id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
