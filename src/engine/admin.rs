// 8.8 engine/admin.rs: governance operations. market lifecycle, peg and depth
// shifts, ecosystem fund movements and the funding hook.
// peg and depth shifts settle the pool's open interest value between the
// ecosystem fund and the vault so traders' notional stays backed.

use super::core::Engine;
use super::results::EngineError;
use super::state::Tx;
use crate::amm::{Amm, AmmError};
use crate::config::ConfigError;
use crate::events::{
    EcosystemFundTransferEvent, EventPayload, FundingRateChangedEvent, MarketClosedEvent,
    MarketCreatedEvent, PegShiftedEvent, SwapInvariantShiftedEvent,
};
use crate::funding::{epoch_premium_fraction, funding_rate};
use crate::ledger::{Ledger, Transfer, ECOSYSTEM_FUND, VAULT};
use crate::market::Market;
use crate::oracle::Oracle;
use crate::twap::TwapCalcOption;
use crate::types::{quantize, Direction, Pair, TraderAddr};
use rust_decimal::Decimal;

impl<L: Ledger, O: Oracle> Engine<L, O> {
    /// Registers a market and its pool. the pool's first snapshot is written at block time.
    pub fn create_market(&mut self, market: Market, amm: Amm) -> Result<(), EngineError> {
        market.validate()?;
        amm.validate()?;
        if market.pair != amm.pair {
            return Err(ConfigError::InvalidAmm {
                reason: format!("amm pair {} does not match market pair {}", amm.pair, market.pair),
            }
            .into());
        }

        let pair = market.pair.clone();
        self.execute(|tx| {
            if tx.markets.contains(&market.pair) {
                return Err(EngineError::MarketAlreadyExists(market.pair.clone()));
            }
            tx.save_market(&market)?;
            tx.save_amm(&amm)?;
            tx.emit(EventPayload::MarketCreated(MarketCreatedEvent {
                pair: market.pair.clone(),
                sqrt_depth: amm.sqrt_depth,
                price_multiplier: amm.price_multiplier,
            }));
            Ok(())
        })?;
        tracing::info!(%pair, "market created");
        Ok(())
    }

    /// Moves the peg. returns the cost, positive when the ecosystem fund paid the vault.
    pub fn shift_peg_multiplier(
        &mut self,
        pair: &Pair,
        new_multiplier: Decimal,
    ) -> Result<Decimal, EngineError> {
        let cost = self.execute(|tx| tx.shift_peg_multiplier(pair, new_multiplier))?;
        tracing::info!(%pair, %new_multiplier, %cost, "peg shifted");
        Ok(cost)
    }

    /// Rescales the pool to `new_sqrt_depth` at an unchanged price. returns the cost.
    pub fn shift_swap_invariant(
        &mut self,
        pair: &Pair,
        new_sqrt_depth: Decimal,
    ) -> Result<Decimal, EngineError> {
        let cost = self.execute(|tx| tx.shift_swap_invariant(pair, new_sqrt_depth))?;
        tracing::info!(%pair, %new_sqrt_depth, %cost, "swap invariant shifted");
        Ok(cost)
    }

    /// Disables trading. existing positions can still be closed, liquidated and have margin moved.
    pub fn close_market(&mut self, pair: &Pair) -> Result<(), EngineError> {
        self.execute(|tx| {
            let mut market = tx.market(pair)?;
            if !market.enabled {
                return Err(EngineError::MarketNotEnabled(pair.clone()));
            }
            market.enabled = false;
            tx.save_market(&market)?;
            tx.emit(EventPayload::MarketClosed(MarketClosedEvent { pair: pair.clone() }));
            Ok(())
        })?;
        tracing::info!(%pair, "market closed");
        Ok(())
    }

    pub fn withdraw_from_ecosystem_fund(
        &mut self,
        to: &TraderAddr,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        self.execute(|tx| {
            tx.transfer(Transfer::ModuleToAccount {
                module: ECOSYSTEM_FUND,
                to: to.clone(),
                denom: denom.to_string(),
                amount,
            })?;
            tx.emit(EventPayload::EcosystemFundWithdrawal(EcosystemFundTransferEvent {
                account: to.clone(),
                denom: denom.to_string(),
                amount,
            }));
            Ok(())
        })?;
        tracing::info!(%to, denom, %amount, "ecosystem fund withdrawal");
        Ok(())
    }

    pub fn donate_to_ecosystem_fund(
        &mut self,
        sender: &TraderAddr,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        self.execute(|tx| {
            tx.transfer(Transfer::AccountToModule {
                from: sender.clone(),
                module: ECOSYSTEM_FUND,
                denom: denom.to_string(),
                amount,
            })?;
            tx.emit(EventPayload::EcosystemFundDonation(EcosystemFundTransferEvent {
                account: sender.clone(),
                denom: denom.to_string(),
                amount,
            }));
            Ok(())
        })?;
        tracing::info!(%sender, denom, %amount, "ecosystem fund donation");
        Ok(())
    }

    /// Hook for the external funding module.
    pub fn set_cumulative_premium_fraction(
        &mut self,
        pair: &Pair,
        cpf: Decimal,
    ) -> Result<(), EngineError> {
        self.execute(|tx| {
            let mut market = tx.market(pair)?;
            market.latest_cumulative_premium_fraction = cpf;
            tx.save_market(&market)
        })?;
        tracing::debug!(%pair, %cpf, "cumulative premium fraction set");
        Ok(())
    }

    /// Advances the cumulative premium fraction by one epoch of
    /// (mark TWAP - index), scaled to the epoch's share of a day and capped by
    /// the market's max funding rate.
    pub fn apply_funding_epoch(
        &mut self,
        pair: &Pair,
        epoch_ms: i64,
    ) -> Result<FundingRateChangedEvent, EngineError> {
        let index_price = self.oracle.get_index_price(pair)?;

        let event = self.execute(|tx| {
            let mut market = tx.market(pair)?;
            let mark_twap = tx.twap(
                pair,
                TwapCalcOption::Spot,
                Direction::Long,
                Decimal::ZERO,
                market.twap_lookback_window_ms,
            )?;

            let premium_fraction =
                epoch_premium_fraction(mark_twap, index_price, epoch_ms, market.max_funding_rate)?;
            market.latest_cumulative_premium_fraction = market
                .latest_cumulative_premium_fraction
                .checked_add(premium_fraction)
                .map(quantize)
                .ok_or(EngineError::Overflow("cumulative premium fraction"))?;
            tx.save_market(&market)?;

            let event = FundingRateChangedEvent {
                pair: pair.clone(),
                mark_price_twap: mark_twap,
                index_price,
                premium_fraction,
                cumulative_premium_fraction: market.latest_cumulative_premium_fraction,
                funding_rate: funding_rate(premium_fraction, index_price),
            };
            tx.emit(EventPayload::FundingRateChanged(event.clone()));
            Ok(event)
        })?;

        tracing::info!(
            %pair,
            mark_twap = %event.mark_price_twap,
            index = %event.index_price,
            premium_fraction = %event.premium_fraction,
            "funding epoch applied"
        );
        Ok(event)
    }
}

impl<'a> Tx<'a> {
    fn shift_peg_multiplier(
        &mut self,
        pair: &Pair,
        new_multiplier: Decimal,
    ) -> Result<Decimal, EngineError> {
        let mut amm = self.amm(pair)?;
        if amm.price_multiplier == new_multiplier {
            return Ok(Decimal::ZERO);
        }

        let cost = amm.repeg_cost(new_multiplier)?;
        self.settle_shift_cost(pair, cost)?;

        let old_multiplier = amm.price_multiplier;
        amm.price_multiplier = new_multiplier;
        amm.validate()?;
        self.save_amm(&amm)?;

        self.emit(EventPayload::PegShifted(PegShiftedEvent {
            pair: pair.clone(),
            old_multiplier,
            new_multiplier,
            cost,
        }));
        Ok(cost)
    }

    fn shift_swap_invariant(
        &mut self,
        pair: &Pair,
        new_sqrt_depth: Decimal,
    ) -> Result<Decimal, EngineError> {
        if new_sqrt_depth <= Decimal::ZERO {
            return Err(AmmError::NonPositiveSwapInvariant(new_sqrt_depth).into());
        }
        let mut amm = self.amm(pair)?;
        let new_invariant = new_sqrt_depth
            .checked_mul(new_sqrt_depth)
            .ok_or(AmmError::Overflow("new swap invariant"))?;

        let cost = amm.swap_invariant_cost(new_invariant)?;
        self.settle_shift_cost(pair, cost)?;

        let old_sqrt_depth = amm.sqrt_depth;
        amm.update_swap_invariant(new_invariant)?;
        self.save_amm(&amm)?;

        self.emit(EventPayload::SwapInvariantShifted(SwapInvariantShiftedEvent {
            pair: pair.clone(),
            old_sqrt_depth,
            new_sqrt_depth: amm.sqrt_depth,
            cost,
        }));
        Ok(cost)
    }

    // positive cost: the fund tops up the vault. negative: the vault releases the surplus.
    fn settle_shift_cost(&mut self, pair: &Pair, cost: Decimal) -> Result<(), EngineError> {
        let denom = pair.quote_denom().to_string();
        if cost > Decimal::ZERO {
            self.transfer(Transfer::ModuleToModule {
                from: ECOSYSTEM_FUND,
                to: VAULT,
                denom,
                amount: cost,
            })?;
        } else if cost < Decimal::ZERO {
            self.transfer(Transfer::ModuleToModule {
                from: VAULT,
                to: ECOSYSTEM_FUND,
                denom,
                amount: cost.abs(),
            })?;
        }
        Ok(())
    }
}
