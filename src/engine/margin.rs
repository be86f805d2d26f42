//! Adding and removing collateral on an open position.

use super::core::Engine;
use super::positions::check_whole_amount;
use super::results::{EngineError, MarginResp};
use super::state::Tx;
use crate::calc::{free_collateral, position_notional_spot, unrealized_pnl};
use crate::events::{EventPayload, PositionChangedEvent};
use crate::funding::remaining_margin_with_funding;
use crate::ledger::{Ledger, Transfer, VAULT};
use crate::market::Market;
use crate::oracle::Oracle;
use crate::position::Position;
use crate::types::{round_int, Pair, TraderAddr};
use rust_decimal::Decimal;

impl<L: Ledger, O: Oracle> Engine<L, O> {
    /// Moves `amount` from the trader into the vault and credits the position.
    /// Funding owed since the last touch is settled at the same time.
    pub fn add_margin(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
        amount: Decimal,
    ) -> Result<MarginResp, EngineError> {
        let resp = self.execute(|tx| tx.add_margin(pair, trader, amount))?;
        tracing::info!(%pair, %trader, %amount, margin = %resp.position.margin, "margin added");
        Ok(resp)
    }

    /// Pays `amount` of margin back to the trader. rejected when it would leave
    /// bad debt or no free collateral.
    pub fn remove_margin(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
        amount: Decimal,
    ) -> Result<MarginResp, EngineError> {
        let resp = self.execute(|tx| tx.remove_margin(pair, trader, amount))?;
        tracing::info!(%pair, %trader, %amount, margin = %resp.position.margin, "margin removed");
        Ok(resp)
    }
}

impl<'a> Tx<'a> {
    fn add_margin(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
        amount: Decimal,
    ) -> Result<MarginResp, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::MarginIsZero(amount));
        }
        check_whole_amount("margin amount", amount)?;
        let market = self.market(pair)?;
        let amm = self.amm(pair)?;
        let mut position = self.position(pair, trader)?;

        let cpf = market.latest_cumulative_premium_fraction;
        let remaining = remaining_margin_with_funding(&position, amount, cpf)?;
        if remaining.bad_debt > Decimal::ZERO {
            return Err(EngineError::BadDebt(remaining.bad_debt));
        }

        self.transfer(Transfer::AccountToModule {
            from: trader.clone(),
            module: VAULT,
            denom: pair.quote_denom().to_string(),
            amount,
        })?;

        position.margin = remaining.margin;
        position.latest_cumulative_premium_fraction = market.latest_cumulative_premium_fraction;
        position.last_updated_block_number = self.ctx.height;
        self.save_position(&position)?;

        let notional = position_notional_spot(&amm, &position)?;
        let funding = remaining.funding_payment;
        self.emit_margin_changed(&market, &position, notional, funding, amm.mark_price());

        Ok(MarginResp {
            position,
            funding_payment: remaining.funding_payment,
        })
    }

    fn remove_margin(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
        amount: Decimal,
    ) -> Result<MarginResp, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::MarginIsZero(amount));
        }
        check_whole_amount("margin amount", amount)?;
        let market = self.market(pair)?;
        let amm = self.amm(pair)?;
        let mut position = self.position(pair, trader)?;

        let cpf = market.latest_cumulative_premium_fraction;
        let remaining = remaining_margin_with_funding(&position, -amount, cpf)?;
        if remaining.bad_debt > Decimal::ZERO {
            return Err(EngineError::FailedRemoveMarginCanCauseBadDebt(remaining.bad_debt));
        }

        position.margin = remaining.margin;
        position.latest_cumulative_premium_fraction = market.latest_cumulative_premium_fraction;
        position.last_updated_block_number = self.ctx.height;

        // checked on the position as it would be after the withdrawal
        let spot = position_notional_spot(&amm, &position)?;
        let twap = self.position_notional_twap(&position, market.twap_lookback_window_ms)?;
        let free = free_collateral(&position, spot, twap, market.maintenance_margin_ratio);
        if free <= Decimal::ZERO {
            return Err(EngineError::NotEnoughFreeCollateral(free));
        }

        self.save_position(&position)?;
        self.withdraw(pair, trader, amount)?;

        let funding = remaining.funding_payment;
        self.emit_margin_changed(&market, &position, spot, funding, amm.mark_price());

        Ok(MarginResp {
            position,
            funding_payment: remaining.funding_payment,
        })
    }

    // margin moves without a swap: nothing exchanged, no fee
    fn emit_margin_changed(
        &mut self,
        market: &Market,
        position: &Position,
        notional: Decimal,
        funding: Decimal,
        mark_price: Decimal,
    ) {
        self.emit(EventPayload::PositionChanged(PositionChangedEvent {
            pair: market.pair.clone(),
            trader: position.trader.clone(),
            margin: round_int(position.margin),
            position_notional: notional,
            exchanged_notional: Decimal::ZERO,
            exchanged_size: Decimal::ZERO,
            transaction_fee: Decimal::ZERO,
            position_size: position.size,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl_after: unrealized_pnl(position, notional),
            bad_debt: Decimal::ZERO,
            funding_payment: funding,
            mark_price,
        }));
    }
}
