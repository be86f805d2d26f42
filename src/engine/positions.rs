//! Opening, reversing and closing positions against the vAMM.
//!
//! Each path computes a [`PositionResp`] on a copy of the pool, then
//! `after_position_update` runs the shared checks (bad debt, fluctuation band,
//! maintenance margin) and plans the vault and fee transfers.

use super::core::Engine;
use super::results::{EngineError, PositionResp};
use super::state::Tx;
use crate::amm::Amm;
use crate::calc::{margin_ratio, position_notional_spot, preferred_notional, unrealized_pnl};
use crate::events::{EventPayload, PositionChangedEvent};
use crate::funding::{funding_payment, remaining_margin_with_funding};
use crate::ledger::{Ledger, Transfer, ECOSYSTEM_FUND, FEE_POOL, VAULT};
use crate::market::Market;
use crate::oracle::Oracle;
use crate::position::Position;
use crate::types::{quantize, round_int, Direction, Pair, TraderAddr};
use rust_decimal::Decimal;

impl<L: Ledger, O: Oracle> Engine<L, O> {
    /// Opens, grows, shrinks or flips the trader's position with `quote_amount`
    /// of margin at `leverage`. `base_amount_limit` of zero disables the slippage check.
    pub fn open_position(
        &mut self,
        pair: &Pair,
        dir: Direction,
        trader: &TraderAddr,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
    ) -> Result<PositionResp, EngineError> {
        let resp = self.execute(|tx| {
            tx.open_position(pair, dir, trader, quote_amount, leverage, base_amount_limit)
        })?;
        tracing::info!(
            %pair,
            %trader,
            ?dir,
            size = %resp.position.size,
            margin = %resp.position.margin,
            exchanged = %resp.exchanged_notional,
            "position opened"
        );
        Ok(resp)
    }

    pub fn close_position(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<PositionResp, EngineError> {
        let resp = self.execute(|tx| tx.close_position(pair, trader))?;
        tracing::info!(
            %pair,
            %trader,
            realized_pnl = %resp.realized_pnl,
            bad_debt = %resp.bad_debt,
            "position closed"
        );
        Ok(resp)
    }

    /// Closes `size` base of the position. closes it entirely when `size` covers it.
    pub fn partial_close(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
        size: Decimal,
    ) -> Result<PositionResp, EngineError> {
        let resp = self.execute(|tx| tx.partial_close(pair, trader, size))?;
        tracing::info!(%pair, %trader, size = %resp.position.size, "position reduced");
        Ok(resp)
    }
}

// 4.2: rejected before anything is computed
fn check_open_position_requirements(
    market: &Market,
    quote_amount: Decimal,
    leverage: Decimal,
) -> Result<(), EngineError> {
    if quote_amount <= Decimal::ZERO {
        return Err(EngineError::QuoteAmountIsZero(quote_amount));
    }
    check_whole_amount("quote amount", quote_amount)?;
    if leverage <= Decimal::ZERO {
        return Err(EngineError::LeverageIsZero(leverage));
    }
    if leverage > market.max_leverage {
        return Err(EngineError::LeverageIsTooHigh {
            leverage,
            max: market.max_leverage,
        });
    }
    Ok(())
}

// ledger moves whole units only, so margin must arrive in whole units too
pub(super) fn check_whole_amount(what: &'static str, value: Decimal) -> Result<(), EngineError> {
    if value.fract().is_zero() {
        Ok(())
    } else {
        Err(EngineError::NonIntegerAmount { what, value })
    }
}

fn leveraged_notional(quote_amount: Decimal, leverage: Decimal) -> Result<Decimal, EngineError> {
    quote_amount
        .checked_mul(leverage)
        .map(quantize)
        .ok_or(EngineError::Overflow("leveraged notional"))
}

fn checked_add(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, EngineError> {
    a.checked_add(b).ok_or(EngineError::Overflow(what))
}

// zero disables. longs must receive at least `limit`, shorts may give at most `limit`.
fn check_user_limit(limit: Decimal, amount: Decimal, dir: Direction) -> Result<(), EngineError> {
    if limit.is_zero() {
        return Ok(());
    }
    let fails = match dir {
        Direction::Long => amount < limit,
        Direction::Short => amount > limit,
    };
    if fails {
        return Err(EngineError::AssetFailsUserLimit { limit, amount });
    }
    Ok(())
}

impl<'a> Tx<'a> {
    pub(super) fn open_position(
        &mut self,
        pair: &Pair,
        dir: Direction,
        trader: &TraderAddr,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
    ) -> Result<PositionResp, EngineError> {
        let market = self.market(pair)?;
        if !market.enabled {
            return Err(EngineError::MarketNotEnabled(pair.clone()));
        }
        let amm = self.amm(pair)?;
        check_open_position_requirements(&market, quote_amount, leverage)?;

        let existing = self.find_position(pair, trader)?;
        let position = existing.unwrap_or_else(|| {
            Position::zero(
                trader.clone(),
                pair.clone(),
                market.latest_cumulative_premium_fraction,
                self.ctx.height,
            )
        });

        let same_side = match dir {
            Direction::Long => position.size >= Decimal::ZERO,
            Direction::Short => position.size <= Decimal::ZERO,
        };

        let (amm, resp) = if same_side {
            let notional = leveraged_notional(quote_amount, leverage)?;
            let limit = base_amount_limit;
            self.increase_position(&market, amm, &position, dir, notional, limit, leverage)?
        } else {
            let limit = base_amount_limit;
            self.open_reverse_position(&market, amm, &position, quote_amount, leverage, limit)?
        };

        self.after_position_update(&market, &amm, trader, &resp)?;
        Ok(resp)
    }

    pub(super) fn close_position(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<PositionResp, EngineError> {
        let position = self.position(pair, trader)?;
        let market = self.market(pair)?;
        let amm = self.amm(pair)?;

        let (amm, resp) = self.close_position_entirely(&market, amm, &position, Decimal::ZERO)?;

        // underwater: the vault keeps the margin and the shortfall is socialized
        if resp.bad_debt > Decimal::ZERO {
            self.realize_bad_debt(pair, resp.bad_debt)?;
            self.emit_position_changed(&market, &amm, trader, &resp, Decimal::ZERO);
            return Ok(resp);
        }

        self.after_position_update(&market, &amm, trader, &resp)?;
        Ok(resp)
    }

    pub(super) fn partial_close(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
        size: Decimal,
    ) -> Result<PositionResp, EngineError> {
        if size.is_zero() {
            return Err(EngineError::BaseAmountIsZero(size));
        }

        let position = self.position(pair, trader)?;
        if size.abs() >= position.size.abs() {
            return self.close_position(pair, trader);
        }

        let market = self.market(pair)?;
        let amm = self.amm(pair)?;

        let dir = Direction::closing(position.size);
        let quote_reserve = amm.get_quote_reserve_amt(size.abs(), dir)?;
        let quote_delta = amm.quote_reserve_to_asset(quote_reserve)?;

        let (amm, resp) =
            self.decrease_position(&market, amm, &position, quote_delta, Decimal::ZERO)?;
        self.after_position_update(&market, &amm, trader, &resp)?;
        Ok(resp)
    }

    // 4.3: same side or new position. margin grows by notional / leverage, pnl is untouched.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn increase_position(
        &mut self,
        market: &Market,
        amm: Amm,
        current: &Position,
        dir: Direction,
        increased_notional: Decimal,
        base_amount_limit: Decimal,
        leverage: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        let cpf = market.latest_cumulative_premium_fraction;
        // notional before the swap moves the pool
        let notional_before = position_notional_spot(&amm, current)?;
        let (updated_amm, base_swapped) =
            self.swap_quote_asset(amm, dir, increased_notional, base_amount_limit)?;

        let margin_increase = quantize(increased_notional / leverage);
        let funding = funding_payment(current, cpf)?;
        let remaining = checked_add(current.margin, margin_increase, "margin")?
            .checked_sub(funding)
            .ok_or(EngineError::Overflow("margin"))?;
        let position_notional =
            checked_add(notional_before, increased_notional, "position notional")?;
        let exchanged_size = match dir {
            Direction::Long => base_swapped,
            Direction::Short => -base_swapped,
        };

        let position = Position {
            size: current.size + exchanged_size,
            margin: remaining.max(Decimal::ZERO),
            open_notional: checked_add(current.open_notional, increased_notional, "open notional")?,
            latest_cumulative_premium_fraction: cpf,
            last_updated_block_number: self.ctx.height,
            ..current.clone()
        };
        let unrealized_pnl_after = unrealized_pnl(&position, position_notional);

        let resp = PositionResp {
            exchanged_notional: increased_notional,
            exchanged_size,
            bad_debt: (-remaining).max(Decimal::ZERO),
            funding_payment: funding,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl_after,
            margin_to_vault: margin_increase,
            position_notional,
            position,
        };
        Ok((updated_amm, resp))
    }

    // 4.4: trade against an open position. shrinks it when the new notional fits,
    // flips it otherwise.
    fn open_reverse_position(
        &mut self,
        market: &Market,
        amm: Amm,
        current: &Position,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        let notional = leveraged_notional(quote_amount, leverage)?;
        let current_notional = position_notional_spot(&amm, current)?;

        if current_notional > notional {
            self.decrease_position(market, amm, current, notional, base_amount_limit)
        } else {
            self.close_and_open_reverse_position(
                market,
                amm,
                current,
                quote_amount,
                leverage,
                base_amount_limit,
            )
        }
    }

    // 4.5: close `decreased_notional` worth of the position. pnl is realized pro rata to size.
    pub(super) fn decrease_position(
        &mut self,
        market: &Market,
        amm: Amm,
        current: &Position,
        decreased_notional: Decimal,
        base_amount_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        if current.is_empty() {
            return Err(EngineError::PositionNotFound {
                pair: current.pair.clone(),
                trader: current.trader.clone(),
            });
        }

        let cpf = market.latest_cumulative_premium_fraction;
        let dir = Direction::closing(current.size);

        let current_notional = position_notional_spot(&amm, current)?;
        let current_pnl = unrealized_pnl(current, current_notional);

        let (updated_amm, base_swapped) =
            self.swap_quote_asset(amm, dir, decreased_notional, base_amount_limit)?;
        let exchanged_size = match dir {
            Direction::Long => base_swapped,
            Direction::Short => -base_swapped,
        };

        let realized_pnl = quantize(current_pnl * exchanged_size.abs() / current.size.abs());
        let remaining = remaining_margin_with_funding(current, realized_pnl, cpf)?;

        let unrealized_pnl_after = current_pnl - realized_pnl;
        let position_notional = current_notional - decreased_notional;

        // open notional that keeps the unrealized pnl consistent with the remaining notional
        let open_notional = if current.is_long() {
            position_notional - unrealized_pnl_after
        } else {
            position_notional + unrealized_pnl_after
        };
        if open_notional < Decimal::ZERO {
            return Err(EngineError::NegativeValue {
                what: "open notional",
                value: open_notional,
            });
        }

        let position = Position {
            size: current.size + exchanged_size,
            margin: remaining.margin,
            open_notional,
            latest_cumulative_premium_fraction: cpf,
            last_updated_block_number: self.ctx.height,
            ..current.clone()
        };

        let resp = PositionResp {
            exchanged_notional: decreased_notional,
            exchanged_size,
            bad_debt: remaining.bad_debt,
            funding_payment: remaining.funding_payment,
            realized_pnl,
            unrealized_pnl_after,
            margin_to_vault: Decimal::ZERO,
            position_notional,
            position,
        };
        Ok((updated_amm, resp))
    }

    // 4.6: close everything, then open the remainder of the notional on the other side
    fn close_and_open_reverse_position(
        &mut self,
        market: &Market,
        amm: Amm,
        current: &Position,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        let (amm, close_resp) = self.close_position_entirely(market, amm, current, Decimal::ZERO)?;
        if close_resp.bad_debt > Decimal::ZERO {
            return Err(EngineError::UnderwaterPosition(close_resp.bad_debt));
        }

        let reverse_notional = leveraged_notional(quote_amount, leverage)?;
        let remaining_notional = reverse_notional - close_resp.exchanged_notional;
        if remaining_notional < Decimal::ZERO {
            return Err(EngineError::NegativeValue {
                what: "reverse notional",
                value: remaining_notional,
            });
        }
        if remaining_notional.is_zero() {
            return Ok((amm, close_resp));
        }

        // the closing leg already delivered part of the requested base
        let limit = if base_amount_limit > Decimal::ZERO {
            let left = base_amount_limit - close_resp.exchanged_size.abs();
            if left < Decimal::ZERO {
                return Err(EngineError::AssetFailsUserLimit {
                    limit: base_amount_limit,
                    amount: close_resp.exchanged_size.abs(),
                });
            }
            left
        } else {
            Decimal::ZERO
        };

        let dir = Direction::closing(current.size);
        let fresh = Position::zero(
            current.trader.clone(),
            current.pair.clone(),
            market.latest_cumulative_premium_fraction,
            self.ctx.height,
        );
        let (amm, increase_resp) =
            self.increase_position(market, amm, &fresh, dir, remaining_notional, limit, leverage)?;

        let resp = PositionResp {
            exchanged_notional: close_resp.exchanged_notional + increase_resp.exchanged_notional,
            exchanged_size: close_resp.exchanged_size + increase_resp.exchanged_size,
            bad_debt: close_resp.bad_debt + increase_resp.bad_debt,
            funding_payment: close_resp.funding_payment + increase_resp.funding_payment,
            realized_pnl: close_resp.realized_pnl + increase_resp.realized_pnl,
            unrealized_pnl_after: Decimal::ZERO,
            margin_to_vault: close_resp.margin_to_vault + increase_resp.margin_to_vault,
            position_notional: increase_resp.position_notional,
            position: increase_resp.position,
        };
        Ok((amm, resp))
    }

    // 4.7: counter swap the full size and delete the position. does not fail on bad debt,
    // callers decide what to do with it.
    pub(super) fn close_position_entirely(
        &mut self,
        market: &Market,
        amm: Amm,
        current: &Position,
        quote_amount_limit: Decimal,
    ) -> Result<(Amm, PositionResp), EngineError> {
        if current.is_empty() {
            return Err(EngineError::PositionNotFound {
                pair: current.pair.clone(),
                trader: current.trader.clone(),
            });
        }

        let cpf = market.latest_cumulative_premium_fraction;
        let position_notional = position_notional_spot(&amm, current)?;
        let realized_pnl = unrealized_pnl(current, position_notional);
        let remaining = remaining_margin_with_funding(current, realized_pnl, cpf)?;

        let dir = Direction::closing(current.size);
        let (updated_amm, quote_out) =
            self.swap_base_asset(amm, dir, current.size.abs(), quote_amount_limit)?;

        self.delete_position(&current.pair, &current.trader);

        let resp = PositionResp {
            position: Position::zero(
                current.trader.clone(),
                current.pair.clone(),
                cpf,
                self.ctx.height,
            ),
            exchanged_notional: quote_out,
            exchanged_size: -current.size,
            bad_debt: remaining.bad_debt,
            funding_payment: remaining.funding_payment,
            realized_pnl,
            unrealized_pnl_after: Decimal::ZERO,
            margin_to_vault: -remaining.margin,
            position_notional: Decimal::ZERO,
        };
        Ok((updated_amm, resp))
    }

    // 4.8: swaps run on the caller's copy of the pool. it is saved, with a snapshot,
    // only after the user limit passed.
    fn swap_quote_asset(
        &mut self,
        mut amm: Amm,
        dir: Direction,
        quote_amount: Decimal,
        base_amount_limit: Decimal,
    ) -> Result<(Amm, Decimal), EngineError> {
        let base = amm.swap_quote_asset(quote_amount, dir)?;
        check_user_limit(base_amount_limit, base, dir)?;
        self.save_amm(&amm)?;
        Ok((amm, base))
    }

    fn swap_base_asset(
        &mut self,
        mut amm: Amm,
        dir: Direction,
        base_amount: Decimal,
        quote_amount_limit: Decimal,
    ) -> Result<(Amm, Decimal), EngineError> {
        let quote = amm.swap_base_asset(base_amount, dir)?;
        check_user_limit(quote_amount_limit, quote, dir)?;
        self.save_amm(&amm)?;
        Ok((amm, quote))
    }

    // 4.9: the new mark price must stay within the band around the last committed snapshot
    fn check_price_fluctuation(&self, market: &Market, amm: &Amm) -> Result<(), EngineError> {
        let limit = market.price_fluctuation_limit_ratio;
        if limit.is_zero() {
            return Ok(());
        }
        let Some(snapshot) = self.committed_snapshot(&amm.pair)? else {
            return Ok(());
        };

        let reference = snapshot.amm.mark_price();
        let upper = quantize(reference * (Decimal::ONE + limit));
        let lower = quantize(reference * (Decimal::ONE - limit));
        let price = amm.mark_price();
        if price > upper || price < lower {
            return Err(EngineError::OverFluctuationLimit { price, lower, upper });
        }
        Ok(())
    }

    // 4.10: checks, vault transfer, fees, persist, event
    pub(super) fn after_position_update(
        &mut self,
        market: &Market,
        amm: &Amm,
        trader: &TraderAddr,
        resp: &PositionResp,
    ) -> Result<(), EngineError> {
        if !resp.bad_debt.is_zero() {
            return Err(EngineError::BadDebt(resp.bad_debt));
        }

        self.check_price_fluctuation(market, amm)?;

        if !resp.position.is_empty() {
            let spot = position_notional_spot(amm, &resp.position)?;
            let twap = self.position_notional_twap(&resp.position, market.twap_lookback_window_ms)?;
            let notional = preferred_notional(&resp.position, spot, twap);
            let cpf = market.latest_cumulative_premium_fraction;
            let ratio = margin_ratio(&resp.position, notional, cpf)?;
            if ratio < market.maintenance_margin_ratio {
                return Err(EngineError::MarginRatioTooLow {
                    ratio,
                    maintenance: market.maintenance_margin_ratio,
                });
            }
        }

        let margin_to_vault = round_int(resp.margin_to_vault);
        if margin_to_vault > Decimal::ZERO {
            self.transfer(Transfer::AccountToModule {
                from: trader.clone(),
                module: VAULT,
                denom: market.pair.quote_denom().to_string(),
                amount: margin_to_vault,
            })?;
        } else if margin_to_vault < Decimal::ZERO {
            self.withdraw(&market.pair, trader, margin_to_vault.abs())?;
        }

        let fee = self.transfer_fee(&market.pair, trader, resp.exchanged_notional)?;

        if !resp.position.is_empty() {
            self.save_position(&resp.position)?;
        }

        self.emit_position_changed(market, amm, trader, resp, fee);
        Ok(())
    }

    // exchange fee to the fee pool, ecosystem fee to the fund. both paid by the trader.
    fn transfer_fee(
        &mut self,
        pair: &Pair,
        trader: &TraderAddr,
        notional: Decimal,
    ) -> Result<Decimal, EngineError> {
        let market = self.market(pair)?;
        let denom = pair.quote_denom().to_string();

        let to_fee_pool = round_int(market.exchange_fee_ratio * notional);
        if to_fee_pool > Decimal::ZERO {
            self.transfer(Transfer::AccountToModule {
                from: trader.clone(),
                module: FEE_POOL,
                denom: denom.clone(),
                amount: to_fee_pool,
            })?;
        }

        let to_ecosystem_fund = round_int(market.ecosystem_fund_fee_ratio * notional);
        if to_ecosystem_fund > Decimal::ZERO {
            self.transfer(Transfer::AccountToModule {
                from: trader.clone(),
                module: ECOSYSTEM_FUND,
                denom,
                amount: to_ecosystem_fund,
            })?;
        }

        Ok(to_fee_pool + to_ecosystem_fund)
    }

    fn emit_position_changed(
        &mut self,
        market: &Market,
        amm: &Amm,
        trader: &TraderAddr,
        resp: &PositionResp,
        fee: Decimal,
    ) {
        let position = &resp.position;
        // notional implied by open notional and the pnl left after the change
        let position_notional = if position.is_long() {
            position.open_notional + resp.unrealized_pnl_after
        } else if position.is_short() {
            position.open_notional - resp.unrealized_pnl_after
        } else {
            Decimal::ZERO
        };

        self.emit(EventPayload::PositionChanged(PositionChangedEvent {
            pair: market.pair.clone(),
            trader: trader.clone(),
            margin: round_int(position.margin),
            position_notional,
            exchanged_notional: resp.exchanged_notional,
            exchanged_size: resp.exchanged_size,
            transaction_fee: fee,
            position_size: position.size,
            realized_pnl: resp.realized_pnl,
            unrealized_pnl_after: resp.unrealized_pnl_after,
            bad_debt: round_int(resp.bad_debt),
            funding_payment: resp.funding_payment,
            mark_price: amm.mark_price(),
        }));
    }
}
