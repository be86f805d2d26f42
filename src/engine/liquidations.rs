//! Liquidation of positions below maintenance margin.
//!
//! A position is liquidatable when its margin ratio, valued at the notional
//! more favourable to the trader, is under the market's maintenance ratio.
//! Positions still holding at least the liquidation fee ratio at spot are
//! partially closed. The rest are closed entirely and any shortfall is
//! realized as bad debt.

use super::core::Engine;
use super::results::{EngineError, LiquidateRequest, LiquidateResp, LiquidationResponse};
use super::state::Tx;
use crate::amm::Amm;
use crate::calc::{margin_ratio, position_notional_spot, preferred_notional};
use crate::events::{
    EventPayload, LiquidationFailedEvent, LiquidationFailedReason, PositionLiquidatedEvent,
};
use crate::ledger::{Ledger, Transfer, ECOSYSTEM_FUND, VAULT};
use crate::market::Market;
use crate::oracle::Oracle;
use crate::position::Position;
use crate::types::{quantize, round_int, Direction, Pair, TraderAddr};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

impl<L: Ledger, O: Oracle> Engine<L, O> {
    /// Liquidates one position. a failure commits nothing.
    pub fn liquidate(
        &mut self,
        liquidator: &TraderAddr,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<LiquidateResp, EngineError> {
        match self.execute(|tx| tx.liquidate(liquidator, pair, trader)) {
            Ok(resp) => {
                tracing::info!(
                    %pair,
                    %trader,
                    %liquidator,
                    fee_to_liquidator = %resp.fee_to_liquidator,
                    fee_to_ecosystem_fund = %resp.fee_to_ecosystem_fund,
                    bad_debt = %resp.bad_debt,
                    "position liquidated"
                );
                Ok(resp)
            }
            Err(err) => {
                tracing::warn!(%pair, %trader, %liquidator, error = %err, "liquidation failed");
                Err(err)
            }
        }
    }

    /// Liquidates a batch. Each request is isolated: a failed one leaves no
    /// trace except a `LiquidationFailed` event. When every request fails, or
    /// any fails with `all_must_succeed`, the whole batch is rejected.
    /// `None` falls back to the engine config.
    pub fn multi_liquidate(
        &mut self,
        liquidator: &TraderAddr,
        requests: &[LiquidateRequest],
        all_must_succeed: Option<bool>,
    ) -> Result<Vec<LiquidationResponse>, EngineError> {
        let all_must_succeed =
            all_must_succeed.unwrap_or(self.config.all_liquidations_must_succeed_default);

        let responses = self.execute(|tx| {
            let mut responses = Vec::with_capacity(requests.len());

            for request in requests {
                // each request runs on a fork of the batch, adopted only on success
                let mut attempt = tx.clone();
                match attempt.liquidate(liquidator, &request.pair, &request.trader) {
                    Ok(resp) => {
                        *tx = attempt;
                        responses.push(LiquidationResponse {
                            success: true,
                            error: None,
                            liquidator_fee: resp.fee_to_liquidator,
                            ecosystem_fund_fee: resp.fee_to_ecosystem_fund,
                            pair: request.pair.clone(),
                            trader: request.trader.clone(),
                        });
                    }
                    Err(err) => {
                        tracing::warn!(
                            pair = %request.pair,
                            trader = %request.trader,
                            error = %err,
                            "liquidation failed"
                        );
                        tx.emit(EventPayload::LiquidationFailed(LiquidationFailedEvent {
                            pair: request.pair.clone(),
                            trader: request.trader.clone(),
                            liquidator: liquidator.clone(),
                            reason: failure_reason(&err),
                        }));
                        responses.push(LiquidationResponse {
                            success: false,
                            error: Some(err.to_string()),
                            liquidator_fee: Decimal::ZERO,
                            ecosystem_fund_fee: Decimal::ZERO,
                            pair: request.pair.clone(),
                            trader: request.trader.clone(),
                        });
                    }
                }
            }

            let failed = responses.iter().filter(|r| !r.success).count();
            if !responses.is_empty() && failed == responses.len() {
                return Err(EngineError::AllLiquidationsFailed(responses));
            }
            if all_must_succeed && failed > 0 {
                return Err(EngineError::LiquidationBatchRejected(responses));
            }
            Ok(responses)
        })?;

        tracing::info!(
            %liquidator,
            requested = requests.len(),
            succeeded = responses.iter().filter(|r| r.success).count(),
            "batch liquidation committed"
        );
        Ok(responses)
    }
}

pub(super) fn failure_reason(err: &EngineError) -> LiquidationFailedReason {
    match err {
        EngineError::PairNotFound(_) => LiquidationFailedReason::NonexistentPair,
        EngineError::PositionNotFound { .. } => LiquidationFailedReason::NonexistentPosition,
        EngineError::MarginRatioTooHigh { .. } => LiquidationFailedReason::PositionHealthy,
        _ => LiquidationFailedReason::Unspecified,
    }
}

impl<'a> Tx<'a> {
    pub(super) fn liquidate(
        &mut self,
        liquidator: &TraderAddr,
        pair: &Pair,
        trader: &TraderAddr,
    ) -> Result<LiquidateResp, EngineError> {
        let market = self.market(pair)?;
        let amm = self.amm(pair)?;
        let position = self.position(pair, trader)?;

        let cpf = market.latest_cumulative_premium_fraction;
        let spot = position_notional_spot(&amm, &position)?;
        let twap = self.position_notional_twap(&position, market.twap_lookback_window_ms)?;

        let ratio = margin_ratio(&position, preferred_notional(&position, spot, twap), cpf)?;
        if ratio >= market.maintenance_margin_ratio {
            return Err(EngineError::MarginRatioTooHigh {
                ratio,
                maintenance: market.maintenance_margin_ratio,
            });
        }

        let spot_ratio = margin_ratio(&position, spot, cpf)?;
        tracing::debug!(%pair, %trader, %ratio, %spot_ratio, "position under maintenance");

        if spot_ratio >= market.liquidation_fee_ratio {
            self.liquidate_partially(liquidator, &market, amm, &position)
        } else {
            self.liquidate_fully(liquidator, &market, amm, &position)
        }
    }

    // close everything. the liquidator takes half the fee first, the fund gets what margin is left.
    fn liquidate_fully(
        &mut self,
        liquidator: &TraderAddr,
        market: &Market,
        amm: Amm,
        position: &Position,
    ) -> Result<LiquidateResp, EngineError> {
        let mark_price = amm.mark_price();
        let (_, position_resp) =
            self.close_position_entirely(market, amm, position, Decimal::ZERO)?;

        let mut remaining_margin = position_resp.margin_to_vault.abs();
        let mut bad_debt = position_resp.bad_debt;

        let liquidation_fee = market.liquidation_fee_ratio * position_resp.exchanged_notional;
        let fee_to_liquidator = quantize(liquidation_fee / dec!(2));
        if fee_to_liquidator > remaining_margin {
            // the vault fronts the part of the fee the margin cannot cover
            bad_debt += fee_to_liquidator - remaining_margin;
            remaining_margin = Decimal::ZERO;
        } else {
            remaining_margin -= fee_to_liquidator;
        }

        if bad_debt > Decimal::ZERO {
            self.realize_bad_debt(&market.pair, round_int(bad_debt))?;
        }

        let resp = LiquidateResp {
            bad_debt: round_int(bad_debt),
            fee_to_liquidator: round_int(fee_to_liquidator),
            fee_to_ecosystem_fund: round_int(remaining_margin),
            liquidator: liquidator.clone(),
            position_resp,
        };

        self.distribute_liquidate_rewards(market, &resp)?;
        self.emit_position_liquidated(position, &resp, mark_price);
        Ok(resp)
    }

    // close `partial_liquidation_ratio` of the size. the fee comes out of the remaining margin.
    fn liquidate_partially(
        &mut self,
        liquidator: &TraderAddr,
        market: &Market,
        amm: Amm,
        position: &Position,
    ) -> Result<LiquidateResp, EngineError> {
        let dir = Direction::closing(position.size);
        let base = quantize(position.size.abs() * market.partial_liquidation_ratio);
        let quote_reserve = amm.get_quote_reserve_amt(base, dir)?;
        let quote_delta = amm.quote_reserve_to_asset(quote_reserve)?;

        let (updated_amm, mut position_resp) =
            self.decrease_position(market, amm, position, quote_delta, Decimal::ZERO)?;

        let fee = quantize(quote_delta * market.liquidation_fee_ratio);
        position_resp.position.margin -= fee;
        if position_resp.position.margin < Decimal::ZERO {
            return Err(EngineError::NegativeValue {
                what: "margin after liquidation fee",
                value: position_resp.position.margin,
            });
        }
        self.save_position(&position_resp.position)?;

        let fee_to_liquidator = quantize(fee / dec!(2));
        let fee_to_ecosystem_fund = fee - fee_to_liquidator;

        let resp = LiquidateResp {
            bad_debt: Decimal::ZERO,
            fee_to_liquidator: round_int(fee_to_liquidator),
            fee_to_ecosystem_fund: round_int(fee_to_ecosystem_fund),
            liquidator: liquidator.clone(),
            position_resp,
        };

        self.distribute_liquidate_rewards(market, &resp)?;
        self.emit_position_liquidated(position, &resp, updated_amm.mark_price());
        Ok(resp)
    }

    fn distribute_liquidate_rewards(
        &mut self,
        market: &Market,
        resp: &LiquidateResp,
    ) -> Result<(), EngineError> {
        if resp.fee_to_ecosystem_fund > Decimal::ZERO {
            self.transfer(Transfer::ModuleToModule {
                from: VAULT,
                to: ECOSYSTEM_FUND,
                denom: market.pair.quote_denom().to_string(),
                amount: resp.fee_to_ecosystem_fund,
            })?;
        }
        if resp.fee_to_liquidator > Decimal::ZERO {
            self.withdraw(&market.pair, &resp.liquidator, resp.fee_to_liquidator)?;
        }
        Ok(())
    }

    fn emit_position_liquidated(
        &mut self,
        liquidated: &Position,
        resp: &LiquidateResp,
        mark_price: Decimal,
    ) {
        let after = &resp.position_resp;
        self.emit(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
            pair: liquidated.pair.clone(),
            trader: liquidated.trader.clone(),
            liquidator: resp.liquidator.clone(),
            exchanged_quote_amount: after.exchanged_notional,
            exchanged_position_size: after.exchanged_size,
            fee_to_liquidator: resp.fee_to_liquidator,
            fee_to_ecosystem_fund: resp.fee_to_ecosystem_fund,
            bad_debt: resp.bad_debt,
            margin: round_int(after.position.margin),
            position_notional: after.position_notional,
            position_size: after.position.size,
            unrealized_pnl: after.unrealized_pnl_after,
            mark_price,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, MarketDefaults};
    use crate::ledger::BankLedger;
    use crate::oracle::StaticOracle;

    fn setup() -> (Engine<BankLedger, StaticOracle>, Pair) {
        let pair = Pair::new("ubtc", "unusd");
        let mut engine =
            Engine::new(EngineConfig::default(), BankLedger::new(), StaticOracle::new()).unwrap();
        let defaults = MarketDefaults::default();
        engine
            .create_market(defaults.market(pair.clone()), defaults.amm(pair.clone()).unwrap())
            .unwrap();
        engine.ledger_mut().mint(VAULT, "unusd", dec!(1_000));
        (engine, pair)
    }

    fn long(pair: &Pair, trader: &str, open_notional: Decimal) -> Position {
        Position::new(
            TraderAddr::new(trader),
            pair.clone(),
            dec!(10_000),
            dec!(1_000),
            open_notional,
            Decimal::ZERO,
            1,
        )
    }

    #[test]
    fn failure_reasons() {
        let pair = Pair::new("ubtc", "unusd");
        assert_eq!(
            failure_reason(&EngineError::PairNotFound(pair.clone())),
            LiquidationFailedReason::NonexistentPair
        );
        assert_eq!(
            failure_reason(&EngineError::PositionNotFound {
                pair,
                trader: TraderAddr::new("bob")
            }),
            LiquidationFailedReason::NonexistentPosition
        );
        assert_eq!(
            failure_reason(&EngineError::MarginRatioTooHigh {
                ratio: dec!(0.1),
                maintenance: dec!(0.0625)
            }),
            LiquidationFailedReason::PositionHealthy
        );
        assert_eq!(
            failure_reason(&EngineError::BadDebt(dec!(1))),
            LiquidationFailedReason::Unspecified
        );
    }

    #[test]
    fn partial_liquidation_splits_fee() {
        let (mut engine, pair) = setup();
        engine.import_position(long(&pair, "alice", dec!(10_400))).unwrap();
        let liquidator = TraderAddr::new("liquidator");

        let resp = engine.liquidate(&liquidator, &pair, &TraderAddr::new("alice")).unwrap();

        assert_eq!(resp.fee_to_liquidator, dec!(125));
        assert_eq!(resp.fee_to_ecosystem_fund, dec!(125));
        assert_eq!(resp.bad_debt, Decimal::ZERO);
        assert_eq!(engine.ledger().balance(VAULT, "unusd"), dec!(750));
        assert_eq!(engine.ledger().balance(ECOSYSTEM_FUND, "unusd"), dec!(125));
        assert_eq!(engine.ledger().balance("liquidator", "unusd"), dec!(125));

        let left = engine.state().position(&pair, &TraderAddr::new("alice")).unwrap().unwrap();
        assert!((left.size - dec!(5_000)).abs() < dec!(0.001));
        assert!((left.margin - dec!(550)).abs() < dec!(0.001));
    }

    #[test]
    fn full_liquidation_deletes_position() {
        let (mut engine, pair) = setup();
        engine.import_position(long(&pair, "alice", dec!(10_600))).unwrap();

        let liquidator = TraderAddr::new("liquidator");
        let resp = engine.liquidate(&liquidator, &pair, &TraderAddr::new("alice")).unwrap();

        assert_eq!(resp.fee_to_liquidator, dec!(250));
        assert_eq!(resp.fee_to_ecosystem_fund, dec!(150));
        assert_eq!(engine.ledger().balance(VAULT, "unusd"), dec!(600));
        assert_eq!(engine.ledger().balance(ECOSYSTEM_FUND, "unusd"), dec!(150));
        assert!(engine.state().position(&pair, &TraderAddr::new("alice")).unwrap().is_none());
    }

    #[test]
    fn healthy_position_is_rejected() {
        let (mut engine, pair) = setup();
        let alice = TraderAddr::new("alice");
        let healthy = Position::new(
            alice.clone(),
            pair.clone(),
            dec!(100),
            dec!(10),
            dec!(100),
            Decimal::ZERO,
            1,
        );
        engine.import_position(healthy).unwrap();
        let events_before = engine.events().len();

        let err = engine.liquidate(&TraderAddr::new("liquidator"), &pair, &alice).unwrap_err();
        assert!(matches!(err, EngineError::MarginRatioTooHigh { .. }));
        assert_eq!(engine.events().len(), events_before);
        assert_eq!(engine.ledger().balance(VAULT, "unusd"), dec!(1_000));
    }

    #[test]
    fn batch_with_every_request_failing() {
        let (mut engine, pair) = setup();
        let requests = vec![LiquidateRequest::new(pair, TraderAddr::new("nobody"))];

        let liquidator = TraderAddr::new("liquidator");
        let err = engine.multi_liquidate(&liquidator, &requests, None).unwrap_err();
        match err {
            EngineError::AllLiquidationsFailed(responses) => {
                assert_eq!(responses.len(), 1);
                assert!(!responses[0].success);
                assert!(responses[0].error.is_some());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
