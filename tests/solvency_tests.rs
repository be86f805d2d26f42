//! Settlement scenario tests.
//!
//! These tests walk the engine through trading, liquidation and bad debt
//! paths and check that every unit of quote ends up where it should.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_perps::*;

type TestEngine = Engine<BankLedger, StaticOracle>;

fn btc() -> Pair {
    Pair::new("ubtc", "unusd")
}

fn eth() -> Pair {
    Pair::new("ueth", "unusd")
}

fn atom() -> Pair {
    Pair::new("uatom", "unusd")
}

fn trader(name: &str) -> TraderAddr {
    TraderAddr::new(name)
}

fn engine_with(defaults: &MarketDefaults, pairs: &[Pair]) -> TestEngine {
    let mut engine =
        Engine::new(EngineConfig::default(), BankLedger::new(), StaticOracle::new()).unwrap();
    for pair in pairs {
        engine
            .create_market(defaults.market(pair.clone()), defaults.amm(pair.clone()).unwrap())
            .unwrap();
    }
    engine
}

fn engine(pairs: &[Pair]) -> TestEngine {
    engine_with(&MarketDefaults::default(), pairs)
}

fn balance(engine: &TestEngine, account: &str) -> Decimal {
    engine.ledger().balance(account, "unusd")
}

fn close_to(a: Decimal, b: Decimal, eps: Decimal) -> bool {
    (a - b).abs() <= eps
}

// size 10000, margin 1000. open notional decides how far underwater it is.
fn underwater_long(pair: &Pair, owner: &str, open_notional: Decimal) -> Position {
    Position::new(
        trader(owner),
        pair.clone(),
        dec!(10_000),
        dec!(1_000),
        open_notional,
        Decimal::ZERO,
        1,
    )
}

// ---- Opening and closing ----

#[test]
fn scenario_a_open_long() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_000));

    let resp = engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(100), dec!(10), Decimal::ZERO)
        .unwrap();

    assert_eq!(resp.position.margin, dec!(100));
    assert_eq!(resp.position.open_notional, dec!(1_000));
    assert!(close_to(resp.position.size, dec!(999.999999), dec!(0.00001)));
    assert_eq!(resp.exchanged_notional, dec!(1_000));
    assert_eq!(resp.margin_to_vault, dec!(100));
    assert_eq!(balance(&engine, VAULT), dec!(100));
}

#[test]
fn open_long_pays_margin_and_fees() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_020));

    let resp = engine
        .open_position(
            &pair,
            Direction::Long,
            &trader("alice"),
            dec!(1_000),
            dec!(10),
            Decimal::ZERO,
        )
        .unwrap();

    assert!(close_to(resp.position.size, dec!(9_999.9999), dec!(0.0001)));
    assert_eq!(resp.position.margin, dec!(1_000));
    assert_eq!(balance(&engine, "alice"), Decimal::ZERO);
    assert_eq!(balance(&engine, VAULT), dec!(1_000));
    assert_eq!(balance(&engine, FEE_POOL), dec!(10));
    assert_eq!(balance(&engine, ECOSYSTEM_FUND), dec!(10));

    let event = engine.events().last().unwrap();
    match &event.payload {
        EventPayload::PositionChanged(changed) => {
            assert_eq!(changed.transaction_fee, dec!(20));
            assert_eq!(changed.margin, dec!(1_000));
        }
        other => panic!("unexpected event {other:?}"),
    }

    engine.ledger_mut().mint("alice", "unusd", dec!(1_000));
    let resp = engine.add_margin(&pair, &trader("alice"), dec!(1_000)).unwrap();
    assert_eq!(resp.position.margin, dec!(2_000));
}

#[test]
fn open_short_and_grow() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("bob", "unusd", dec!(1_000));

    engine
        .open_position(&pair, Direction::Short, &trader("bob"), dec!(100), dec!(5), Decimal::ZERO)
        .unwrap();
    engine.advance_block(1_000);
    let resp = engine
        .open_position(&pair, Direction::Short, &trader("bob"), dec!(100), dec!(5), Decimal::ZERO)
        .unwrap();

    assert!(close_to(resp.position.size, dec!(-1_000), dec!(0.001)));
    assert!(close_to(resp.position.margin, dec!(200), dec!(0.001)));
    assert_eq!(resp.position.open_notional, dec!(1_000));
}

#[test]
fn reverse_flips_position() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_000));

    engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(100), dec!(5), Decimal::ZERO)
        .unwrap();
    engine.advance_block(1_000);
    let resp = engine
        .open_position(&pair, Direction::Short, &trader("alice"), dec!(200), dec!(5), Decimal::ZERO)
        .unwrap();

    assert!(close_to(resp.position.size, dec!(-500), dec!(0.001)));
    assert!(close_to(resp.position.margin, dec!(100), dec!(0.001)));
    assert!(close_to(resp.position.open_notional, dec!(500), dec!(0.001)));
    assert!(close_to(resp.exchanged_notional, dec!(1_000), dec!(0.001)));
}

#[test]
fn smaller_opposite_trade_reduces() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_000));

    engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(200), dec!(5), Decimal::ZERO)
        .unwrap();
    engine.advance_block(1_000);
    let resp = engine
        .open_position(&pair, Direction::Short, &trader("alice"), dec!(100), dec!(5), Decimal::ZERO)
        .unwrap();

    // half the size is closed, the margin stays with the position
    assert!(close_to(resp.position.size, dec!(500), dec!(0.001)));
    assert!(close_to(resp.position.margin, dec!(200), dec!(0.001)));
    assert!(close_to(resp.position.open_notional, dec!(500), dec!(0.001)));
}

#[test]
fn close_pays_out_margin() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_020));
    engine
        .open_position(
            &pair,
            Direction::Long,
            &trader("alice"),
            dec!(1_000),
            dec!(10),
            Decimal::ZERO,
        )
        .unwrap();

    engine.advance_block(1_000);
    let resp = engine.close_position(&pair, &trader("alice")).unwrap();

    assert!(resp.position.is_empty());
    assert!(close_to(resp.margin_to_vault, dec!(-1_000), dec!(0.001)));
    assert!(engine.state().position(&pair, &trader("alice")).unwrap().is_none());
    // 1000 back, 20 paid in fees on the way out
    assert_eq!(balance(&engine, "alice"), dec!(980));
    assert_eq!(balance(&engine, VAULT), Decimal::ZERO);
}

#[test]
fn partial_close_halves_position() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_100));
    let resp = engine
        .open_position(
            &pair,
            Direction::Long,
            &trader("alice"),
            dec!(1_000),
            dec!(10),
            Decimal::ZERO,
        )
        .unwrap();

    engine.advance_block(1_000);
    let half = resp.position.size / dec!(2);
    let resp = engine.partial_close(&pair, &trader("alice"), half).unwrap();

    assert!(close_to(resp.position.size, dec!(5_000), dec!(0.01)));
    assert!(close_to(resp.position.margin, dec!(1_000), dec!(0.01)));
    assert!(close_to(resp.position.open_notional, dec!(5_000), dec!(0.01)));
}

#[test]
fn partial_close_beyond_size_closes() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_100));
    engine
        .open_position(
            &pair,
            Direction::Long,
            &trader("alice"),
            dec!(1_000),
            dec!(10),
            Decimal::ZERO,
        )
        .unwrap();

    engine.advance_block(1_000);
    engine.partial_close(&pair, &trader("alice"), dec!(1_000_000)).unwrap();
    assert!(engine.state().position(&pair, &trader("alice")).unwrap().is_none());
}

#[test]
fn close_underwater_realizes_bad_debt() {
    let pair = btc();
    let mut engine = engine_with(&MarketDefaults::testnet(), &[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(100));
    engine.ledger_mut().mint("bob", "unusd", dec!(4_000_000_000));
    engine.ledger_mut().mint(ECOSYSTEM_FUND, "unusd", dec!(100));

    engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(100), dec!(10), Decimal::ZERO)
        .unwrap();
    // a large short drags the mark ~15% down
    engine
        .open_position(
            &pair,
            Direction::Short,
            &trader("bob"),
            dec!(3_900_000_000),
            dec!(20),
            Decimal::ZERO,
        )
        .unwrap();

    let resp = engine.close_position(&pair, &trader("alice")).unwrap();

    let drawn = dec!(100) - balance(&engine, ECOSYSTEM_FUND);
    assert!(drawn >= dec!(45) && drawn <= dec!(55), "drawn {drawn}");
    assert!(close_to(resp.bad_debt, drawn, dec!(1)));
    assert_eq!(balance(&engine, "alice"), Decimal::ZERO);
    assert!(engine.state().position(&pair, &trader("alice")).unwrap().is_none());
    assert!(engine
        .events()
        .iter()
        .any(|e| matches!(e.payload, EventPayload::BadDebtRealized(_))));
}

// ---- Rejections leave no trace ----

#[test]
fn failed_open_changes_nothing() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(50));
    let amm_before = engine.state().amm(&pair).unwrap();
    let snapshots_before = engine.state().snapshots(&pair).unwrap().len();
    let events_before = engine.events().len();

    engine.advance_block(1_000);
    let err = engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(100), dec!(10), Decimal::ZERO)
        .unwrap_err();

    assert!(matches!(err, EngineError::Ledger(LedgerError::InsufficientFunds { .. })));
    assert_eq!(engine.state().amm(&pair).unwrap(), amm_before);
    assert_eq!(engine.state().snapshots(&pair).unwrap().len(), snapshots_before);
    assert_eq!(engine.events().len(), events_before);
    assert_eq!(balance(&engine, "alice"), dec!(50));
    assert_eq!(engine.state().position_count(), 0);
}

#[test]
fn open_preconditions() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    let alice = trader("alice");

    let err = engine
        .open_position(&pair, Direction::Long, &alice, Decimal::ZERO, dec!(10), Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(err, EngineError::QuoteAmountIsZero(_)));

    let err = engine
        .open_position(&pair, Direction::Long, &alice, dec!(100), dec!(11), Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(err, EngineError::LeverageIsTooHigh { .. }));

    let err = engine
        .open_position(
            &Pair::new("usol", "unusd"),
            Direction::Long,
            &alice,
            dec!(100),
            dec!(1),
            Decimal::ZERO,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::PairNotFound(_)));

    engine.close_market(&pair).unwrap();
    let err = engine
        .open_position(&pair, Direction::Long, &alice, dec!(100), dec!(1), Decimal::ZERO)
        .unwrap_err();
    assert_eq!(err, EngineError::MarketNotEnabled(pair));
}

#[test]
fn fractional_amounts_rejected() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    let alice = trader("alice");
    engine.ledger_mut().mint("alice", "unusd", dec!(1_000));
    engine
        .open_position(&pair, Direction::Long, &alice, dec!(100), dec!(2), Decimal::ZERO)
        .unwrap();
    let position_before = engine.state().position(&pair, &alice).unwrap();
    let alice_before = balance(&engine, "alice");
    let vault_before = balance(&engine, VAULT);
    let events_before = engine.events().len();

    // ten fractional deposits followed by a withdrawal must not drain the vault
    for _ in 0..10 {
        let err = engine.add_margin(&pair, &alice, dec!(2.5)).unwrap_err();
        assert!(matches!(err, EngineError::NonIntegerAmount { .. }));
    }
    let err = engine.remove_margin(&pair, &alice, dec!(0.5)).unwrap_err();
    assert!(matches!(err, EngineError::NonIntegerAmount { .. }));
    let err = engine
        .open_position(&pair, Direction::Long, &alice, dec!(2.5), dec!(2), Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(err, EngineError::NonIntegerAmount { .. }));

    assert_eq!(engine.state().position(&pair, &alice).unwrap(), position_before);
    assert_eq!(balance(&engine, "alice"), alice_before);
    assert_eq!(balance(&engine, VAULT), vault_before);
    assert_eq!(engine.events().len(), events_before);

    // whole amounts still move exactly what the position records
    engine.add_margin(&pair, &alice, dec!(3)).unwrap();
    engine.remove_margin(&pair, &alice, dec!(3)).unwrap();
    assert_eq!(balance(&engine, VAULT), vault_before);
    assert_eq!(balance(&engine, "alice"), alice_before);
}

#[test]
fn oversized_open_is_an_error() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    let alice = trader("alice");
    let quote = dec!(10_000_000_000_000_000_000_000_000_000);
    engine.ledger_mut().mint("alice", "unusd", quote);
    let amm_before = engine.state().amm(&pair).unwrap();

    let err = engine
        .open_position(&pair, Direction::Long, &alice, quote, dec!(10), Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(err, EngineError::Overflow(_)));
    assert_eq!(engine.state().amm(&pair).unwrap(), amm_before);
    assert_eq!(balance(&engine, "alice"), quote);
    assert_eq!(engine.state().position_count(), 0);
}

#[test]
fn zero_size_partial_close_rejected() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_000));
    engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(100), dec!(2), Decimal::ZERO)
        .unwrap();

    let err = engine.partial_close(&pair, &trader("alice"), Decimal::ZERO).unwrap_err();
    assert_eq!(err, EngineError::BaseAmountIsZero(Decimal::ZERO));
}

#[test]
fn base_limit_rejects_slippage() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_100));

    // 10000 quote buys a little under 10000 base
    let err = engine
        .open_position(
            &pair,
            Direction::Long,
            &trader("alice"),
            dec!(1_000),
            dec!(10),
            dec!(10_000),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::AssetFailsUserLimit { .. }));

    engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(1_000), dec!(10), dec!(9_999))
        .unwrap();
}

#[test]
fn fluctuation_limit_blocks_large_move() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("whale", "unusd", dec!(20_000_000_000));
    engine.advance_block(1_000);

    // 1e11 quote into a 1e12 pool lifts the mark ~21%, the band is 10%
    let err = engine
        .open_position(
            &pair,
            Direction::Long,
            &trader("whale"),
            dec!(10_000_000_000),
            dec!(10),
            Decimal::ZERO,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::OverFluctuationLimit { .. }));
    assert_eq!(engine.state().amm(&pair).unwrap().unwrap().mark_price(), Decimal::ONE);
}

// ---- Liquidations ----

#[test]
fn partial_liquidation() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint(VAULT, "unusd", dec!(1_000));
    engine.import_position(underwater_long(&pair, "alice", dec!(10_400))).unwrap();

    let resp = engine.liquidate(&trader("liquidator"), &pair, &trader("alice")).unwrap();

    assert_eq!(resp.fee_to_liquidator, dec!(125));
    assert_eq!(resp.fee_to_ecosystem_fund, dec!(125));
    assert_eq!(balance(&engine, VAULT), dec!(750));
    assert_eq!(balance(&engine, ECOSYSTEM_FUND), dec!(125));
    assert_eq!(balance(&engine, "liquidator"), dec!(125));

    let left = engine.state().position(&pair, &trader("alice")).unwrap().unwrap();
    assert!(close_to(left.size, dec!(5_000), dec!(0.0001)));
    assert!(close_to(left.margin, dec!(549.99995), dec!(0.001)));
    assert!(close_to(left.open_notional, dec!(5_200), dec!(0.01)));
}

#[test]
fn full_liquidation() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint(VAULT, "unusd", dec!(1_000));
    engine.import_position(underwater_long(&pair, "alice", dec!(10_600))).unwrap();

    let resp = engine.liquidate(&trader("liquidator"), &pair, &trader("alice")).unwrap();

    assert_eq!(resp.fee_to_liquidator, dec!(250));
    assert_eq!(resp.fee_to_ecosystem_fund, dec!(150));
    assert_eq!(resp.bad_debt, Decimal::ZERO);
    assert_eq!(balance(&engine, VAULT), dec!(600));
    assert_eq!(balance(&engine, ECOSYSTEM_FUND), dec!(150));
    assert_eq!(balance(&engine, "liquidator"), dec!(250));
    assert!(engine.state().position(&pair, &trader("alice")).unwrap().is_none());
}

#[test]
fn full_liquidation_with_bad_debt() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint(VAULT, "unusd", dec!(1_000));
    engine.ledger_mut().mint(ECOSYSTEM_FUND, "unusd", dec!(50));
    engine.import_position(underwater_long(&pair, "alice", dec!(10_800))).unwrap();

    let resp = engine.liquidate(&trader("liquidator"), &pair, &trader("alice")).unwrap();

    assert_eq!(resp.bad_debt, dec!(50));
    assert_eq!(resp.fee_to_liquidator, dec!(250));
    assert_eq!(resp.fee_to_ecosystem_fund, Decimal::ZERO);
    assert_eq!(balance(&engine, VAULT), dec!(800));
    assert_eq!(balance(&engine, ECOSYSTEM_FUND), Decimal::ZERO);
    assert_eq!(balance(&engine, "liquidator"), dec!(250));
}

#[test]
fn full_liquidation_consumes_prepaid_bad_debt() {
    let pair = btc();
    let mut engine =
        Engine::new(EngineConfig::default(), BankLedger::new(), StaticOracle::new()).unwrap();
    let defaults = MarketDefaults::default();
    engine
        .create_market(
            defaults.market(pair.clone()).with_prepaid_bad_debt(dec!(50)),
            defaults.amm(pair.clone()).unwrap(),
        )
        .unwrap();
    engine.ledger_mut().mint(VAULT, "unusd", dec!(1_000));
    engine.import_position(underwater_long(&pair, "alice", dec!(10_800))).unwrap();

    engine.liquidate(&trader("liquidator"), &pair, &trader("alice")).unwrap();

    assert_eq!(balance(&engine, VAULT), dec!(750));
    assert_eq!(balance(&engine, ECOSYSTEM_FUND), Decimal::ZERO);
    assert_eq!(engine.state().market(&pair).unwrap().unwrap().prepaid_bad_debt, Decimal::ZERO);
}

#[test]
fn scenario_c_mixed_batch() {
    let mut engine = engine(&[btc(), eth(), atom()]);
    engine.ledger_mut().mint(VAULT, "unusd", dec!(3_000));
    engine.import_position(underwater_long(&btc(), "alice", dec!(10_400))).unwrap();
    engine.import_position(underwater_long(&eth(), "alice", dec!(10_600))).unwrap();
    engine.import_position(underwater_long(&atom(), "alice", dec!(10_000))).unwrap();
    let healthy_before = engine.state().position(&atom(), &trader("alice")).unwrap();

    let requests = vec![
        LiquidateRequest::new(btc(), trader("alice")),
        LiquidateRequest::new(eth(), trader("alice")),
        LiquidateRequest::new(atom(), trader("alice")),
        LiquidateRequest::new(Pair::new("usol", "unusd"), trader("alice")),
        LiquidateRequest::new(btc(), trader("bob")),
    ];
    let responses = engine.multi_liquidate(&trader("liquidator"), &requests, None).unwrap();

    let outcomes: Vec<bool> = responses.iter().map(|r| r.success).collect();
    assert_eq!(outcomes, vec![true, true, false, false, false]);
    assert_eq!(responses[0].liquidator_fee, dec!(125));
    assert_eq!(responses[1].liquidator_fee, dec!(250));
    assert!(responses[2].error.is_some());

    assert_eq!(balance(&engine, VAULT), dec!(2_350));
    assert_eq!(balance(&engine, ECOSYSTEM_FUND), dec!(275));
    assert_eq!(balance(&engine, "liquidator"), dec!(375));
    assert_eq!(engine.state().position(&atom(), &trader("alice")).unwrap(), healthy_before);

    let reasons: Vec<LiquidationFailedReason> = engine
        .events()
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::LiquidationFailed(failed) => Some(failed.reason),
            _ => None,
        })
        .collect();
    assert_eq!(
        reasons,
        vec![
            LiquidationFailedReason::PositionHealthy,
            LiquidationFailedReason::NonexistentPair,
            LiquidationFailedReason::NonexistentPosition,
        ]
    );
}

#[test]
fn batch_rolls_back_when_all_must_succeed() {
    let mut engine = engine(&[btc(), atom()]);
    engine.ledger_mut().mint(VAULT, "unusd", dec!(2_000));
    engine.import_position(underwater_long(&btc(), "alice", dec!(10_400))).unwrap();
    engine.import_position(underwater_long(&atom(), "alice", dec!(10_000))).unwrap();
    let btc_before = engine.state().position(&btc(), &trader("alice")).unwrap();
    let events_before = engine.events().len();

    let requests = vec![
        LiquidateRequest::new(btc(), trader("alice")),
        LiquidateRequest::new(atom(), trader("alice")),
    ];
    let err = engine
        .multi_liquidate(&trader("liquidator"), &requests, Some(true))
        .unwrap_err();

    match err {
        EngineError::LiquidationBatchRejected(responses) => {
            assert!(responses[0].success);
            assert!(!responses[1].success);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(balance(&engine, VAULT), dec!(2_000));
    assert_eq!(balance(&engine, "liquidator"), Decimal::ZERO);
    assert_eq!(engine.state().position(&btc(), &trader("alice")).unwrap(), btc_before);
    assert_eq!(engine.events().len(), events_before);
}

// ---- Vault and TWAP ----

#[test]
fn scenario_d_withdraw_shortfall() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint(VAULT, "unusd", dec!(500));
    engine.ledger_mut().mint(ECOSYSTEM_FUND, "unusd", dec!(2_000));

    engine.withdraw(&pair, &trader("bob"), dec!(1_000)).unwrap();

    assert_eq!(balance(&engine, "bob"), dec!(1_000));
    assert_eq!(balance(&engine, ECOSYSTEM_FUND), dec!(1_500));
    assert_eq!(balance(&engine, VAULT), Decimal::ZERO);
    assert_eq!(engine.state().market(&pair).unwrap().unwrap().prepaid_bad_debt, dec!(500));
}

#[test]
fn scenario_b_position_notional_twap() {
    let pair = btc();
    let mut engine =
        Engine::new(EngineConfig::default(), BankLedger::new(), StaticOracle::new()).unwrap();
    let defaults = MarketDefaults::default();

    engine.set_block(1, Timestamp::from_millis(10));
    let amm = Amm::new(pair.clone(), dec!(1_000_000_000_000), dec!(9)).unwrap();
    engine.create_market(defaults.market(pair.clone()), amm).unwrap();

    engine.set_block(2, Timestamp::from_millis(20));
    engine.shift_peg_multiplier(&pair, dec!(8.5)).unwrap();

    engine.set_block(3, Timestamp::from_millis(30));
    engine.shift_peg_multiplier(&pair, dec!(9.5)).unwrap();
    engine
        .import_position(Position::new(
            trader("alice"),
            pair.clone(),
            dec!(10),
            dec!(10),
            dec!(90),
            Decimal::ZERO,
            3,
        ))
        .unwrap();

    engine.set_block(4, Timestamp::from_millis(40));
    let twap = engine.position_notional_twap(&pair, &trader("alice"), 30).unwrap();
    assert!(close_to(twap, dec!(89.9999999991), dec!(0.000000001)), "twap {twap}");
}

#[test]
fn snapshot_log_is_append_only() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(10_000));
    let genesis = engine.state().snapshots(&pair).unwrap()[0].clone();
    let before = engine.snapshot_count(&pair).unwrap();

    for _ in 0..5 {
        engine.advance_block(1_000);
        engine
            .open_position(
                &pair,
                Direction::Long,
                &trader("alice"),
                dec!(10),
                dec!(2),
                Decimal::ZERO,
            )
            .unwrap();
    }

    let snapshots = engine.state().snapshots(&pair).unwrap();
    assert_eq!(snapshots.len(), before + 5);
    assert_eq!(snapshots[0], genesis);
    assert!(snapshots.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn event_ids_increase() {
    let pair = btc();
    let mut engine = engine(&[pair.clone()]);
    engine.ledger_mut().mint("alice", "unusd", dec!(1_000));
    engine
        .open_position(&pair, Direction::Long, &trader("alice"), dec!(100), dec!(2), Decimal::ZERO)
        .unwrap();
    engine.advance_block(1_000);
    engine.close_position(&pair, &trader("alice")).unwrap();

    let ids: Vec<u64> = engine.events().iter().map(|e| e.id.0).collect();
    assert!(ids.len() >= 3);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}
