//! vAMM perp settlement simulation.
//!
//! Runs the engine through trading, funding, liquidation and bad debt
//! scenarios against an in-memory bank and a static oracle.

use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_perps::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    All,
    Trading,
    Twap,
    Funding,
    Liquidation,
    BadDebt,
    Repeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Env {
    Development,
    Testnet,
    Mainnet,
}

impl From<Env> for Environment {
    fn from(env: Env) -> Self {
        match env {
            Env::Development => Environment::Development,
            Env::Testnet => Environment::Testnet,
            Env::Mainnet => Environment::Mainnet,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "perp-sim", about = "vAMM perpetual settlement simulation")]
struct Args {
    /// Scenario to run.
    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Log filter, e.g. `info` or `vamm_perps=debug`.
    #[arg(long, default_value = "info")]
    log: String,

    /// Market parameter preset.
    #[arg(long, value_enum, default_value_t = Env::Development)]
    env: Env,
}

type SimEngine = Engine<BankLedger, StaticOracle>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter(args.log.as_str()).init();

    let defaults = Environment::from(args.env).market_defaults();
    defaults.validate()?;

    println!("vAMM Perpetual Settlement Simulation ({:?} parameters)\n", args.env);

    let run = |scenario: Scenario| args.scenario == Scenario::All || args.scenario == scenario;
    if run(Scenario::Trading) {
        scenario_trading(&defaults)?;
    }
    if run(Scenario::Twap) {
        scenario_twap(&defaults)?;
    }
    if run(Scenario::Funding) {
        scenario_funding(&defaults)?;
    }
    if run(Scenario::Liquidation) {
        scenario_liquidation(&defaults)?;
    }
    if run(Scenario::BadDebt) {
        scenario_bad_debt(&defaults)?;
    }
    if run(Scenario::Repeg) {
        scenario_repeg(&defaults)?;
    }

    println!("\nAll simulations completed.");
    Ok(())
}

fn btc() -> Pair {
    Pair::new("ubtc", "unusd")
}

fn new_engine(defaults: &MarketDefaults, pairs: &[Pair]) -> Result<SimEngine, EngineError> {
    let mut engine = Engine::new(EngineConfig::default(), BankLedger::new(), StaticOracle::new())?;
    for pair in pairs {
        engine.create_market(defaults.market(pair.clone()), defaults.amm(pair.clone())?)?;
        engine.oracle_mut().set_price(pair.clone(), defaults.price_multiplier);
    }
    Ok(engine)
}

fn print_position(engine: &SimEngine, pair: &Pair, trader: &TraderAddr) -> Result<(), EngineError> {
    match engine.query_position(pair, trader) {
        Ok(resp) => println!(
            "  {}: size {}, margin {}, open notional {}, pnl {}, margin ratio {}",
            trader,
            resp.position.size.round_dp(6),
            resp.position.margin.round_dp(6),
            resp.position.open_notional.round_dp(6),
            resp.unrealized_pnl.round_dp(6),
            resp.margin_ratio.round_dp(6),
        ),
        Err(EngineError::PositionNotFound { .. }) => println!("  {}: no position", trader),
        Err(err) => return Err(err),
    }
    Ok(())
}

/// Open, grow, add margin, partially close and close a long.
fn scenario_trading(defaults: &MarketDefaults) -> Result<(), EngineError> {
    println!("Scenario: Position Lifecycle\n");

    let pair = btc();
    let mut engine = new_engine(defaults, &[pair.clone()])?;
    let alice = TraderAddr::new("alice");
    engine.ledger_mut().mint("alice", "unusd", dec!(10_000));

    let resp =
        engine.open_position(&pair, Direction::Long, &alice, dec!(100), dec!(5), Decimal::ZERO)?;
    println!("  Alice opens 100 margin at 5x, receives {} base", resp.exchanged_size.round_dp(6));
    print_position(&engine, &pair, &alice)?;

    engine.advance_block(5_000);
    engine.open_position(&pair, Direction::Long, &alice, dec!(50), dec!(5), Decimal::ZERO)?;
    println!("  Alice adds 50 margin at 5x");
    print_position(&engine, &pair, &alice)?;

    engine.advance_block(5_000);
    engine.add_margin(&pair, &alice, dec!(100))?;
    println!("  Alice deposits 100 more margin");
    print_position(&engine, &pair, &alice)?;

    engine.advance_block(5_000);
    let size = engine.query_position(&pair, &alice)?.position.size;
    engine.partial_close(&pair, &alice, size / dec!(2))?;
    println!("  Alice closes half");
    print_position(&engine, &pair, &alice)?;

    engine.advance_block(5_000);
    let resp = engine.close_position(&pair, &alice)?;
    println!("  Alice closes the rest, realized pnl {}", resp.realized_pnl.round_dp(6));
    println!(
        "  Balances: alice {}, vault {}, fee pool {}, ecosystem fund {}\n",
        engine.ledger().balance("alice", "unusd"),
        engine.ledger().balance(VAULT, "unusd"),
        engine.ledger().balance(FEE_POOL, "unusd"),
        engine.ledger().balance(ECOSYSTEM_FUND, "unusd"),
    );
    Ok(())
}

/// Mark TWAP across three peg levels.
fn scenario_twap(defaults: &MarketDefaults) -> Result<(), EngineError> {
    println!("Scenario: Time Weighted Prices\n");

    let pair = btc();
    let mut engine = new_engine(defaults, &[pair.clone()])?;

    for (multiplier, millis) in [(dec!(9), 10_000), (dec!(8.5), 10_000), (dec!(9.5), 10_000)] {
        engine.advance_block(millis);
        engine.shift_peg_multiplier(&pair, multiplier)?;
        println!("  t={} peg -> {}", engine.block().time, multiplier);
    }

    engine.advance_block(10_000);
    let twap = engine.mark_price_twap(&pair, 30_000)?;
    println!("  30s mark TWAP at t={}: {}\n", engine.block().time, twap.round_dp(9));
    Ok(())
}

/// One funding epoch with the mark above the index.
fn scenario_funding(defaults: &MarketDefaults) -> Result<(), EngineError> {
    println!("Scenario: Funding\n");

    let pair = btc();
    let mut engine = new_engine(defaults, &[pair.clone()])?;
    let (alice, bob) = (TraderAddr::new("alice"), TraderAddr::new("bob"));
    engine.ledger_mut().mint("alice", "unusd", dec!(10_000));
    engine.ledger_mut().mint("bob", "unusd", dec!(10_000));

    engine.open_position(&pair, Direction::Long, &alice, dec!(1_000), dec!(2), Decimal::ZERO)?;
    engine.open_position(&pair, Direction::Short, &bob, dec!(500), dec!(2), Decimal::ZERO)?;
    engine.oracle_mut().set_price(pair.clone(), dec!(0.999));

    engine.advance_block(30 * 60 * 1000);
    let event = engine.apply_funding_epoch(&pair, 30 * 60 * 1000)?;
    println!(
        "  Mark TWAP {}, index {}, premium fraction {}",
        event.mark_price_twap.round_dp(9),
        event.index_price,
        event.premium_fraction.round_dp(12),
    );

    let resp = engine.add_margin(&pair, &alice, dec!(1))?;
    println!("  Alice settles funding payment {}", resp.funding_payment.round_dp(9));
    let resp = engine.add_margin(&pair, &bob, dec!(1))?;
    println!("  Bob settles funding payment {}\n", resp.funding_payment.round_dp(9));
    Ok(())
}

/// Batch liquidation over healthy, partial, full and invalid requests.
fn scenario_liquidation(defaults: &MarketDefaults) -> Result<(), EngineError> {
    println!("Scenario: Batch Liquidation\n");

    let pairs = [btc(), Pair::new("ueth", "unusd"), Pair::new("uatom", "unusd")];
    let mut engine = new_engine(defaults, &pairs)?;
    engine.ledger_mut().mint(VAULT, "unusd", dec!(3_000));
    let alice = TraderAddr::new("alice");

    // size 10000, margin 1000: open notional decides the health
    for (pair, open_notional) in pairs.iter().zip([dec!(10_400), dec!(10_600), dec!(10_000)]) {
        let position = Position::new(
            alice.clone(),
            pair.clone(),
            dec!(10_000),
            dec!(1_000),
            open_notional,
            Decimal::ZERO,
            1,
        );
        engine.import_position(position)?;
    }

    let mut requests: Vec<LiquidateRequest> = pairs
        .iter()
        .map(|pair| LiquidateRequest::new(pair.clone(), alice.clone()))
        .collect();
    requests.push(LiquidateRequest::new(Pair::new("usol", "unusd"), alice.clone()));
    requests.push(LiquidateRequest::new(btc(), TraderAddr::new("bob")));

    let liquidator = TraderAddr::new("liquidator");
    let responses = engine.multi_liquidate(&liquidator, &requests, Some(false))?;
    for resp in &responses {
        match &resp.error {
            None => println!(
                "  {} {}: liquidated, liquidator fee {}, ecosystem fund fee {}",
                resp.pair, resp.trader, resp.liquidator_fee, resp.ecosystem_fund_fee
            ),
            Some(err) => println!("  {} {}: {}", resp.pair, resp.trader, err),
        }
    }
    println!(
        "  Vault {}, ecosystem fund {}, liquidator {}\n",
        engine.ledger().balance(VAULT, "unusd"),
        engine.ledger().balance(ECOSYSTEM_FUND, "unusd"),
        engine.ledger().balance("liquidator", "unusd"),
    );
    Ok(())
}

/// Vault shortfall borrowed from the ecosystem fund, then offset by bad debt.
fn scenario_bad_debt(defaults: &MarketDefaults) -> Result<(), EngineError> {
    println!("Scenario: Vault Shortfall\n");

    let pair = btc();
    let mut engine = new_engine(defaults, &[pair.clone()])?;
    engine.ledger_mut().mint(VAULT, "unusd", dec!(500));
    engine.ledger_mut().mint(ECOSYSTEM_FUND, "unusd", dec!(1_000));

    engine.withdraw(&pair, &TraderAddr::new("bob"), dec!(1_000))?;
    let market = engine
        .state()
        .market(&pair)?
        .ok_or_else(|| EngineError::PairNotFound(pair.clone()))?;
    println!("  Withdraw 1000 from a vault holding 500");
    println!(
        "  Bob {}, ecosystem fund {}, prepaid bad debt {}",
        engine.ledger().balance("bob", "unusd"),
        engine.ledger().balance(ECOSYSTEM_FUND, "unusd"),
        market.prepaid_bad_debt,
    );

    engine.realize_bad_debt(&pair, dec!(300))?;
    let market = engine
        .state()
        .market(&pair)?
        .ok_or_else(|| EngineError::PairNotFound(pair.clone()))?;
    println!("  Realize 300 bad debt: prepaid left {}\n", market.prepaid_bad_debt);
    Ok(())
}

/// Peg and depth shifts with open interest on the book.
fn scenario_repeg(defaults: &MarketDefaults) -> Result<(), EngineError> {
    println!("Scenario: Repeg\n");

    let pair = btc();
    let mut engine = new_engine(defaults, &[pair.clone()])?;
    let alice = TraderAddr::new("alice");
    engine.ledger_mut().mint("alice", "unusd", dec!(10_000));
    engine.ledger_mut().mint(ECOSYSTEM_FUND, "unusd", dec!(100_000));
    engine.open_position(&pair, Direction::Long, &alice, dec!(1_000), dec!(5), Decimal::ZERO)?;

    engine.advance_block(1_000);
    let cost = engine.shift_peg_multiplier(&pair, dec!(1.1))?;
    println!("  Peg 1 -> 1.1 with longs open costs the fund {}", cost);

    engine.advance_block(1_000);
    let cost = engine.shift_swap_invariant(&pair, dec!(2_000_000_000_000))?;
    println!("  Doubling depth costs the fund {}", cost);
    print_position(&engine, &pair, &alice)?;
    println!(
        "  Vault {}, ecosystem fund {}\n",
        engine.ledger().balance(VAULT, "unusd"),
        engine.ledger().balance(ECOSYSTEM_FUND, "unusd"),
    );
    Ok(())
}
