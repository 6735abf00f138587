//! Core ledger simulation.
//!
//! Walks through the lifecycle of the simulated core: spot transfers,
//! bridging to the EVM side, perp trading through the action queue,
//! staking locks, atomic drains and liquidation on a price shock.
//!
//! Pass a TOML file as the first argument to override the mainnet preset.
//! Set `RUST_LOG=hypercore_sim=debug` to see every event.

use hypercore_sim::*;
use std::error::Error;
use tracing_subscriber::EnvFilter;

type DemoResult = Result<(), Box<dyn Error>>;

const ALICE: Address = Address::repeat_byte(0xa1);
const BOB: Address = Address::repeat_byte(0xb0);
const VALIDATOR: Address = Address::repeat_byte(0x7a);

const BTC: PerpId = PerpId(0);
const UBTC: TokenId = TokenId(197);
const UBTC_USDC: SpotMarketId = SpotMarketId(140);

fn main() -> DemoResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => SimConfig::mainnet(),
    };

    println!("Core Ledger Simulation");
    println!("USDC token {}, HYPE token {}\n", config.usdc_token, config.hype_token);

    scenario_1_spot_send(&config)?;
    scenario_2_bridge(&config)?;
    scenario_3_perp_trade(&config)?;
    scenario_4_staking(&config)?;
    scenario_5_atomic_drain(&config)?;
    scenario_6_liquidation(&config)?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn setup(config: &SimConfig) -> Result<CoreSim, CoreError> {
    let mut sim = CoreSim::new(config.clone());
    sim.set_time(Timestamp::now());
    sim.register_token_info(config.usdc_token, TokenInfo::usdc())?;
    sim.register_token_info(config.hype_token, TokenInfo::hype())?;
    sim.register_token_info(UBTC, TokenInfo::new("UBTC", 5, 8))?;
    sim.link_evm_contract(UBTC, Address::repeat_byte(0xbc), 0)?;
    sim.register_perp(BTC, PerpAssetInfo::new("BTC", 5, 40))?;
    sim.register_spot(UBTC_USDC, SpotInfo::new("UBTC/USDC", UBTC, config.usdc_token))?;
    sim.register_validator(VALIDATOR);
    // px decimals are 6 - sz decimals for perps, 8 - sz decimals for spot
    sim.set_mark_px(BTC, 600_000)?;
    sim.set_spot_px(UBTC_USDC, 60_000_000)?;
    Ok(sim)
}

fn usd(value: i64) -> String {
    to_decimal(value as i128, 6).map(|d| format!("${d}")).unwrap_or_else(|| value.to_string())
}

fn wei(value: u64, decimals: u8) -> String {
    to_decimal(value as i128, decimals)
        .map(|d| d.to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Queued spot send between two core accounts.
fn scenario_1_spot_send(config: &SimConfig) -> DemoResult {
    println!("Scenario 1: Spot Send\n");

    let mut sim = setup(config)?;
    sim.force_spot_balance(ALICE, config.usdc_token, 10_000_000_000)?;
    println!("  Alice holds {} USDC", wei(10_000_000_000, 8));

    sim.enqueue(
        ALICE,
        CoreAction::SpotSend(SpotSend {
            destination: BOB,
            token: config.usdc_token,
            wei: 4_000_000_000,
        }),
    );
    println!("  Alice queues a 40 USDC send to Bob ({} action queued)", sim.queued_actions());

    let report = sim.execute_queued_actions(false)?;
    println!("  Drain executed {} action(s)", report.executed());
    println!(
        "  Alice: {} USDC, Bob: {} USDC\n",
        wei(sim.read_spot_balance(ALICE, config.usdc_token)?.total, 8),
        wei(sim.read_spot_balance(BOB, config.usdc_token)?.total, 8)
    );
    Ok(())
}

/// Core -> EVM through the system address, then back through the callback.
fn scenario_2_bridge(config: &SimConfig) -> DemoResult {
    println!("Scenario 2: Bridging\n");

    let mut sim = setup(config)?;
    sim.force_spot_balance(ALICE, UBTC, 100_000_000)?;

    let system = token_system_address(UBTC, config.hype_token);
    sim.execute_spot_send(
        ALICE,
        SpotSend {
            destination: system,
            token: UBTC,
            wei: 25_000_000,
        },
    )?;
    println!("  Alice sends 0.25 UBTC to {system}");
    println!("  EVM balance: {}", sim.evm_token_balance(ALICE, UBTC));

    let id = sim.execute_token_transfer(ALICE, UBTC, U256::from(10_000_000u64))?;
    println!("  Alice bridges 0.1 UBTC back, transfer #{id} pending");
    let before = sim.read_spot_balance(ALICE, UBTC)?.total;
    println!("  Core balance before callback: {}", wei(before, 8));
    sim.token_transfer_callback(id)?;
    let after = sim.read_spot_balance(ALICE, UBTC)?.total;
    println!("  Core balance after callback: {}\n", wei(after, 8));
    Ok(())
}

/// Funds the perp account and opens a BTC long at the oracle price.
fn scenario_3_perp_trade(config: &SimConfig) -> DemoResult {
    println!("Scenario 3: Perp Trade\n");

    let mut sim = setup(config)?;
    sim.force_spot_balance(ALICE, config.usdc_token, 1_000_000_000_000)?;
    sim.enqueue(
        ALICE,
        CoreAction::UsdClassTransfer(UsdClassTransfer {
            ntl: 10_000_000_000,
            to_perp: true,
        }),
    );
    sim.enqueue(ALICE, long_btc(100_000_000, 61_000));
    sim.execute_queued_actions(false)?;

    let position = sim.read_position(ALICE, BTC)?;
    let summary = sim.read_account_margin_summary(ALICE)?;
    println!("  Alice moves $10,000 to perp and buys 1 BTC at $60,000");
    println!(
        "  Position: {} BTC, entry notional {}",
        wei(position.szi.unsigned_abs(), 5),
        usd(position.entry_ntl as i64)
    );
    println!(
        "  Account value {}, margin used {}",
        usd(summary.account_value),
        usd(summary.margin_used as i64)
    );
    println!("  Effective leverage {}x", summary.effective_leverage().round_dp(2));

    let px = sim.bump_mark_px(BTC, Bps(500), true)?;
    let summary = sim.read_account_margin_summary(ALICE)?;
    println!("  Mark +5% to {}: account value {}\n", wei(px, 1), usd(summary.account_value));
    Ok(())
}

/// Delegation locks and the unstaking queue.
fn scenario_4_staking(config: &SimConfig) -> DemoResult {
    println!("Scenario 4: Staking\n");

    let mut sim = setup(config)?;
    sim.force_spot_balance(ALICE, config.hype_token, 1_000_000_000)?;
    sim.execute_staking_deposit(ALICE, 500_000_000)?;
    sim.execute_token_delegate(
        ALICE,
        TokenDelegate {
            validator: VALIDATOR,
            wei: 300_000_000,
            is_undelegate: false,
        },
    )?;
    let delegation = sim.read_delegation(ALICE, VALIDATOR)?;
    let locked_until = Timestamp(delegation.locked_until_timestamp);
    let until = match locked_until.to_datetime() {
        Some(at) => at.to_rfc3339(),
        None => locked_until.to_string(),
    };
    println!("  Alice stakes 5 HYPE and delegates 3, locked until {until}");

    let undelegate = TokenDelegate {
        validator: VALIDATOR,
        wei: 300_000_000,
        is_undelegate: true,
    };
    if let Err(e) = sim.execute_token_delegate(ALICE, undelegate) {
        println!("  Undelegating now fails: {e}");
    }
    sim.advance_time(config.delegation_lock_secs);
    sim.execute_token_delegate(ALICE, undelegate)?;
    sim.execute_staking_withdraw(ALICE, 500_000_000)?;

    let summary = sim.read_delegator_summary(ALICE)?;
    println!(
        "  After the lock: undelegated, {} withdrawal(s) pending",
        summary.n_pending_withdrawals
    );
    sim.advance_time(config.staking_withdrawal_delay_secs);
    let report = sim.next_block();
    println!(
        "  Block {} releases {} HYPE back to spot\n",
        report.block,
        wei(report.staking_wei_released, 8)
    );
    Ok(())
}

/// A failing action rolls back the whole drain.
fn scenario_5_atomic_drain(config: &SimConfig) -> DemoResult {
    println!("Scenario 5: Atomic Drain\n");

    let mut sim = setup(config)?;
    sim.set_revert_on_failure(true);
    sim.force_spot_balance(ALICE, config.usdc_token, 10_000_000_000)?;
    let send = |wei| {
        CoreAction::SpotSend(SpotSend {
            destination: BOB,
            token: config.usdc_token,
            wei,
        })
    };
    sim.enqueue(ALICE, send(3_000_000_000));
    sim.enqueue(ALICE, send(90_000_000_000));

    match sim.execute_queued_actions(false) {
        Err(e) => println!("  Drain reverted: {e}"),
        Ok(report) => println!("  Drain finished with {} failure(s)", report.failures().count()),
    }
    println!(
        "  Alice still holds {} USDC, {} action(s) still queued\n",
        wei(sim.read_spot_balance(ALICE, config.usdc_token)?.total, 8),
        sim.queued_actions()
    );
    Ok(())
}

/// A 20% drop wipes out a 1 BTC long and the next block liquidates it.
fn scenario_6_liquidation(config: &SimConfig) -> DemoResult {
    println!("Scenario 6: Liquidation\n");

    let mut sim = setup(config)?;
    sim.force_perp_balance(ALICE, 10_000_000_000)?;
    sim.execute_perp_limit_order(ALICE, limit_order(100_000_000, 61_000))?;
    println!("  Alice: 1 BTC long on $10,000 at $60,000");

    let px = sim.bump_mark_px(BTC, Bps(2_000), false)?;
    println!("  Mark drops 20% to {}", wei(px, 1));
    match sim.liquidation_status(ALICE)? {
        LiquidationStatus::Liquidatable { shortfall } => {
            println!("  Liquidatable, short {}", usd(shortfall as i64))
        }
        LiquidationStatus::Healthy { buffer } => {
            println!("  Healthy, buffer {}", usd(buffer as i64))
        }
    }

    let report = sim.next_block();
    for result in &report.liquidations {
        println!(
            "  Liquidated {} position(s), realized {}, bad debt {}",
            result.closed.len(),
            usd(result.realized_pnl),
            usd(result.bad_debt as i64)
        );
    }
    let balance = sim.account(ALICE).map(|a| a.perp_balance).unwrap_or(0);
    println!("  Perp balance after: {}", usd(balance));
    Ok(())
}

fn limit_order(sz: u64, limit_usd: u64) -> LimitOrder {
    LimitOrder {
        asset: Asset::Perp(BTC),
        is_buy: true,
        limit_px: limit_usd * 100_000_000,
        sz,
        reduce_only: false,
        tif: TimeInForce::Ioc,
        cloid: None,
    }
}

fn long_btc(sz: u64, limit_usd: u64) -> CoreAction {
    CoreAction::LimitOrder(limit_order(sz, limit_usd))
}
