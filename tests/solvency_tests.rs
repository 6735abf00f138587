//! Solvency invariant tests.
//!
//! Liquidation eligibility, bad debt accounting and the withdrawal gates that
//! keep perp collateral from leaving an account that still needs it.

use hypercore_sim::*;
use proptest::prelude::*;

const USDC: TokenId = TokenId(0);
const ETH: PerpId = PerpId(1);
const ALICE: Address = Address::repeat_byte(0xa1);
const BOB: Address = Address::repeat_byte(0xb0);

// sz decimals 4, px decimals 2, max leverage 10
fn sim() -> CoreSim {
    let mut sim = CoreSim::new(SimConfig::default());
    sim.register_token_info(USDC, TokenInfo::usdc()).unwrap();
    sim.register_perp(ETH, PerpAssetInfo::new("ETH", 4, 10)).unwrap();
    sim.set_mark_px(ETH, 2_000_00).unwrap();
    sim
}

fn order(eth: u64, is_buy: bool, limit_usd: u64, reduce_only: bool) -> LimitOrder {
    LimitOrder {
        asset: Asset::Perp(ETH),
        is_buy,
        limit_px: limit_usd * 100_000_000,
        sz: eth * 100_000_000,
        reduce_only,
        tif: TimeInForce::Ioc,
        cloid: None,
    }
}

fn usd(whole: u64) -> u64 {
    whole * 1_000_000
}

#[test]
fn liquidation_threshold_is_strict() {
    let mut sim = sim();
    // 10 ETH at 2_000 on 10x: 2_000 margin against exactly 2_000 value
    sim.force_perp_balance(ALICE, usd(2_000)).unwrap();
    sim.execute_perp_limit_order(ALICE, order(10, true, 2_100, false)).unwrap();

    let summary = sim.read_account_margin_summary(ALICE).unwrap();
    assert_eq!(summary.account_value, usd(2_000) as i64);
    assert_eq!(summary.margin_used, usd(2_000));
    assert!(!summary.is_liquidatable());
    assert!(sim.liquidate_positions().is_empty());

    // one cent lower tips it over
    sim.set_mark_px(ETH, 1_999_99).unwrap();
    assert!(sim.is_liquidatable(ALICE).unwrap());
}

#[test]
fn opening_beyond_margin_is_rejected() {
    let mut sim = sim();
    sim.force_perp_balance(ALICE, usd(1_000)).unwrap();
    let err = sim.execute_perp_limit_order(ALICE, order(10, true, 2_100, false)).unwrap_err();
    assert!(matches!(err, CoreError::Account(AccountError::InsufficientMargin { .. })));
    assert!(sim.read_position(ALICE, ETH).unwrap().is_empty());
    assert_eq!(sim.account(ALICE).unwrap().perp_balance, usd(1_000) as i64);
}

#[test]
fn bad_debt_is_floored_and_reported() {
    let mut sim = sim();
    sim.force_perp_balance(ALICE, usd(2_500)).unwrap();
    sim.execute_perp_limit_order(ALICE, order(10, true, 2_100, false)).unwrap();

    let px = sim.bump_mark_px(ETH, Bps(3_000), false).unwrap();
    assert_eq!(px, 1_400_00);

    let report = sim.next_block();
    assert_eq!(report.liquidations.len(), 1);
    assert_eq!(report.liquidations[0].bad_debt, usd(3_500));
    assert_eq!(sim.account(ALICE).unwrap().perp_balance, 0);
    assert!(sim
        .events()
        .iter()
        .any(|e| matches!(&e.payload, EventPayload::BadDebt(bd) if bd.debt_amount == usd(3_500))));
}

#[test]
fn liquidation_scans_in_activation_order() {
    let mut sim = sim();
    for who in [BOB, ALICE] {
        sim.force_perp_balance(who, usd(2_100)).unwrap();
        sim.execute_perp_limit_order(who, order(10, true, 2_100, false)).unwrap();
    }
    sim.set_mark_px(ETH, 1_500_00).unwrap();

    let results = sim.liquidate_positions();
    let scanned: Vec<Address> = results.iter().map(|r| r.account).collect();
    assert_eq!(scanned, vec![BOB, ALICE]);
}

#[test]
fn open_position_limits_withdrawable() {
    let mut sim = sim();
    sim.force_perp_balance(ALICE, usd(5_000)).unwrap();
    sim.execute_perp_limit_order(ALICE, order(10, true, 2_100, false)).unwrap();

    let withdrawable = sim.read_withdrawable(ALICE).unwrap();
    assert_eq!(withdrawable.withdrawable, usd(3_000));

    let too_much = UsdClassTransfer {
        ntl: usd(3_001),
        to_perp: false,
    };
    assert!(sim.execute_usd_class_transfer(ALICE, too_much).is_err());

    sim.execute_usd_class_transfer(
        ALICE,
        UsdClassTransfer {
            ntl: usd(3_000),
            to_perp: false,
        },
    )
    .unwrap();
    // 3_000 usd is 300_000_000_000 usdc wei
    assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().total, 300_000_000_000);
    assert!(!sim.is_liquidatable(ALICE).unwrap());
}

#[test]
fn reduce_only_close_restores_balance() {
    let mut sim = sim();
    sim.force_perp_balance(ALICE, usd(5_000)).unwrap();
    sim.execute_perp_limit_order(ALICE, order(10, true, 2_100, false)).unwrap();
    sim.set_mark_px(ETH, 2_050_00).unwrap();

    // asks for 20, gets clamped to the 10 open
    let result = sim.execute_perp_limit_order(ALICE, order(20, false, 2_000, true)).unwrap();
    assert!(result.is_filled());
    assert_eq!(result.status, OrderStatus::Filled { sz: 100_000, px: 2_050_00 });
    assert!(sim.read_position(ALICE, ETH).unwrap().is_empty());
    assert_eq!(sim.account(ALICE).unwrap().perp_balance, usd(5_500) as i64);
}

proptest! {
    /// After a liquidation pass no account is left liquidatable and no
    /// balance is negative, whatever the price shock.
    #[test]
    fn liquidation_leaves_no_negative_balance(
        collateral in 2_000u64..20_000u64,
        drop_bps in 0u32..9_000u32,
    ) {
        let mut sim = sim();
        sim.force_perp_balance(ALICE, usd(collateral)).unwrap();
        sim.execute_perp_limit_order(ALICE, order(10, true, 2_100, false)).unwrap();

        sim.bump_mark_px(ETH, Bps(drop_bps), false).unwrap();
        let was_liquidatable = sim.is_liquidatable(ALICE).unwrap();
        let results = sim.liquidate_positions();

        prop_assert_eq!(results.len(), usize::from(was_liquidatable));
        prop_assert!(!sim.is_liquidatable(ALICE).unwrap());
        prop_assert!(sim.account(ALICE).unwrap().perp_balance >= 0);

        if let Some(result) = results.first() {
            // loss beyond the collateral is exactly the bad debt
            let settled = result.realized_pnl + usd(collateral) as i64;
            prop_assert_eq!(result.bad_debt, settled.min(0).unsigned_abs());
            prop_assert_eq!(result.final_perp_balance, settled.max(0));
        }
    }
}
