// 6.0: liquidation detection and close-out accounting.
// an account is liquidatable once its value drops strictly below the margin its positions use.
// liquidation closes every open position at mark.
// whatever the perp balance can't cover is bad debt.

use crate::margin::AccountMarginSummary;
use crate::types::{Address, PerpId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationStatus {
    Healthy { buffer: u64 },
    /// `shortfall` is how far the value sits below margin used.
    Liquidatable { shortfall: u64 },
}

impl LiquidationStatus {
    pub fn is_liquidatable(&self) -> bool {
        matches!(self, LiquidationStatus::Liquidatable { .. })
    }
}

pub fn evaluate_liquidation(summary: &AccountMarginSummary) -> LiquidationStatus {
    let gap = summary.account_value as i128 - summary.margin_used as i128;
    if gap < 0 {
        LiquidationStatus::Liquidatable {
            shortfall: clamp_u64(-gap),
        }
    } else {
        LiquidationStatus::Healthy { buffer: clamp_u64(gap) }
    }
}

fn clamp_u64(value: i128) -> u64 {
    value.clamp(0, u64::MAX as i128) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub perp: PerpId,
    /// Signed size before the close.
    pub szi: i64,
    pub mark_px: u64,
    pub realized_pnl: i64,
    pub margin_released: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub account: Address,
    pub summary_before: AccountMarginSummary,
    pub closed: Vec<ClosedPosition>,
    pub realized_pnl: i64,
    /// Perp balance left after every close, floored at zero.
    pub final_perp_balance: i64,
    /// Loss the account could not cover.
    pub bad_debt: u64,
}

impl LiquidationResult {
    pub fn has_bad_debt(&self) -> bool {
        self.bad_debt > 0
    }
}

/// Splits a post-close perp balance into what stays and what is written off.
pub fn settle_balance(perp_balance: i64) -> (i64, u64) {
    if perp_balance < 0 {
        (0, perp_balance.unsigned_abs())
    } else {
        (perp_balance, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(account_value: i64, margin_used: u64) -> AccountMarginSummary {
        AccountMarginSummary {
            account_value,
            margin_used,
            ntl_pos: margin_used * 10,
            raw_usd: 0,
        }
    }

    #[test]
    fn healthy_at_exact_margin() {
        let status = evaluate_liquidation(&summary(1_000, 1_000));
        assert_eq!(status, LiquidationStatus::Healthy { buffer: 0 });
        assert!(!status.is_liquidatable());
    }

    #[test]
    fn one_unit_short_is_liquidatable() {
        let status = evaluate_liquidation(&summary(999, 1_000));
        assert_eq!(status, LiquidationStatus::Liquidatable { shortfall: 1 });
    }

    #[test]
    fn negative_value_shortfall() {
        let status = evaluate_liquidation(&summary(-500, 1_000));
        assert_eq!(status, LiquidationStatus::Liquidatable { shortfall: 1_500 });
    }

    #[test]
    fn settle_floors_at_zero() {
        assert_eq!(settle_balance(-250), (0, 250));
        assert_eq!(settle_balance(400), (400, 0));
    }
}
