//! Margin summary and withdrawable computation.
//!
//! Everything here is a derived view over an account's stored positions and
//! perp balance, evaluated against current mark prices. Nothing is cached, so
//! the views can never drift from the positions they summarize.
//!
//! For every open position, `ntl = |szi| * mark` and the margin it uses is
//! `ntl / leverage` rounded down. The account value is the perp balance plus
//! isolated margin plus unrealized PnL. An account is liquidatable once its
//! value drops strictly below the margin it uses.

use crate::account::Account;
use crate::types::{to_i64, to_u64, CastError, PerpId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMarginSummary {
    pub account_value: i64,
    pub margin_used: u64,
    pub ntl_pos: u64,
    pub raw_usd: i64,
}

impl AccountMarginSummary {
    /// Strict: value exactly equal to margin used is still safe.
    pub fn is_liquidatable(&self) -> bool {
        (self.account_value as i128) < self.margin_used as i128
    }

    /// Account value over notional. `Decimal::MAX` when flat.
    pub fn margin_ratio(&self) -> Decimal {
        if self.ntl_pos == 0 {
            return Decimal::MAX;
        }
        Decimal::from(self.account_value) / Decimal::from(self.ntl_pos)
    }

    /// Notional over account value. Zero when flat or underwater.
    pub fn effective_leverage(&self) -> Decimal {
        if self.account_value <= 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.ntl_pos) / Decimal::from(self.account_value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawable {
    pub withdrawable: u64,
}

/// Margin one position needs at `leverage`. Rounds down.
pub fn margin_required(ntl: i128, leverage: u32) -> i128 {
    ntl / leverage.max(1) as i128
}

pub fn calculate_margin_summary<F>(
    account: &Account,
    mark_px: F,
) -> Result<AccountMarginSummary, MarginError>
where
    F: Fn(PerpId) -> Option<u64>,
{
    let mut upnl: i128 = 0;
    let mut margin_used: i128 = 0;
    let mut ntl_pos: i128 = 0;
    let mut signed_entry: i128 = 0;
    let mut isolated: i128 = 0;

    for (perp, position) in account.open_positions() {
        let px = mark_px(*perp).ok_or(MarginError::MissingMarkPx(*perp))?;
        let ntl = position.notional(px);
        upnl += position.unrealized_pnl(px);
        margin_used += margin_required(ntl, position.leverage);
        ntl_pos += ntl;
        signed_entry += position.signed_entry_ntl();
        if position.is_isolated {
            isolated += position.isolated_raw_usd as i128;
        }
    }

    let base = account.perp_balance as i128 + isolated;

    Ok(AccountMarginSummary {
        account_value: to_i64(base + upnl)?,
        margin_used: to_u64(margin_used)?,
        ntl_pos: to_u64(ntl_pos)?,
        raw_usd: to_i64(base - signed_entry)?,
    })
}

// 3.1: free perp usd. cross pnl counts, cross margin is reserved, isolated margin
// is already out of the perp balance. never more than the balance itself.
pub fn calculate_withdrawable<F>(account: &Account, mark_px: F) -> Result<Withdrawable, MarginError>
where
    F: Fn(PerpId) -> Option<u64>,
{
    let mut cross_upnl: i128 = 0;
    let mut cross_margin: i128 = 0;

    for (perp, position) in account.open_positions().filter(|(_, p)| !p.is_isolated) {
        let px = mark_px(*perp).ok_or(MarginError::MissingMarkPx(*perp))?;
        cross_upnl += position.unrealized_pnl(px);
        cross_margin += margin_required(position.notional(px), position.leverage);
    }

    let balance = account.perp_balance as i128;
    let free = (balance + cross_upnl - cross_margin).clamp(0, balance.max(0));
    Ok(Withdrawable {
        withdrawable: to_u64(free)?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarginError {
    #[error("No mark price for {0}")]
    MissingMarkPx(PerpId),

    #[error(transparent)]
    Cast(#[from] CastError),
}
