//! Liquidation detection and execution.

use super::core::CoreSim;
use super::pricing::price_read_error;
use super::results::CoreError;
use crate::events::{BadDebtEvent, EventPayload, LiquidationEvent};
use crate::liquidation::{
    evaluate_liquidation, settle_balance, ClosedPosition, LiquidationResult, LiquidationStatus,
};
use crate::margin::calculate_margin_summary;
use crate::position::{apply_fill, Position};
use crate::types::{to_i64, Address, CastError, PerpId};

impl CoreSim {
    pub fn is_liquidatable(&self, user: Address) -> Result<bool, CoreError> {
        Ok(self.read_account_margin_summary(user)?.is_liquidatable())
    }

    pub fn liquidation_status(&self, user: Address) -> Result<LiquidationStatus, CoreError> {
        Ok(evaluate_liquidation(&self.read_account_margin_summary(user)?))
    }

    /// Force-closes every open position of `user` at mark, eligible or not.
    /// A negative perp balance left behind is written off as bad debt.
    pub fn liquidate_user(&mut self, user: Address) -> Result<LiquidationResult, CoreError> {
        let mut account = self.existing_account(user)?;
        let summary_before = calculate_margin_summary(&account, self.mark_px_fn())?;

        let open: Vec<(PerpId, Position)> =
            account.open_positions().map(|(perp, p)| (*perp, *p)).collect();
        let mut closed = Vec::with_capacity(open.len());
        let mut realized_total: i128 = 0;

        for (perp, position) in open {
            let px = self.ledger.oracle.mark_px(perp).map_err(price_read_error)?;
            let delta = position.szi.checked_neg().ok_or(CastError::IntDowncast {
                bits: 64,
                value: position.szi.to_string(),
            })?;
            let update = apply_fill(&position, delta, px)?;
            account.perp_balance = to_i64(
                account.perp_balance as i128
                    + update.realized_pnl as i128
                    + update.margin_released as i128,
            )?;
            account.set_position(perp, update.new_position);
            realized_total += update.realized_pnl as i128;
            closed.push(ClosedPosition {
                perp,
                szi: position.szi,
                mark_px: px,
                realized_pnl: update.realized_pnl,
                margin_released: update.margin_released,
            });
        }

        let (final_perp_balance, bad_debt) = settle_balance(account.perp_balance);
        account.perp_balance = final_perp_balance;
        self.commit_account(account);

        let result = LiquidationResult {
            account: user,
            summary_before,
            closed,
            realized_pnl: to_i64(realized_total)?,
            final_perp_balance,
            bad_debt,
        };

        tracing::info!(
            %user,
            positions = result.closed.len(),
            realized_pnl = result.realized_pnl,
            bad_debt,
            "account liquidated"
        );
        self.emit_event(EventPayload::Liquidation(LiquidationEvent {
            account: user,
            positions_closed: result.closed.len(),
            realized_pnl: result.realized_pnl,
            account_value: summary_before.account_value,
            margin_used: summary_before.margin_used,
        }));
        if result.has_bad_debt() {
            self.emit_event(EventPayload::BadDebt(BadDebtEvent {
                account: user,
                debt_amount: bad_debt,
            }));
        }

        Ok(result)
    }

    /// Liquidates every eligible account, scanning in activation order.
    /// Accounts whose summary can't be computed are skipped.
    pub fn liquidate_positions(&mut self) -> Vec<LiquidationResult> {
        let candidates: Vec<Address> = self
            .ledger
            .accounts
            .iter()
            .filter(|(_, account)| account.has_open_positions())
            .map(|(address, _)| *address)
            .collect();

        let mut results = Vec::new();
        for address in candidates {
            match self.read_account_margin_summary(address) {
                Ok(summary) if summary.is_liquidatable() => match self.liquidate_user(address) {
                    Ok(result) => results.push(result),
                    Err(e) => tracing::warn!(%address, error = %e, "liquidation failed, skipping"),
                },
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%address, error = %e, "margin summary unavailable, skipping")
                }
            }
        }
        results
    }
}
