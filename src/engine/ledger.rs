//! Balance mutators: spot sends, class transfers, staking, delegation, vaults.
//!
//! Each mutator stages copies of the accounts it touches, applies the change
//! to the copies and commits only once every check has passed.

use super::core::CoreSim;
use super::results::{CoreError, OrderResult};
use super::traits::LedgerMutator;
use crate::account::{AccountError, Delegation, PendingWithdrawal};
use crate::action::{LimitOrder, SpotSend, TokenDelegate, UsdClassTransfer, VaultTransfer};
use crate::events::{
    DelegationEvent, EventPayload, SpotTransferEvent, StakingEvent, StakingWithdrawalEvent,
    UsdClassTransferEvent, VaultTransferEvent,
};
use crate::margin::calculate_withdrawable;
use crate::types::{
    rescale, system_address_token, to_i64, Address, Asset, CastError, ClientOrderId, OrderId,
    PerpId, Timestamp, TokenId, U256,
};

/// Perp USD carries 6 decimals.
pub const PERP_USD_DECIMALS: u8 = 6;

impl CoreSim {
    /// Spot USDC wei for `ntl` perp USD.
    fn usd_to_usdc_wei(&self, ntl: u64) -> Result<u64, CoreError> {
        let usdc = self.config.usdc_token;
        let info = self
            .ledger
            .registry
            .token_info(usdc)
            .ok_or(CoreError::InvalidToken(usdc))?;
        let wei = rescale(ntl as u128, PERP_USD_DECIMALS, info.wei_decimals).ok_or_else(|| {
            CastError::UintDowncast {
                bits: 64,
                value: format!("{ntl} usd in wei"),
            }
        })?;
        Ok(u64::try_from(wei).map_err(|_| CastError::UintDowncast {
            bits: 64,
            value: wei.to_string(),
        })?)
    }

    fn withdrawable_of(&self, account: &crate::account::Account) -> Result<u64, CoreError> {
        Ok(calculate_withdrawable(account, self.mark_px_fn())?.withdrawable)
    }

    fn require_hype(&self) -> Result<TokenId, CoreError> {
        let hype = self.config.hype_token;
        if !self.ledger.registry.token_exists(hype) {
            return Err(CoreError::InvalidToken(hype));
        }
        Ok(hype)
    }

    /// Moves matured unstaking withdrawals back into spot HYPE. Returns the wei credited.
    /// An account whose credit fails is skipped and keeps its withdrawals pending.
    pub fn process_staking_withdrawals(&mut self) -> u64 {
        let now = self.current_time;
        let due: Vec<Address> = self
            .ledger
            .accounts
            .iter()
            .filter(|(_, a)| a.pending_withdrawals.iter().any(|w| w.unlocks_at <= now))
            .map(|(address, _)| *address)
            .collect();

        let mut credited = 0u64;
        for address in due {
            match self.pay_out_withdrawals(address, now) {
                Ok(wei) => credited = credited.saturating_add(wei),
                Err(e) => tracing::warn!(%address, error = %e, "staking payout failed, skipping"),
            }
        }
        credited
    }

    fn pay_out_withdrawals(&mut self, address: Address, now: Timestamp) -> Result<u64, CoreError> {
        let hype = self.config.hype_token;
        let mut account = self.existing_account(address)?;
        let matured = account.take_matured_withdrawals(now);
        let mut credited = 0u64;
        for withdrawal in &matured {
            account.credit_spot(hype, withdrawal.amount)?;
            credited = credited.saturating_add(withdrawal.amount);
        }
        self.commit_account(account);
        for withdrawal in matured {
            self.emit_event(EventPayload::StakingWithdrawalMatured(StakingWithdrawalEvent {
                account: address,
                wei: withdrawal.amount,
                unlocks_at: withdrawal.unlocks_at,
            }));
        }
        Ok(credited)
    }
}

impl LedgerMutator for CoreSim {
    fn execute_perp_limit_order(
        &mut self,
        sender: Address,
        order: LimitOrder,
    ) -> Result<OrderResult, CoreError> {
        match order.asset {
            Asset::Perp(perp) => self.place_perp_order(sender, perp, order),
            Asset::Spot(_) => Err(CoreError::UnknownAsset(order.asset)),
        }
    }

    fn execute_spot_limit_order(
        &mut self,
        sender: Address,
        order: LimitOrder,
    ) -> Result<OrderResult, CoreError> {
        match order.asset {
            Asset::Spot(spot) => self.place_spot_order(sender, spot, order),
            Asset::Perp(_) => Err(CoreError::UnknownAsset(order.asset)),
        }
    }

    fn execute_spot_send(&mut self, sender: Address, send: SpotSend) -> Result<(), CoreError> {
        if send.destination == sender {
            return Err(CoreError::CannotSelfTransfer);
        }
        let info = self
            .ledger
            .registry
            .token_info(send.token)
            .cloned()
            .ok_or(CoreError::InvalidToken(send.token))?;

        let mut from = self.existing_account(sender)?;
        from.debit_spot(send.token, send.wei)?;

        // 8.4: a send to a system address leaves core for the EVM side
        if let Some(bridged) = system_address_token(send.destination, self.config.hype_token) {
            if bridged != send.token {
                return Err(CoreError::InvalidToken(send.token));
            }
            let evm_amount = self.credit_evm_side(sender, send.token, &info, send.wei)?;
            self.commit_account(from);
            self.on_bridged_to_evm(sender, send.token, send.wei, evm_amount);
            return Ok(());
        }

        let mut to = self.staged_account(send.destination);
        to.activated = true;
        to.credit_spot(send.token, send.wei)?;
        self.commit_account(from);
        self.commit_account(to);

        self.emit_event(EventPayload::SpotTransfer(SpotTransferEvent {
            from: sender,
            to: send.destination,
            token: send.token,
            wei: send.wei,
        }));
        Ok(())
    }

    fn execute_staking_deposit(&mut self, sender: Address, wei: u64) -> Result<(), CoreError> {
        let hype = self.require_hype()?;
        let mut account = self.existing_account(sender)?;
        account.debit_spot(hype, wei)?;
        account.staking_balance = account
            .staking_balance
            .checked_add(wei)
            .ok_or(AccountError::BalanceOverflow(hype))?;
        self.commit_account(account);

        self.emit_event(EventPayload::StakingDeposit(StakingEvent { account: sender, wei }));
        Ok(())
    }

    fn execute_staking_withdraw(&mut self, sender: Address, wei: u64) -> Result<(), CoreError> {
        self.require_hype()?;
        let mut account = self.existing_account(sender)?;
        if account.staking_balance < wei {
            return Err(AccountError::InsufficientStakingBalance {
                requested: wei,
                available: account.staking_balance,
            }
            .into());
        }
        account.staking_balance -= wei;
        let unlocks_at = self.current_time.plus_secs(self.config.staking_withdrawal_delay_secs);
        account.pending_withdrawals.push_back(PendingWithdrawal { amount: wei, unlocks_at });
        self.commit_account(account);

        self.emit_event(EventPayload::StakingWithdrawalQueued(StakingWithdrawalEvent {
            account: sender,
            wei,
            unlocks_at,
        }));
        Ok(())
    }

    // 8.5: delegating extends the lock, undelegating waits for it
    fn execute_token_delegate(
        &mut self,
        sender: Address,
        delegate: TokenDelegate,
    ) -> Result<(), CoreError> {
        if !self.ledger.registry.validator_exists(delegate.validator) {
            return Err(CoreError::UnknownValidator(delegate.validator));
        }
        let now = self.current_time.as_secs();
        let mut account = self.existing_account(sender)?;

        let locked_until = if delegate.is_undelegate {
            let delegation = account
                .delegations
                .get_mut(&delegate.validator)
                .ok_or(AccountError::InsufficientDelegation {
                    validator: delegate.validator,
                    requested: delegate.wei,
                    delegated: 0,
                })?;
            if now < delegation.locked_until_timestamp {
                return Err(CoreError::StillLockedUntilTimestamp {
                    locked_until: delegation.locked_until_timestamp,
                    now,
                });
            }
            if delegation.amount < delegate.wei {
                return Err(AccountError::InsufficientDelegation {
                    validator: delegate.validator,
                    requested: delegate.wei,
                    delegated: delegation.amount,
                }
                .into());
            }
            delegation.amount -= delegate.wei;
            let locked_until = delegation.locked_until_timestamp;
            account.staking_balance = account
                .staking_balance
                .checked_add(delegate.wei)
                .ok_or(AccountError::BalanceOverflow(self.config.hype_token))?;
            locked_until
        } else {
            if account.staking_balance < delegate.wei {
                return Err(AccountError::InsufficientStakingBalance {
                    requested: delegate.wei,
                    available: account.staking_balance,
                }
                .into());
            }
            account.staking_balance -= delegate.wei;
            let lock = now.saturating_add(self.config.delegation_lock_secs);
            let delegation = account.delegations.entry(delegate.validator).or_insert(Delegation {
                validator: delegate.validator,
                amount: 0,
                locked_until_timestamp: 0,
            });
            delegation.amount = delegation
                .amount
                .checked_add(delegate.wei)
                .ok_or(AccountError::BalanceOverflow(self.config.hype_token))?;
            delegation.locked_until_timestamp = delegation.locked_until_timestamp.max(lock);
            delegation.locked_until_timestamp
        };
        self.commit_account(account);

        self.emit_event(EventPayload::Delegation(DelegationEvent {
            account: sender,
            validator: delegate.validator,
            wei: delegate.wei,
            is_undelegate: delegate.is_undelegate,
            locked_until_timestamp: locked_until,
        }));
        Ok(())
    }

    fn execute_usd_class_transfer(
        &mut self,
        sender: Address,
        transfer: UsdClassTransfer,
    ) -> Result<(), CoreError> {
        let usdc = self.config.usdc_token;
        let wei = self.usd_to_usdc_wei(transfer.ntl)?;
        let mut account = self.existing_account(sender)?;

        if transfer.to_perp {
            account.debit_spot(usdc, wei)?;
            account.perp_balance = to_i64(account.perp_balance as i128 + transfer.ntl as i128)?;
        } else {
            let withdrawable = self.withdrawable_of(&account)?;
            if transfer.ntl > withdrawable {
                return Err(AccountError::InsufficientPerpBalance {
                    requested: transfer.ntl,
                    available: withdrawable,
                }
                .into());
            }
            account.perp_balance = to_i64(account.perp_balance as i128 - transfer.ntl as i128)?;
            account.credit_spot(usdc, wei)?;
        }
        self.commit_account(account);

        self.emit_event(EventPayload::UsdClassTransfer(UsdClassTransferEvent {
            account: sender,
            ntl: transfer.ntl,
            to_perp: transfer.to_perp,
        }));
        Ok(())
    }

    fn execute_vault_transfer(
        &mut self,
        sender: Address,
        transfer: VaultTransfer,
    ) -> Result<(), CoreError> {
        let now = self.current_time.as_secs();
        let mut account = self.existing_account(sender)?;

        if transfer.is_deposit {
            let withdrawable = self.withdrawable_of(&account)?;
            if transfer.usd > withdrawable {
                return Err(AccountError::InsufficientPerpBalance {
                    requested: transfer.usd,
                    available: withdrawable,
                }
                .into());
            }
            account.perp_balance = to_i64(account.perp_balance as i128 - transfer.usd as i128)?;
            let lock = now.saturating_add(self.config.vault_lock_secs);
            let entry = account.vault_equity.entry(transfer.vault).or_default();
            entry.equity = entry.equity.checked_add(transfer.usd).ok_or(CastError::UintDowncast {
                bits: 64,
                value: "vault equity".to_string(),
            })?;
            entry.locked_until_timestamp = entry.locked_until_timestamp.max(lock);
        } else {
            let entry = account
                .vault_equity
                .get_mut(&transfer.vault)
                .ok_or(AccountError::InsufficientVaultEquity {
                    vault: transfer.vault,
                    requested: transfer.usd,
                    equity: 0,
                })?;
            if now < entry.locked_until_timestamp {
                return Err(CoreError::StillLockedUntilTimestamp {
                    locked_until: entry.locked_until_timestamp,
                    now,
                });
            }
            if entry.equity < transfer.usd {
                return Err(AccountError::InsufficientVaultEquity {
                    vault: transfer.vault,
                    requested: transfer.usd,
                    equity: entry.equity,
                }
                .into());
            }
            entry.equity -= transfer.usd;
            account.perp_balance = to_i64(account.perp_balance as i128 + transfer.usd as i128)?;
        }
        self.commit_account(account);

        self.emit_event(EventPayload::VaultTransfer(VaultTransferEvent {
            account: sender,
            vault: transfer.vault,
            usd: transfer.usd,
            is_deposit: transfer.is_deposit,
        }));
        Ok(())
    }

    fn execute_token_transfer(
        &mut self,
        sender: Address,
        token: TokenId,
        amount: U256,
    ) -> Result<u64, CoreError> {
        self.bridge_token_to_core(sender, token, amount)
    }

    fn execute_native_transfer(&mut self, sender: Address, amount: U256) -> Result<u64, CoreError> {
        self.bridge_native_to_core(sender, amount)
    }

    fn update_leverage(
        &mut self,
        sender: Address,
        perp: PerpId,
        leverage: u32,
        is_isolated: bool,
    ) -> Result<(), CoreError> {
        self.set_leverage(sender, perp, leverage, is_isolated)
    }

    fn cancel_order_by_oid(
        &mut self,
        sender: Address,
        asset: Asset,
        oid: OrderId,
    ) -> Result<(), CoreError> {
        let index = self
            .ledger
            .orders
            .iter()
            .position(|o| o.sender == sender && o.asset == asset && o.oid == oid)
            .ok_or(CoreError::OrderNotFound(oid))?;
        self.cancel_pending(index);
        Ok(())
    }

    fn cancel_order_by_cloid(
        &mut self,
        sender: Address,
        asset: Asset,
        cloid: ClientOrderId,
    ) -> Result<(), CoreError> {
        let index = self
            .ledger
            .orders
            .iter()
            .position(|o| o.sender == sender && o.asset == asset && o.cloid == Some(cloid))
            .ok_or(CoreError::CloidNotFound(cloid))?;
        self.cancel_pending(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::engine::AdminOverride;
    use crate::registry::TokenInfo;
    use crate::types::HYPE_SYSTEM_ADDRESS;

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);
    const VALIDATOR: Address = Address::repeat_byte(0x77);
    const USDC: TokenId = TokenId(0);
    const HYPE: TokenId = TokenId(150);

    fn sim() -> CoreSim {
        let mut sim = CoreSim::new(SimConfig::default());
        sim.register_token_info(USDC, TokenInfo::usdc()).unwrap();
        sim.register_token_info(HYPE, TokenInfo::hype()).unwrap();
        sim.register_validator(VALIDATOR);
        sim
    }

    fn send(destination: Address, token: TokenId, wei: u64) -> SpotSend {
        SpotSend {
            destination,
            token,
            wei,
        }
    }

    fn delegate(validator: Address, wei: u64, is_undelegate: bool) -> TokenDelegate {
        TokenDelegate {
            validator,
            wei,
            is_undelegate,
        }
    }

    fn class(ntl: u64, to_perp: bool) -> UsdClassTransfer {
        UsdClassTransfer { ntl, to_perp }
    }

    fn vault_transfer(vault: Address, is_deposit: bool, usd: u64) -> VaultTransfer {
        VaultTransfer {
            vault,
            is_deposit,
            usd,
        }
    }

    #[test]
    fn spot_send_splits_balance() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, USDC, 100).unwrap();
        sim.execute_spot_send(ALICE, send(BOB, USDC, 40)).unwrap();

        assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().total, 60);
        assert_eq!(sim.read_spot_balance(BOB, USDC).unwrap().total, 40);
        assert!(sim.core_user_exists(BOB));
    }

    #[test]
    fn spot_send_rules() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, USDC, 100).unwrap();

        let self_send = sim.execute_spot_send(ALICE, send(ALICE, USDC, 1));
        assert_eq!(self_send, Err(CoreError::CannotSelfTransfer));

        let unknown = sim.execute_spot_send(ALICE, send(BOB, TokenId(9), 1));
        assert_eq!(unknown, Err(CoreError::InvalidToken(TokenId(9))));

        let too_much = sim.execute_spot_send(ALICE, send(BOB, USDC, 101));
        assert!(matches!(
            too_much,
            Err(CoreError::Account(AccountError::InsufficientBalance { .. }))
        ));
        assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().total, 100);
    }

    #[test]
    fn send_to_hype_system_address_bridges_native() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, HYPE, 250).unwrap();
        sim.execute_spot_send(ALICE, send(HYPE_SYSTEM_ADDRESS, HYPE, 200)).unwrap();

        assert_eq!(sim.read_spot_balance(ALICE, HYPE).unwrap().total, 50);
        // 8 core decimals -> 18 evm decimals
        let scale = U256::from(10u64).pow(U256::from(10u64));
        assert_eq!(sim.evm_native_balance(ALICE), U256::from(200u64) * scale);
    }

    #[test]
    fn hype_index_address_is_not_a_bridge() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, HYPE, 250).unwrap();
        let mut bytes = [0u8; 20];
        bytes[0] = 0x20;
        bytes[19] = 150;
        let lookalike = Address::from(bytes);

        sim.execute_spot_send(ALICE, send(lookalike, HYPE, 200)).unwrap();
        assert_eq!(sim.evm_native_balance(ALICE), U256::ZERO);
        assert_eq!(sim.read_spot_balance(lookalike, HYPE).unwrap().total, 200);
    }

    #[test]
    fn usd_class_round_trip_scales_decimals() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, USDC, 1_000_00).unwrap();
        sim.execute_usd_class_transfer(ALICE, class(600, true)).unwrap();
        // 600 perp units at 1e6 = 60_000 wei at 1e8
        assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().total, 40_000);
        assert_eq!(sim.account(ALICE).unwrap().perp_balance, 600);

        let too_much = sim.execute_usd_class_transfer(ALICE, class(601, false));
        assert!(matches!(
            too_much,
            Err(CoreError::Account(AccountError::InsufficientPerpBalance { .. }))
        ));

        sim.execute_usd_class_transfer(ALICE, class(600, false)).unwrap();
        assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().total, 100_000);
    }

    #[test]
    fn delegation_lock_gates_undelegate() {
        let mut sim = sim();
        sim.set_time(Timestamp(1_000));
        sim.force_staking_balance(ALICE, 500);
        sim.execute_token_delegate(ALICE, delegate(VALIDATOR, 300, false)).unwrap();
        let delegation = sim.read_delegation(ALICE, VALIDATOR).unwrap();
        assert_eq!(delegation.locked_until_timestamp, 1_000 + 86_400);

        sim.set_time(Timestamp(1_000 + 86_399));
        let early = sim.execute_token_delegate(ALICE, delegate(VALIDATOR, 100, true));
        assert_eq!(
            early,
            Err(CoreError::StillLockedUntilTimestamp { locked_until: 87_400, now: 87_399 })
        );

        sim.set_time(Timestamp(1_000 + 86_400));
        sim.execute_token_delegate(ALICE, delegate(VALIDATOR, 100, true)).unwrap();
        let summary = sim.read_delegator_summary(ALICE).unwrap();
        assert_eq!(summary.delegated, 200);
        assert_eq!(summary.undelegated, 300);
    }

    #[test]
    fn delegate_to_unknown_validator() {
        let mut sim = sim();
        sim.force_staking_balance(ALICE, 500);
        let stranger = Address::repeat_byte(0x55);
        let result = sim.execute_token_delegate(ALICE, delegate(stranger, 1, false));
        assert_eq!(result, Err(CoreError::UnknownValidator(stranger)));
    }

    #[test]
    fn staking_withdrawal_matures_after_delay() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, HYPE, 1_000).unwrap();
        sim.execute_staking_deposit(ALICE, 800).unwrap();
        sim.execute_staking_withdraw(ALICE, 300).unwrap();

        let summary = sim.read_delegator_summary(ALICE).unwrap();
        assert_eq!(summary.undelegated, 500);
        assert_eq!(summary.total_pending_withdrawal, 300);

        sim.advance_time(7 * 86_400 - 1);
        assert_eq!(sim.process_staking_withdrawals(), 0);
        sim.advance_time(1);
        assert_eq!(sim.process_staking_withdrawals(), 300);
        assert_eq!(sim.read_spot_balance(ALICE, HYPE).unwrap().total, 500);
        assert_eq!(sim.read_delegator_summary(ALICE).unwrap().n_pending_withdrawals, 0);
    }

    #[test]
    fn overflowing_payout_is_skipped_and_kept() {
        let mut sim = sim();
        for who in [ALICE, BOB] {
            sim.force_staking_balance(who, 10);
            sim.execute_staking_withdraw(who, 10).unwrap();
        }
        sim.force_spot_balance(ALICE, HYPE, u64::MAX).unwrap();
        sim.advance_time(7 * 86_400);

        // bob is still paid even though alice comes first
        assert_eq!(sim.process_staking_withdrawals(), 10);
        assert_eq!(sim.read_spot_balance(BOB, HYPE).unwrap().total, 10);
        assert_eq!(sim.read_spot_balance(ALICE, HYPE).unwrap().total, u64::MAX);
        assert_eq!(sim.read_delegator_summary(ALICE).unwrap().n_pending_withdrawals, 1);
    }

    #[test]
    fn vault_withdraw_waits_for_lock() {
        let mut sim = sim();
        let vault = Address::repeat_byte(0xee);
        sim.force_perp_balance(ALICE, 1_000).unwrap();
        sim.execute_vault_transfer(ALICE, vault_transfer(vault, true, 400)).unwrap();
        assert_eq!(sim.read_user_vault_equity(ALICE, vault).unwrap().equity, 400);

        let locked = sim.execute_vault_transfer(ALICE, vault_transfer(vault, false, 100));
        assert!(matches!(locked, Err(CoreError::StillLockedUntilTimestamp { .. })));

        sim.advance_time(86_400);
        sim.execute_vault_transfer(ALICE, vault_transfer(vault, false, 400)).unwrap();
        assert_eq!(sim.account(ALICE).unwrap().perp_balance, 1_000);
    }
}
