//! Test-only overrides and registration calls.

use super::core::CoreSim;
use super::results::CoreError;
use super::traits::AdminOverride;
use crate::account::{Delegation, VaultEquity};
use crate::events::{AdminOverrideEvent, EventPayload};
use crate::registry::{PerpAssetInfo, SpotInfo, TokenInfo};
use crate::types::{to_i64, Address, PerpId, SpotMarketId, TokenId, U256};

impl CoreSim {
    pub fn register_token_info(
        &mut self,
        token: TokenId,
        info: TokenInfo,
    ) -> Result<(), CoreError> {
        self.ledger.registry.register_token_info(token, info)?;
        Ok(())
    }

    pub fn register_perp(&mut self, perp: PerpId, info: PerpAssetInfo) -> Result<(), CoreError> {
        self.ledger.registry.register_perp(perp, info)?;
        Ok(())
    }

    pub fn register_spot(&mut self, spot: SpotMarketId, info: SpotInfo) -> Result<(), CoreError> {
        self.ledger.registry.register_spot(spot, info)?;
        Ok(())
    }

    pub fn link_evm_contract(
        &mut self,
        token: TokenId,
        contract: Address,
        extra_wei_decimals: i8,
    ) -> Result<(), CoreError> {
        self.ledger
            .registry
            .link_evm_contract(token, contract, extra_wei_decimals)?;
        Ok(())
    }

    pub fn register_validator(&mut self, validator: Address) {
        self.ledger.registry.register_validator(validator);
    }

    pub fn token_exists(&self, token: TokenId) -> bool {
        self.ledger.registry.token_exists(token)
    }

    pub fn validator_exists(&self, validator: Address) -> bool {
        self.ledger.registry.validator_exists(validator)
    }

    fn record_override(&mut self, account: Address, field: &str) {
        tracing::debug!(%account, field, "admin override");
        self.emit_event(EventPayload::AdminOverride(AdminOverrideEvent {
            account,
            field: field.to_string(),
        }));
    }

    fn activated(&self, address: Address) -> crate::account::Account {
        let mut account = self.staged_account(address);
        account.activated = true;
        account
    }
}

impl AdminOverride for CoreSim {
    fn force_account_activation(&mut self, account: Address, activated: bool) {
        let mut staged = self.staged_account(account);
        staged.activated = activated;
        self.commit_account(staged);
        self.record_override(account, "activation");
    }

    fn force_spot_balance(
        &mut self,
        account: Address,
        token: TokenId,
        wei: u64,
    ) -> Result<(), CoreError> {
        if !self.ledger.registry.token_exists(token) {
            return Err(CoreError::InvalidToken(token));
        }
        let mut staged = self.activated(account);
        staged.set_spot_total(token, wei);
        self.commit_account(staged);
        self.record_override(account, "spot_balance");
        Ok(())
    }

    fn force_perp_balance(&mut self, account: Address, usd: u64) -> Result<(), CoreError> {
        let balance = to_i64(usd as i128)?;
        let mut staged = self.activated(account);
        staged.perp_balance = balance;
        self.commit_account(staged);
        self.record_override(account, "perp_balance");
        Ok(())
    }

    fn force_staking_balance(&mut self, account: Address, wei: u64) {
        let mut staged = self.activated(account);
        staged.staking_balance = wei;
        self.commit_account(staged);
        self.record_override(account, "staking_balance");
    }

    fn force_delegation(
        &mut self,
        account: Address,
        validator: Address,
        amount: u64,
        locked_until_timestamp: u64,
    ) -> Result<(), CoreError> {
        if !self.ledger.registry.validator_exists(validator) {
            return Err(CoreError::UnknownValidator(validator));
        }
        let mut staged = self.activated(account);
        let delegation = staged.delegations.entry(validator).or_insert(Delegation {
            validator,
            amount: 0,
            locked_until_timestamp: 0,
        });
        delegation.amount = amount;
        // locks never move backwards
        delegation.locked_until_timestamp =
            delegation.locked_until_timestamp.max(locked_until_timestamp);
        self.commit_account(staged);
        self.record_override(account, "delegation");
        Ok(())
    }

    fn force_vault_equity(
        &mut self,
        account: Address,
        vault: Address,
        equity: u64,
        locked_until_timestamp: u64,
    ) {
        let mut staged = self.activated(account);
        let entry = staged.vault_equity.entry(vault).or_insert(VaultEquity::default());
        entry.equity = equity;
        entry.locked_until_timestamp = entry.locked_until_timestamp.max(locked_until_timestamp);
        self.commit_account(staged);
        self.record_override(account, "vault_equity");
    }

    fn force_evm_balance(
        &mut self,
        account: Address,
        token: TokenId,
        amount: U256,
    ) -> Result<(), CoreError> {
        if !self.ledger.registry.token_exists(token) {
            return Err(CoreError::InvalidToken(token));
        }
        self.ledger.evm_token_balances.insert((account, token), amount);
        let staged = self.activated(account);
        self.commit_account(staged);
        self.record_override(account, "evm_balance");
        Ok(())
    }

    fn force_native_balance(&mut self, account: Address, amount: U256) {
        self.ledger.evm_native_balances.insert(account, amount);
        let staged = self.activated(account);
        self.commit_account(staged);
        self.record_override(account, "native_balance");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn sim() -> CoreSim {
        let mut sim = CoreSim::new(SimConfig::default());
        sim.register_token_info(TokenId(0), TokenInfo::usdc()).unwrap();
        sim
    }

    #[test]
    fn forcing_activates() {
        let mut sim = sim();
        let user = Address::repeat_byte(1);
        assert!(!sim.core_user_exists(user));
        sim.force_spot_balance(user, TokenId(0), 0).unwrap();
        assert!(sim.core_user_exists(user));
    }

    #[test]
    fn force_unknown_token_rejected() {
        let mut sim = sim();
        let result = sim.force_spot_balance(Address::repeat_byte(1), TokenId(42), 5);
        assert_eq!(result, Err(CoreError::InvalidToken(TokenId(42))));
    }

    #[test]
    fn forced_lock_never_moves_backwards() {
        let mut sim = sim();
        let user = Address::repeat_byte(1);
        let validator = Address::repeat_byte(7);
        sim.register_validator(validator);
        sim.force_delegation(user, validator, 100, 5_000).unwrap();
        sim.force_delegation(user, validator, 50, 1_000).unwrap();

        let delegation = sim.read_delegation(user, validator).unwrap();
        assert_eq!(delegation.amount, 50);
        assert_eq!(delegation.locked_until_timestamp, 5_000);
    }

    #[test]
    fn force_delegation_needs_validator() {
        let mut sim = sim();
        let validator = Address::repeat_byte(7);
        let result = sim.force_delegation(Address::repeat_byte(1), validator, 1, 0);
        assert_eq!(result, Err(CoreError::UnknownValidator(validator)));
    }

    #[test]
    fn deactivation_keeps_balances() {
        let mut sim = sim();
        let user = Address::repeat_byte(1);
        sim.force_spot_balance(user, TokenId(0), 10).unwrap();
        sim.force_account_activation(user, false);
        assert!(!sim.core_user_exists(user));
        assert_eq!(sim.account(user).unwrap().spot_balance(TokenId(0)).total, 10);
    }
}
