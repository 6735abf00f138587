//! Account state held by the core ledger.
//!
//! An account carries four independent balance classes: spot token balances,
//! the perp USD balance backing its positions, the staking balance with its
//! delegations and pending withdrawals, and vault equity. Existence is an
//! explicit bit: an account can be activated with every balance at zero.

use crate::position::Position;
use crate::types::{to_u64, Address, CastError, PerpId, Timestamp, TokenId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotBalance {
    pub total: u64,
    /// Reserved by resting orders. Never exceeds `total`.
    pub hold: u64,
    pub entry_ntl: u64,
}

impl SpotBalance {
    pub fn available(&self) -> u64 {
        self.total - self.hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub validator: Address,
    pub amount: u64,
    pub locked_until_timestamp: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEquity {
    pub equity: u64,
    pub locked_until_timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub amount: u64,
    pub unlocks_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorSummary {
    pub delegated: u64,
    pub undelegated: u64,
    pub total_pending_withdrawal: u64,
    pub n_pending_withdrawals: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub activated: bool,
    pub spot_balances: HashMap<TokenId, SpotBalance>,
    /// Perp USD class balance. Goes negative only while an account is underwater.
    pub perp_balance: i64,
    pub positions: BTreeMap<PerpId, Position>,
    /// Staked but undelegated.
    pub staking_balance: u64,
    pub delegations: IndexMap<Address, Delegation>,
    pub pending_withdrawals: VecDeque<PendingWithdrawal>,
    pub vault_equity: HashMap<Address, VaultEquity>,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(address: Address, timestamp: Timestamp) -> Self {
        Self {
            address,
            activated: false,
            spot_balances: HashMap::new(),
            perp_balance: 0,
            positions: BTreeMap::new(),
            staking_balance: 0,
            delegations: IndexMap::new(),
            pending_withdrawals: VecDeque::new(),
            vault_equity: HashMap::new(),
            created_at: timestamp,
        }
    }

    pub fn spot_balance(&self, token: TokenId) -> SpotBalance {
        self.spot_balances.get(&token).copied().unwrap_or_default()
    }

    pub fn credit_spot(&mut self, token: TokenId, wei: u64) -> Result<(), AccountError> {
        let balance = self.spot_balances.entry(token).or_default();
        balance.total = balance
            .total
            .checked_add(wei)
            .ok_or(AccountError::BalanceOverflow(token))?;
        Ok(())
    }

    /// Debits unreserved balance. Cost basis shrinks in proportion to what left.
    pub fn debit_spot(&mut self, token: TokenId, wei: u64) -> Result<(), AccountError> {
        let balance = self.spot_balances.entry(token).or_default();
        if wei > balance.available() {
            return Err(AccountError::InsufficientBalance {
                token,
                requested: wei,
                available: balance.available(),
            });
        }
        if balance.total > 0 {
            let removed_basis = balance.entry_ntl as u128 * wei as u128 / balance.total as u128;
            balance.entry_ntl -= removed_basis as u64;
        }
        balance.total -= wei;
        Ok(())
    }

    pub fn place_hold(&mut self, token: TokenId, wei: u64) -> Result<(), AccountError> {
        let balance = self.spot_balances.entry(token).or_default();
        if wei > balance.available() {
            return Err(AccountError::InsufficientBalance {
                token,
                requested: wei,
                available: balance.available(),
            });
        }
        balance.hold += wei;
        Ok(())
    }

    pub fn release_hold(&mut self, token: TokenId, wei: u64) {
        if let Some(balance) = self.spot_balances.get_mut(&token) {
            balance.hold = balance.hold.saturating_sub(wei);
        }
    }

    /// Overwrites the total. A hold above the new total is cut down to it.
    pub fn set_spot_total(&mut self, token: TokenId, wei: u64) {
        let balance = self.spot_balances.entry(token).or_default();
        balance.total = wei;
        balance.hold = balance.hold.min(wei);
        if wei == 0 {
            balance.entry_ntl = 0;
        }
    }

    pub fn position(&self, perp: PerpId) -> Option<&Position> {
        self.positions.get(&perp)
    }

    pub fn set_position(&mut self, perp: PerpId, position: Position) {
        self.positions.insert(perp, position);
    }

    pub fn open_positions(&self) -> impl Iterator<Item = (&PerpId, &Position)> {
        self.positions.iter().filter(|(_, p)| !p.is_empty())
    }

    pub fn has_open_positions(&self) -> bool {
        self.open_positions().next().is_some()
    }

    pub fn delegated_total(&self) -> Result<u64, CastError> {
        to_u64(self.delegations.values().map(|d| d.amount as i128).sum())
    }

    // derived on read, never stored
    pub fn delegator_summary(&self) -> Result<DelegatorSummary, CastError> {
        Ok(DelegatorSummary {
            delegated: self.delegated_total()?,
            undelegated: self.staking_balance,
            total_pending_withdrawal: to_u64(
                self.pending_withdrawals.iter().map(|w| w.amount as i128).sum(),
            )?,
            n_pending_withdrawals: self.pending_withdrawals.len() as u64,
        })
    }

    /// Pops every withdrawal that has unlocked by `now`, oldest first.
    pub fn take_matured_withdrawals(&mut self, now: Timestamp) -> Vec<PendingWithdrawal> {
        let mut matured = Vec::new();
        self.pending_withdrawals.retain(|w| {
            if w.unlocks_at <= now {
                matured.push(*w);
                false
            } else {
                true
            }
        });
        matured
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient {token} balance: requested {requested}, available {available}")]
    InsufficientBalance { token: TokenId, requested: u64, available: u64 },

    #[error("Insufficient perp balance: requested {requested}, available {available}")]
    InsufficientPerpBalance { requested: u64, available: u64 },

    #[error("Insufficient staking balance: requested {requested}, available {available}")]
    InsufficientStakingBalance { requested: u64, available: u64 },

    #[error("Insufficient delegation to {validator}: requested {requested}, delegated {delegated}")]
    InsufficientDelegation { validator: Address, requested: u64, delegated: u64 },

    #[error("Insufficient vault equity in {vault}: requested {requested}, equity {equity}")]
    InsufficientVaultEquity { vault: Address, requested: u64, equity: u64 },

    #[error("Insufficient margin: required {required}, account value {account_value}")]
    InsufficientMargin { required: u64, account_value: i64 },

    #[error("{0} balance overflow")]
    BalanceOverflow(TokenId),
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: TokenId = TokenId(0);

    fn funded() -> Account {
        let mut account = Account::new(Address::repeat_byte(1), Timestamp(0));
        account.credit_spot(USDC, 1_000).unwrap();
        account
    }

    #[test]
    fn debit_respects_hold() {
        let mut account = funded();
        account.place_hold(USDC, 700).unwrap();
        let result = account.debit_spot(USDC, 400);
        assert_eq!(
            result,
            Err(AccountError::InsufficientBalance { token: USDC, requested: 400, available: 300 })
        );
        account.debit_spot(USDC, 300).unwrap();
        let balance = account.spot_balance(USDC);
        assert_eq!(balance.total, 700);
        assert_eq!(balance.hold, 700);
    }

    #[test]
    fn release_hold_frees_balance() {
        let mut account = funded();
        account.place_hold(USDC, 1_000).unwrap();
        account.release_hold(USDC, 1_000);
        assert_eq!(account.spot_balance(USDC).available(), 1_000);
    }

    #[test]
    fn force_total_clamps_hold() {
        let mut account = funded();
        account.place_hold(USDC, 800).unwrap();
        account.set_spot_total(USDC, 500);
        let balance = account.spot_balance(USDC);
        assert_eq!(balance.total, 500);
        assert_eq!(balance.hold, 500);
    }

    #[test]
    fn debit_shrinks_cost_basis() {
        let mut account = funded();
        account.spot_balances.get_mut(&USDC).unwrap().entry_ntl = 2_000;
        account.debit_spot(USDC, 250).unwrap();
        assert_eq!(account.spot_balance(USDC).entry_ntl, 1_500);
    }

    #[test]
    fn credit_overflow_detected() {
        let mut account = funded();
        assert_eq!(account.credit_spot(USDC, u64::MAX), Err(AccountError::BalanceOverflow(USDC)));
    }

    #[test]
    fn delegator_summary_is_derived() {
        let mut account = funded();
        account.staking_balance = 50;
        account.delegations.insert(
            Address::repeat_byte(9),
            Delegation {
                validator: Address::repeat_byte(9),
                amount: 30,
                locked_until_timestamp: 0,
            },
        );
        for (amount, at) in [(5, 10), (7, 20)] {
            let withdrawal = PendingWithdrawal { amount, unlocks_at: Timestamp(at) };
            account.pending_withdrawals.push_back(withdrawal);
        }

        let summary = account.delegator_summary().unwrap();
        assert_eq!(summary.delegated, 30);
        assert_eq!(summary.undelegated, 50);
        assert_eq!(summary.total_pending_withdrawal, 12);
        assert_eq!(summary.n_pending_withdrawals, 2);

        let matured = account.take_matured_withdrawals(Timestamp(15));
        assert_eq!(matured.len(), 1);
        assert_eq!(account.delegator_summary().unwrap().n_pending_withdrawals, 1);
    }

    #[test]
    fn delegator_totals_past_u64_are_reported() {
        let mut account = funded();
        for (byte, amount) in [(1u8, u64::MAX), (2, 1)] {
            let validator = Address::repeat_byte(byte);
            account
                .delegations
                .insert(validator, Delegation { validator, amount, locked_until_timestamp: 0 });
        }
        assert!(matches!(account.delegated_total(), Err(CastError::UintDowncast { bits: 64, .. })));
        assert!(account.delegator_summary().is_err());

        account.delegations.clear();
        for at in [1, 2] {
            let withdrawal = PendingWithdrawal { amount: u64::MAX, unlocks_at: Timestamp(at) };
            account.pending_withdrawals.push_back(withdrawal);
        }
        assert!(matches!(account.delegator_summary(), Err(CastError::UintDowncast { .. })));
    }
}
