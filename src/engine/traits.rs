//! The two write surfaces of the core.
//!
//! `LedgerMutator` is the production path: every queued action lands on one of
//! these methods, and each either applies completely or fails leaving the
//! ledger untouched. `AdminOverride` is test setup only. It writes balances
//! directly, bypasses every domain rule except lock monotonicity, and never
//! sits behind the action queue.

use super::results::{CoreError, OrderResult};
use crate::action::{LimitOrder, SpotSend, TokenDelegate, UsdClassTransfer, VaultTransfer};
use crate::types::{Address, Asset, ClientOrderId, OrderId, PerpId, TokenId, U256};

pub trait LedgerMutator {
    fn execute_perp_limit_order(
        &mut self,
        sender: Address,
        order: LimitOrder,
    ) -> Result<OrderResult, CoreError>;

    fn execute_spot_limit_order(
        &mut self,
        sender: Address,
        order: LimitOrder,
    ) -> Result<OrderResult, CoreError>;

    fn execute_spot_send(&mut self, sender: Address, send: SpotSend) -> Result<(), CoreError>;

    fn execute_staking_deposit(&mut self, sender: Address, wei: u64) -> Result<(), CoreError>;

    /// Starts the unstaking delay. The wei comes back through `process_staking_withdrawals`.
    fn execute_staking_withdraw(&mut self, sender: Address, wei: u64) -> Result<(), CoreError>;

    fn execute_token_delegate(
        &mut self,
        sender: Address,
        delegate: TokenDelegate,
    ) -> Result<(), CoreError>;

    fn execute_usd_class_transfer(
        &mut self,
        sender: Address,
        transfer: UsdClassTransfer,
    ) -> Result<(), CoreError>;

    fn execute_vault_transfer(
        &mut self,
        sender: Address,
        transfer: VaultTransfer,
    ) -> Result<(), CoreError>;

    /// EVM -> core for a linked token. Returns the id its callback finalizes.
    fn execute_token_transfer(
        &mut self,
        sender: Address,
        token: TokenId,
        amount: U256,
    ) -> Result<u64, CoreError>;

    /// EVM -> core for native HYPE. Returns the id its callback finalizes.
    fn execute_native_transfer(&mut self, sender: Address, amount: U256) -> Result<u64, CoreError>;

    fn update_leverage(
        &mut self,
        sender: Address,
        perp: PerpId,
        leverage: u32,
        is_isolated: bool,
    ) -> Result<(), CoreError>;

    fn cancel_order_by_oid(
        &mut self,
        sender: Address,
        asset: Asset,
        oid: OrderId,
    ) -> Result<(), CoreError>;

    fn cancel_order_by_cloid(
        &mut self,
        sender: Address,
        asset: Asset,
        cloid: ClientOrderId,
    ) -> Result<(), CoreError>;
}

pub trait AdminOverride {
    fn force_account_activation(&mut self, account: Address, activated: bool);

    fn force_spot_balance(
        &mut self,
        account: Address,
        token: TokenId,
        wei: u64,
    ) -> Result<(), CoreError>;

    fn force_perp_balance(&mut self, account: Address, usd: u64) -> Result<(), CoreError>;

    fn force_staking_balance(&mut self, account: Address, wei: u64);

    fn force_delegation(
        &mut self,
        account: Address,
        validator: Address,
        amount: u64,
        locked_until_timestamp: u64,
    ) -> Result<(), CoreError>;

    fn force_vault_equity(
        &mut self,
        account: Address,
        vault: Address,
        equity: u64,
        locked_until_timestamp: u64,
    );

    fn force_evm_balance(
        &mut self,
        account: Address,
        token: TokenId,
        amount: U256,
    ) -> Result<(), CoreError>;

    fn force_native_balance(&mut self, account: Address, amount: U256);
}
