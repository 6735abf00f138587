// 8.4 engine/bridge.rs: moving tokens between core and the EVM side.
// core -> evm happens inside a spot send to a system address and lands at once.
// evm -> core debits the EVM balance now and credits core when the callback for its id runs.

use super::core::{CoreSim, PendingBridgeCredit};
use super::results::CoreError;
use crate::events::{BridgeToCoreEvent, BridgedToEvmEvent, EventPayload};
use crate::registry::TokenInfo;
use crate::types::{Address, TokenId, U256};

// None past 10^77, the largest power of ten a U256 holds
fn pow10(exp: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}

/// Core wei -> EVM amount.
pub fn core_to_evm(wei: u64, extra_wei_decimals: i8) -> Result<U256, CoreError> {
    let wei = U256::from(wei);
    let amount = if extra_wei_decimals >= 0 {
        pow10(extra_wei_decimals as u8)
            .and_then(|factor| wei.checked_mul(factor))
            .ok_or(CoreError::CoreAmountTooLarge(wei))?
    } else {
        pow10(extra_wei_decimals.unsigned_abs()).map_or(U256::ZERO, |factor| wei / factor)
    };
    if amount.is_zero() {
        return Err(CoreError::EvmAmountTooSmall(amount));
    }
    Ok(amount)
}

/// EVM amount -> (core wei, EVM amount actually consumed).
/// Dust below one core wei stays on the EVM side.
pub fn evm_to_core(amount: U256, extra_wei_decimals: i8) -> Result<(u64, U256), CoreError> {
    let (core, consumed) = if extra_wei_decimals >= 0 {
        match pow10(extra_wei_decimals as u8) {
            Some(factor) => {
                let core = amount / factor;
                (core, core * factor)
            }
            None => (U256::ZERO, U256::ZERO),
        }
    } else {
        let core = pow10(extra_wei_decimals.unsigned_abs())
            .and_then(|factor| amount.checked_mul(factor))
            .ok_or(CoreError::CoreAmountTooLarge(amount))?;
        (core, amount)
    };
    if core.is_zero() {
        return Err(CoreError::EvmAmountTooSmall(amount));
    }
    let core = u64::try_from(core).map_err(|_| CoreError::CoreAmountTooLarge(amount))?;
    Ok((core, consumed))
}

impl CoreSim {
    /// Credits the EVM side of a core -> EVM send. Returns the EVM amount.
    pub(super) fn credit_evm_side(
        &mut self,
        account: Address,
        token: TokenId,
        info: &TokenInfo,
        wei: u64,
    ) -> Result<U256, CoreError> {
        let amount = core_to_evm(wei, info.evm_extra_wei_decimals)?;
        if token == self.config.hype_token {
            let balance = self.ledger.evm_native_balances.entry(account).or_insert(U256::ZERO);
            *balance = balance.saturating_add(amount);
        } else {
            if info.evm_contract.is_none() {
                return Err(CoreError::TokenNotLinked(token));
            }
            let balance = self
                .ledger
                .evm_token_balances
                .entry((account, token))
                .or_insert(U256::ZERO);
            *balance = balance.saturating_add(amount);
        }
        Ok(amount)
    }

    pub(super) fn on_bridged_to_evm(
        &mut self,
        account: Address,
        token: TokenId,
        core_wei: u64,
        evm_amount: U256,
    ) {
        tracing::info!(%account, %token, core_wei, %evm_amount, "bridged to evm");
        self.emit_event(EventPayload::BridgedToEvm(BridgedToEvmEvent {
            account,
            token,
            core_wei,
            evm_amount,
        }));
    }

    pub(super) fn bridge_token_to_core(
        &mut self,
        sender: Address,
        token: TokenId,
        amount: U256,
    ) -> Result<u64, CoreError> {
        if token == self.config.hype_token {
            return self.bridge_native_to_core(sender, amount);
        }
        let info = self
            .ledger
            .registry
            .token_info(token)
            .ok_or(CoreError::InvalidToken(token))?;
        if info.evm_contract.is_none() {
            return Err(CoreError::TokenNotLinked(token));
        }
        let (core_wei, consumed) = evm_to_core(amount, info.evm_extra_wei_decimals)?;

        let available = self.evm_token_balance(sender, token);
        if available < consumed {
            return Err(CoreError::EvmBalanceTooLow {
                token,
                requested: amount,
                available,
            });
        }
        self.ledger
            .evm_token_balances
            .insert((sender, token), available - consumed);

        Ok(self.record_bridge_credit(sender, token, core_wei, false))
    }

    pub(super) fn bridge_native_to_core(
        &mut self,
        sender: Address,
        amount: U256,
    ) -> Result<u64, CoreError> {
        let hype = self.config.hype_token;
        let info = self
            .ledger
            .registry
            .token_info(hype)
            .ok_or(CoreError::InvalidToken(hype))?;
        let (core_wei, consumed) = evm_to_core(amount, info.evm_extra_wei_decimals)?;

        let available = self.evm_native_balance(sender);
        if available < consumed {
            return Err(CoreError::HypeTransferFailed {
                reason: format!("native balance {available} below {consumed}"),
            });
        }
        self.ledger.evm_native_balances.insert(sender, available - consumed);

        Ok(self.record_bridge_credit(sender, hype, core_wei, true))
    }

    fn record_bridge_credit(
        &mut self,
        recipient: Address,
        token: TokenId,
        core_wei: u64,
        native: bool,
    ) -> u64 {
        let id = self.ledger.next_bridge_id;
        self.ledger.next_bridge_id += 1;
        let credit = PendingBridgeCredit {
            id,
            recipient,
            token,
            core_wei,
            native,
        };
        self.ledger.bridge_credits.insert(id, credit);

        self.emit_event(EventPayload::BridgeInitiated(BridgeToCoreEvent {
            id,
            recipient,
            token,
            core_wei,
            native,
        }));
        id
    }

    /// Finalizes an ERC20 -> core transfer. Each id credits exactly once.
    pub fn token_transfer_callback(&mut self, id: u64) -> Result<(), CoreError> {
        self.finalize_bridge_credit(id, false)
    }

    /// Finalizes a native HYPE -> core transfer. Each id credits exactly once.
    pub fn native_transfer_callback(&mut self, id: u64) -> Result<(), CoreError> {
        self.finalize_bridge_credit(id, true)
    }

    fn finalize_bridge_credit(&mut self, id: u64, native: bool) -> Result<(), CoreError> {
        let credit = match self.ledger.bridge_credits.get(&id) {
            Some(credit) if credit.native == native => *credit,
            _ => return Err(CoreError::BridgeTransferNotFound(id)),
        };

        let mut account = self.staged_account(credit.recipient);
        account.activated = true;
        account.credit_spot(credit.token, credit.core_wei)?;
        self.commit_account(account);
        self.ledger.bridge_credits.remove(&id);

        tracing::info!(
            id,
            recipient = %credit.recipient,
            token = %credit.token,
            core_wei = credit.core_wei,
            "bridge credit finalized"
        );
        self.emit_event(EventPayload::BridgeFinalized(BridgeToCoreEvent {
            id,
            recipient: credit.recipient,
            token: credit.token,
            core_wei: credit.core_wei,
            native,
        }));
        Ok(())
    }
}
