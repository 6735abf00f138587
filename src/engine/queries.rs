//! Precompile reads.
//!
//! Every read is a pure function of the ledger. A read on an account the core
//! has never seen, or on a sub-entity that does not exist, fails with the
//! matching `PrecompileFailed` variant rather than returning zeroes.

use super::core::CoreSim;
use super::pricing::price_read_error;
use super::results::{CoreError, PrecompileError};
use crate::account::{Account, Delegation, DelegatorSummary, SpotBalance, VaultEquity};
use crate::margin::{
    calculate_margin_summary, calculate_withdrawable, AccountMarginSummary, MarginError,
    Withdrawable,
};
use crate::oracle::{Bbo, PriceKey};
use crate::position::Position;
use crate::registry::{PerpAssetInfo, SpotInfo, TokenInfo};
use crate::types::{Address, Asset, PerpId, SpotMarketId, TokenId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSupply {
    pub max_supply: u64,
    /// Spot balances plus everything staked, delegated or unstaking.
    pub total_supply: u64,
}

impl CoreSim {
    fn read_account(
        &self,
        user: Address,
        precompile: PrecompileError,
    ) -> Result<&Account, CoreError> {
        self.ledger
            .accounts
            .get(&user)
            .ok_or_else(|| CoreError::precompile(precompile, format!("unknown account {user}")))
    }

    pub fn core_user_exists(&self, user: Address) -> bool {
        self.ledger
            .accounts
            .get(&user)
            .map(|account| account.activated)
            .unwrap_or(false)
    }

    pub fn read_account_margin_summary(
        &self,
        user: Address,
    ) -> Result<AccountMarginSummary, CoreError> {
        let account = self.read_account(user, PrecompileError::AccountMarginSummary)?;
        calculate_margin_summary(account, self.mark_px_fn())
            .map_err(|e| margin_read_error(e, PrecompileError::AccountMarginSummary))
    }

    pub fn read_withdrawable(&self, user: Address) -> Result<Withdrawable, CoreError> {
        let account = self.read_account(user, PrecompileError::Withdrawable)?;
        calculate_withdrawable(account, self.mark_px_fn())
            .map_err(|e| margin_read_error(e, PrecompileError::Withdrawable))
    }

    /// A registered perp the user never traded reads as a flat position.
    pub fn read_position(&self, user: Address, perp: PerpId) -> Result<Position, CoreError> {
        let account = self.read_account(user, PrecompileError::Position)?;
        if let Some(position) = account.position(perp) {
            return Ok(*position);
        }
        let info = self
            .ledger
            .registry
            .perp_info(perp)
            .ok_or_else(|| {
                CoreError::precompile(PrecompileError::Position, format!("unknown {perp}"))
            })?;
        let leverage = self.config.default_leverage.min(info.max_leverage);
        Ok(Position::flat(leverage, info.only_isolated))
    }

    pub fn read_spot_balance(
        &self,
        user: Address,
        token: TokenId,
    ) -> Result<SpotBalance, CoreError> {
        let account = self.read_account(user, PrecompileError::SpotBalance)?;
        if !self.ledger.registry.token_exists(token) {
            return Err(CoreError::precompile(
                PrecompileError::SpotBalance,
                format!("unknown {token}"),
            ));
        }
        Ok(account.spot_balance(token))
    }

    pub fn read_delegation(
        &self,
        user: Address,
        validator: Address,
    ) -> Result<Delegation, CoreError> {
        let account = self.read_account(user, PrecompileError::Delegations)?;
        account
            .delegations
            .get(&validator)
            .copied()
            .ok_or_else(|| {
                let reason = format!("no delegation to {validator}");
                CoreError::precompile(PrecompileError::Delegations, reason)
            })
    }

    /// Live delegations in the order they were first made.
    pub fn read_delegations(&self, user: Address) -> Result<Vec<Delegation>, CoreError> {
        let account = self.read_account(user, PrecompileError::Delegations)?;
        Ok(account
            .delegations
            .values()
            .filter(|d| d.amount > 0)
            .copied()
            .collect())
    }

    pub fn read_delegator_summary(&self, user: Address) -> Result<DelegatorSummary, CoreError> {
        let account = self.read_account(user, PrecompileError::DelegatorSummary)?;
        Ok(account.delegator_summary()?)
    }

    pub fn read_user_vault_equity(
        &self,
        user: Address,
        vault: Address,
    ) -> Result<VaultEquity, CoreError> {
        let account = self.read_account(user, PrecompileError::VaultEquity)?;
        account
            .vault_equity
            .get(&vault)
            .copied()
            .ok_or_else(|| {
                let reason = format!("no equity in vault {vault}");
                CoreError::precompile(PrecompileError::VaultEquity, reason)
            })
    }

    pub fn read_mark_px(&self, perp: PerpId) -> Result<u64, CoreError> {
        self.ledger.oracle.mark_px(perp).map_err(price_read_error)
    }

    pub fn read_spot_px(&self, spot: SpotMarketId) -> Result<u64, CoreError> {
        self.ledger.oracle.spot_px(spot).map_err(price_read_error)
    }

    // no separate oracle feed in the simulation
    pub fn read_oracle_px(&self, perp: PerpId) -> Result<u64, CoreError> {
        self.ledger
            .oracle
            .mark_px(perp)
            .map_err(|e| CoreError::precompile(PrecompileError::OraclePx, e))
    }

    pub fn read_bbo(&self, asset: Asset) -> Result<Bbo, CoreError> {
        let key = match asset {
            Asset::Perp(perp) => PriceKey::Mark(perp),
            Asset::Spot(spot) => PriceKey::Spot(spot),
        };
        self.ledger
            .oracle
            .bbo(key)
            .map_err(|e| CoreError::precompile(PrecompileError::Bbo, e))
    }

    pub fn read_token_info(&self, token: TokenId) -> Result<TokenInfo, CoreError> {
        self.ledger
            .registry
            .token_info(token)
            .cloned()
            .ok_or_else(|| {
                CoreError::precompile(PrecompileError::TokenInfo, format!("unknown {token}"))
            })
    }

    pub fn read_token_supply(&self, token: TokenId) -> Result<TokenSupply, CoreError> {
        let info = self
            .ledger
            .registry
            .token_info(token)
            .ok_or_else(|| {
                CoreError::precompile(PrecompileError::TokenSupply, format!("unknown {token}"))
            })?;

        let is_hype = token == self.config.hype_token;
        let mut total = 0u128;
        for account in self.ledger.accounts.values() {
            total += account.spot_balance(token).total as u128;
            if is_hype {
                let summary = account.delegator_summary()?;
                total += summary.delegated as u128
                    + summary.undelegated as u128
                    + summary.total_pending_withdrawal as u128;
            }
        }

        Ok(TokenSupply {
            max_supply: info.max_supply,
            total_supply: u64::try_from(total).map_err(|_| {
                CoreError::precompile(PrecompileError::TokenSupply, "supply exceeds u64")
            })?,
        })
    }

    pub fn read_spot_info(&self, spot: SpotMarketId) -> Result<SpotInfo, CoreError> {
        self.ledger
            .registry
            .spot_info(spot)
            .cloned()
            .ok_or_else(|| {
                CoreError::precompile(PrecompileError::SpotInfo, format!("unknown {spot}"))
            })
    }

    pub fn read_perp_asset_info(&self, perp: PerpId) -> Result<PerpAssetInfo, CoreError> {
        self.ledger
            .registry
            .perp_info(perp)
            .cloned()
            .ok_or_else(|| {
                CoreError::precompile(PrecompileError::PerpAssetInfo, format!("unknown {perp}"))
            })
    }

    pub fn read_l1_block_number(&self) -> u64 {
        self.l1_block_number
    }

    pub fn spot_index_for(&self, base: TokenId, quote: TokenId) -> Result<SpotMarketId, CoreError> {
        Ok(self.ledger.registry.spot_index_for(base, quote)?)
    }

    pub fn max_leverage(&self, perp: PerpId) -> Result<u32, CoreError> {
        self.ledger
            .registry
            .max_leverage(perp)
            .ok_or(CoreError::UnknownAsset(Asset::Perp(perp)))
    }
}

// overflow stays a numeric error. a missing mark fails the read.
fn margin_read_error(err: MarginError, precompile: PrecompileError) -> CoreError {
    match err {
        MarginError::Cast(cast) => CoreError::Cast(cast),
        missing @ MarginError::MissingMarkPx(_) => CoreError::precompile(precompile, missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::engine::AdminOverride;
    use crate::registry::TokenInfo;
    use crate::types::CastError;

    const USER: Address = Address::repeat_byte(1);

    fn sim() -> CoreSim {
        let mut sim = CoreSim::new(SimConfig::default());
        sim.register_token_info(TokenId(0), TokenInfo::usdc()).unwrap();
        sim.register_perp(PerpId(0), PerpAssetInfo::new("BTC", 5, 40)).unwrap();
        sim
    }

    #[test]
    fn unknown_account_reads_fail() {
        let sim = sim();
        let err = sim.read_account_margin_summary(USER).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PrecompileFailed { precompile: PrecompileError::AccountMarginSummary, .. }
        ));
        assert!(sim.read_spot_balance(USER, TokenId(0)).is_err());
        assert!(!sim.core_user_exists(USER));
    }

    #[test]
    fn flat_position_for_known_account() {
        let mut sim = sim();
        sim.force_perp_balance(USER, 1_000).unwrap();
        let position = sim.read_position(USER, PerpId(0)).unwrap();
        assert!(position.is_empty());
        assert_eq!(position.leverage, 20);
        assert!(sim.read_position(USER, PerpId(5)).is_err());
    }

    #[test]
    fn missing_vault_and_delegation_fail() {
        let mut sim = sim();
        sim.force_perp_balance(USER, 1_000).unwrap();
        assert!(matches!(
            sim.read_user_vault_equity(USER, Address::repeat_byte(9)),
            Err(CoreError::PrecompileFailed { precompile: PrecompileError::VaultEquity, .. })
        ));
        assert!(matches!(
            sim.read_delegation(USER, Address::repeat_byte(9)),
            Err(CoreError::PrecompileFailed { precompile: PrecompileError::Delegations, .. })
        ));
        assert!(sim.read_delegations(USER).unwrap().is_empty());
    }

    #[test]
    fn bbo_and_oracle_follow_mark() {
        let mut sim = sim();
        sim.set_mark_px(PerpId(0), 64_000).unwrap();
        assert_eq!(sim.read_oracle_px(PerpId(0)).unwrap(), 64_000);
        let bbo = sim.read_bbo(Asset::Perp(PerpId(0))).unwrap();
        assert_eq!((bbo.bid, bbo.ask), (64_000, 64_000));
    }

    #[test]
    fn token_supply_sums_balances() {
        let mut sim = sim();
        sim.force_spot_balance(USER, TokenId(0), 70).unwrap();
        sim.force_spot_balance(Address::repeat_byte(2), TokenId(0), 30).unwrap();
        let supply = sim.read_token_supply(TokenId(0)).unwrap();
        assert_eq!(supply.total_supply, 100);
        assert_eq!(supply.max_supply, u64::MAX);
    }

    #[test]
    fn token_supply_reports_configured_cap() {
        let mut sim = sim();
        let ubtc = TokenId(197);
        let info = TokenInfo::new("UBTC", 5, 8)
            .with_evm_contract(Address::repeat_byte(0xbc), 10)
            .with_max_supply(21_000_000_00000000);
        sim.register_token_info(ubtc, info).unwrap();
        sim.force_spot_balance(USER, ubtc, 5_000).unwrap();

        let supply = sim.read_token_supply(ubtc).unwrap();
        assert_eq!(supply.max_supply, 21_000_000_00000000);
        assert_eq!(supply.total_supply, 5_000);
        let read = sim.read_token_info(ubtc).unwrap();
        assert_eq!(read.evm_contract, Some(Address::repeat_byte(0xbc)));
        assert_eq!(read.evm_extra_wei_decimals, 10);
    }

    #[test]
    fn delegator_summary_overflow_is_an_error() {
        let mut sim = sim();
        sim.register_token_info(TokenId(150), TokenInfo::hype()).unwrap();
        let (first, second) = (Address::repeat_byte(0x71), Address::repeat_byte(0x72));
        sim.register_validator(first);
        sim.register_validator(second);
        sim.force_delegation(USER, first, u64::MAX, 0).unwrap();
        sim.force_delegation(USER, second, 1, 0).unwrap();

        assert!(matches!(
            sim.read_delegator_summary(USER),
            Err(CoreError::Cast(CastError::UintDowncast { bits: 64, .. }))
        ));
        assert!(sim.read_token_supply(TokenId(150)).is_err());
    }
}
