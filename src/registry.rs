//! Asset registry.
//!
//! Maps token, perp and spot market indices to their registration metadata and
//! keeps the set of known validators. Registration is append-only: nothing is
//! ever removed for the lifetime of a simulation. Re-registering an index with
//! identical data is a no-op, anything else is rejected.

use crate::types::{Address, Asset, PerpId, SpotMarketId, TokenId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Static token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    /// Decimals of order sizes quoted in this token.
    pub sz_decimals: u8,
    /// Decimals of core balances (wei) of this token.
    pub wei_decimals: u8,
    /// ERC20 contract on the EVM side, if the token is linked.
    pub evm_contract: Option<Address>,
    /// EVM decimals minus core wei decimals. May be negative.
    pub evm_extra_wei_decimals: i8,
    pub max_supply: u64,
}

impl TokenInfo {
    pub fn new(name: impl Into<String>, sz_decimals: u8, wei_decimals: u8) -> Self {
        Self {
            name: name.into(),
            sz_decimals,
            wei_decimals,
            evm_contract: None,
            evm_extra_wei_decimals: 0,
            max_supply: u64::MAX,
        }
    }

    pub fn with_evm_contract(mut self, contract: Address, extra_wei_decimals: i8) -> Self {
        self.evm_contract = Some(contract);
        self.evm_extra_wei_decimals = extra_wei_decimals;
        self
    }

    pub fn with_max_supply(mut self, max_supply: u64) -> Self {
        self.max_supply = max_supply;
        self
    }

    pub fn usdc() -> Self {
        Self::new("USDC", 8, 8)
    }

    pub fn hype() -> Self {
        // native HYPE: no ERC20 contract, 18 decimals on the EVM side
        Self {
            evm_extra_wei_decimals: 10,
            ..Self::new("HYPE", 2, 8)
        }
    }
}

/// Perp market metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpAssetInfo {
    pub name: String,
    pub sz_decimals: u8,
    pub max_leverage: u32,
    pub only_isolated: bool,
}

impl PerpAssetInfo {
    pub fn new(name: impl Into<String>, sz_decimals: u8, max_leverage: u32) -> Self {
        Self {
            name: name.into(),
            sz_decimals,
            max_leverage,
            only_isolated: false,
        }
    }

    /// Perp prices carry `6 - sz_decimals` decimals.
    pub fn px_decimals(&self) -> u8 {
        6u8.saturating_sub(self.sz_decimals)
    }
}

/// Spot market metadata. `tokens[0]` is the base, `tokens[1]` the quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotInfo {
    pub name: String,
    pub tokens: [TokenId; 2],
}

impl SpotInfo {
    pub fn new(name: impl Into<String>, base: TokenId, quote: TokenId) -> Self {
        Self {
            name: name.into(),
            tokens: [base, quote],
        }
    }

    pub fn base(&self) -> TokenId {
        self.tokens[0]
    }

    pub fn quote(&self) -> TokenId {
        self.tokens[1]
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    tokens: IndexMap<TokenId, TokenInfo>,
    perps: IndexMap<PerpId, PerpAssetInfo>,
    spots: IndexMap<SpotMarketId, SpotInfo>,
    validators: IndexSet<Address>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token_info(
        &mut self,
        token: TokenId,
        info: TokenInfo,
    ) -> Result<(), RegistryError> {
        if info.wei_decimals < info.sz_decimals {
            return Err(RegistryError::InvalidDecimals {
                token,
                sz_decimals: info.sz_decimals,
                wei_decimals: info.wei_decimals,
            });
        }
        match self.tokens.get(&token) {
            Some(existing) if *existing == info => Ok(()),
            Some(_) => Err(RegistryError::AlreadyRegistered(format!("{token}"))),
            None => {
                self.tokens.insert(token, info);
                Ok(())
            }
        }
    }

    pub fn register_perp(
        &mut self,
        perp: PerpId,
        info: PerpAssetInfo,
    ) -> Result<(), RegistryError> {
        if info.max_leverage == 0 {
            return Err(RegistryError::InvalidMaxLeverage(perp));
        }
        if Asset::Perp(perp).to_raw().is_none() {
            return Err(RegistryError::AssetIdOutOfRange(Asset::Perp(perp)));
        }
        match self.perps.get(&perp) {
            Some(existing) if *existing == info => Ok(()),
            Some(_) => Err(RegistryError::AlreadyRegistered(format!("{perp}"))),
            None => {
                self.perps.insert(perp, info);
                Ok(())
            }
        }
    }

    pub fn register_spot(
        &mut self,
        spot: SpotMarketId,
        info: SpotInfo,
    ) -> Result<(), RegistryError> {
        if Asset::Spot(spot).to_raw().is_none() {
            return Err(RegistryError::AssetIdOutOfRange(Asset::Spot(spot)));
        }
        for token in info.tokens {
            if !self.token_exists(token) {
                return Err(RegistryError::UnknownToken(token));
            }
        }
        match self.spots.get(&spot) {
            Some(existing) if *existing == info => Ok(()),
            Some(_) => Err(RegistryError::AlreadyRegistered(format!("{spot}"))),
            None => {
                self.spots.insert(spot, info);
                Ok(())
            }
        }
    }

    /// Links an already registered token to its EVM contract. Relinking to
    /// the same contract is a no-op.
    pub fn link_evm_contract(
        &mut self,
        token: TokenId,
        contract: Address,
        extra_wei_decimals: i8,
    ) -> Result<(), RegistryError> {
        let info = self
            .tokens
            .get_mut(&token)
            .ok_or(RegistryError::UnknownToken(token))?;
        match info.evm_contract {
            Some(existing)
                if existing == contract && info.evm_extra_wei_decimals == extra_wei_decimals =>
            {
                Ok(())
            }
            Some(_) => Err(RegistryError::AlreadyRegistered(format!("{token} evm link"))),
            None => {
                info.evm_contract = Some(contract);
                info.evm_extra_wei_decimals = extra_wei_decimals;
                Ok(())
            }
        }
    }

    pub fn register_validator(&mut self, validator: Address) {
        self.validators.insert(validator);
    }

    pub fn token_exists(&self, token: TokenId) -> bool {
        self.tokens.contains_key(&token)
    }

    pub fn validator_exists(&self, validator: Address) -> bool {
        self.validators.contains(&validator)
    }

    pub fn token_info(&self, token: TokenId) -> Option<&TokenInfo> {
        self.tokens.get(&token)
    }

    pub fn perp_info(&self, perp: PerpId) -> Option<&PerpAssetInfo> {
        self.perps.get(&perp)
    }

    pub fn spot_info(&self, spot: SpotMarketId) -> Option<&SpotInfo> {
        self.spots.get(&spot)
    }

    pub fn max_leverage(&self, perp: PerpId) -> Option<u32> {
        self.perps.get(&perp).map(|info| info.max_leverage)
    }

    pub fn spot_index_for(
        &self,
        base: TokenId,
        quote: TokenId,
    ) -> Result<SpotMarketId, RegistryError> {
        self.spots
            .iter()
            .find(|(_, info)| info.tokens == [base, quote])
            .map(|(id, _)| *id)
            .ok_or(RegistryError::SpotIndexNotFound { base, quote })
    }

    pub fn validators(&self) -> impl Iterator<Item = &Address> {
        self.validators.iter()
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&TokenId, &TokenInfo)> {
        self.tokens.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} is already registered with different data")]
    AlreadyRegistered(String),

    #[error("Token {0} is not registered")]
    UnknownToken(TokenId),

    #[error("Token {token}: wei decimals {wei_decimals} below sz decimals {sz_decimals}")]
    InvalidDecimals { token: TokenId, sz_decimals: u8, wei_decimals: u8 },

    #[error("Perp {0} must allow at least 1x leverage")]
    InvalidMaxLeverage(PerpId),

    #[error("No spot market for base {base} quote {quote}")]
    SpotIndexNotFound { base: TokenId, quote: TokenId },

    #[error("{0:?} is outside the order asset id range")]
    AssetIdOutOfRange(Asset),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AssetRegistry {
        let mut registry = AssetRegistry::new();
        registry.register_token_info(TokenId(0), TokenInfo::usdc()).unwrap();
        registry.register_token_info(TokenId(150), TokenInfo::hype()).unwrap();
        registry
    }

    #[test]
    fn registration_is_idempotent() {
        let mut registry = registry();
        registry.register_token_info(TokenId(0), TokenInfo::usdc()).unwrap();
        assert!(registry.token_exists(TokenId(0)));
        assert_eq!(registry.tokens().count(), 2);
    }

    #[test]
    fn conflicting_registration_rejected() {
        let mut registry = registry();
        let result = registry.register_token_info(TokenId(0), TokenInfo::new("USDT", 2, 8));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
        assert_eq!(registry.token_info(TokenId(0)).unwrap().name, "USDC");
    }

    #[test]
    fn wei_decimals_must_cover_sz_decimals() {
        let mut registry = registry();
        let result = registry.register_token_info(TokenId(9), TokenInfo::new("BAD", 6, 4));
        assert!(matches!(result, Err(RegistryError::InvalidDecimals { .. })));
        assert!(!registry.token_exists(TokenId(9)));
    }

    #[test]
    fn spot_requires_known_tokens() {
        let mut registry = registry();
        let unknown_base = SpotInfo::new("X/USDC", TokenId(7), TokenId(0));
        let bad = registry.register_spot(SpotMarketId(1), unknown_base);
        assert_eq!(bad, Err(RegistryError::UnknownToken(TokenId(7))));

        registry
            .register_spot(SpotMarketId(107), SpotInfo::new("HYPE/USDC", TokenId(150), TokenId(0)))
            .unwrap();
        assert_eq!(registry.spot_index_for(TokenId(150), TokenId(0)), Ok(SpotMarketId(107)));
        assert!(matches!(
            registry.spot_index_for(TokenId(0), TokenId(150)),
            Err(RegistryError::SpotIndexNotFound { .. })
        ));
    }

    #[test]
    fn perp_max_leverage_lookup() {
        let mut registry = registry();
        registry.register_perp(PerpId(0), PerpAssetInfo::new("BTC", 5, 40)).unwrap();
        assert_eq!(registry.max_leverage(PerpId(0)), Some(40));
        assert_eq!(registry.max_leverage(PerpId(1)), None);
        assert_eq!(
            registry.register_perp(PerpId(2), PerpAssetInfo::new("ZERO", 0, 0)),
            Err(RegistryError::InvalidMaxLeverage(PerpId(2)))
        );
    }

    #[test]
    fn asset_ids_must_fit_the_wire() {
        let mut registry = registry();
        assert_eq!(
            registry.register_perp(PerpId(10_000), PerpAssetInfo::new("FAR", 2, 5)),
            Err(RegistryError::AssetIdOutOfRange(Asset::Perp(PerpId(10_000))))
        );
        let hype_usdc = SpotInfo::new("HYPE/USDC", TokenId(150), TokenId(0));
        let far = SpotMarketId(u32::MAX - 9_999);
        assert_eq!(
            registry.register_spot(far, hype_usdc.clone()),
            Err(RegistryError::AssetIdOutOfRange(Asset::Spot(far)))
        );
        registry.register_spot(SpotMarketId(u32::MAX - 10_000), hype_usdc).unwrap();
    }

    #[test]
    fn validators_are_a_set() {
        let mut registry = registry();
        let validator = Address::repeat_byte(0xAA);
        registry.register_validator(validator);
        registry.register_validator(validator);
        assert!(registry.validator_exists(validator));
        assert_eq!(registry.validators().count(), 1);
    }

    #[test]
    fn evm_link_is_write_once() {
        let mut registry = registry();
        let contract = Address::repeat_byte(0x01);
        registry.link_evm_contract(TokenId(0), contract, -2).unwrap();
        registry.link_evm_contract(TokenId(0), contract, -2).unwrap();
        assert!(registry.link_evm_contract(TokenId(0), Address::repeat_byte(0x02), -2).is_err());
        assert_eq!(registry.token_info(TokenId(0)).unwrap().evm_contract, Some(contract));
    }
}
