// 7.0 config.rs: all simulation settings in one place. token ids, lock windows, block cadence.
// 7.1 presets for mainnet and testnet differ only in the HYPE token index.

use crate::types::TokenId;
use serde::{Deserialize, Serialize};

pub const ONE_DAY_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // Token index of spot USDC, the perp collateral
    pub usdc_token: TokenId,
    // Token index of HYPE, the staking token
    pub hype_token: TokenId,
    // Delegating pushes the lock out to now + this
    pub delegation_lock_secs: u64,
    // Staking withdrawals unlock after this delay
    pub staking_withdrawal_delay_secs: u64,
    // Vault deposits are locked for this long
    pub vault_lock_secs: u64,
    // Leverage a fresh position starts at, capped by the perp's max
    pub default_leverage: u32,
    // Clock step of next_block
    pub block_time_secs: u64,
    // Maximum number of events to retain in memory
    pub max_events: usize,
    // Initial drain mode
    pub revert_on_failure: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl SimConfig {
    pub fn mainnet() -> Self {
        Self {
            usdc_token: TokenId(0),
            hype_token: TokenId(150),
            delegation_lock_secs: ONE_DAY_SECS,
            staking_withdrawal_delay_secs: 7 * ONE_DAY_SECS,
            vault_lock_secs: ONE_DAY_SECS,
            default_leverage: 20,
            block_time_secs: 1,
            max_events: 100_000,
            revert_on_failure: false,
        }
    }

    pub fn testnet() -> Self {
        Self {
            hype_token: TokenId(1105),
            ..Self::mainnet()
        }
    }

    /// Parses a TOML document. Missing keys fall back to the mainnet preset.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SimConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.usdc_token == self.hype_token {
            return Err(ConfigError::Invalid {
                reason: "USDC and HYPE must be different tokens".to_string(),
            });
        }
        if self.default_leverage == 0 {
            return Err(ConfigError::Invalid {
                reason: "Default leverage must be at least 1x".to_string(),
            });
        }
        if self.max_events == 0 {
            return Err(ConfigError::Invalid {
                reason: "Need room for at least one event".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid config: {reason}")]
    Invalid { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Mainnet,
    Testnet,
}

impl Environment {
    pub fn config(&self) -> SimConfig {
        match self {
            Environment::Mainnet => SimConfig::mainnet(),
            Environment::Testnet => SimConfig::testnet(),
        }
    }
}
