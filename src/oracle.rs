// 9.0 oracle.rs: mark prices for perps, spot prices for spot markets.
// prices are raw integers in the market's price decimals. zero is never a valid price.

use crate::types::{Bps, PerpId, SpotMarketId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceKey {
    Mark(PerpId),
    Spot(SpotMarketId),
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceKey::Mark(perp) => write!(f, "mark px of {perp}"),
            PriceKey::Spot(spot) => write!(f, "spot px of {spot}"),
        }
    }
}

/// Best bid/offer. The simulation has no book, so both sides sit on the oracle price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbo {
    pub bid: u64,
    pub ask: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PriceOracleState {
    prices: HashMap<PriceKey, u64>,
}

impl PriceOracleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: PriceKey, px: u64) -> Result<(), PriceError> {
        if px == 0 {
            return Err(PriceError::InvalidPrice { key, px: 0 });
        }
        self.prices.insert(key, px);
        Ok(())
    }

    /// Moves the current price by `bps` up or down. Returns the new price.
    pub fn bump(&mut self, key: PriceKey, bps: Bps, is_increase: bool) -> Result<u64, PriceError> {
        let current = self.get(key)?;
        let next = bump_price(current, bps, is_increase).map_err(|e| e.with_key(key))?;
        self.prices.insert(key, next);
        Ok(next)
    }

    pub fn get(&self, key: PriceKey) -> Result<u64, PriceError> {
        self.prices.get(&key).copied().ok_or(PriceError::NotSet(key))
    }

    pub fn mark_px(&self, perp: PerpId) -> Result<u64, PriceError> {
        self.get(PriceKey::Mark(perp))
    }

    pub fn spot_px(&self, spot: SpotMarketId) -> Result<u64, PriceError> {
        self.get(PriceKey::Spot(spot))
    }

    pub fn bbo(&self, key: PriceKey) -> Result<Bbo, PriceError> {
        let px = self.get(key)?;
        Ok(Bbo { bid: px, ask: px })
    }

    pub fn is_set(&self, key: PriceKey) -> bool {
        self.prices.contains_key(&key)
    }
}

// 9.1: px ± px * bps / 10000, rounding the delta down.
pub fn bump_price(px: u64, bps: Bps, is_increase: bool) -> Result<u64, PriceError> {
    let delta = bps.of(px);
    let next = if is_increase {
        px as u128 + delta
    } else {
        (px as u128).saturating_sub(delta)
    };
    if next == 0 {
        return Err(PriceError::InvalidPrice {
            key: PriceKey::Mark(PerpId(0)),
            px: 0,
        });
    }
    u64::try_from(next).map_err(|_| PriceError::Overflow {
        key: PriceKey::Mark(PerpId(0)),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("No {0} has been set")]
    NotSet(PriceKey),

    #[error("Invalid {key}: {px}")]
    InvalidPrice { key: PriceKey, px: u64 },

    #[error("{key} overflowed")]
    Overflow { key: PriceKey },
}

impl PriceError {
    pub fn key(&self) -> PriceKey {
        match self {
            PriceError::NotSet(key) => *key,
            PriceError::InvalidPrice { key, .. } => *key,
            PriceError::Overflow { key } => *key,
        }
    }

    fn with_key(self, key: PriceKey) -> Self {
        match self {
            PriceError::NotSet(_) => PriceError::NotSet(key),
            PriceError::InvalidPrice { px, .. } => PriceError::InvalidPrice { key, px },
            PriceError::Overflow { .. } => PriceError::Overflow { key },
        }
    }
}
