// 1.0: all the primitives live here. ids, timestamps, basis points, time-in-force.
// each id is a newtype so a perp index can't be passed where a token index is expected.

pub use alloy_primitives::{Address, Bytes, U256};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PerpId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpotMarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(pub u128);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

impl fmt::Display for PerpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "perp#{}", self.0)
    }
}

impl fmt::Display for SpotMarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spot#{}", self.0)
    }
}

// 1.1: order asset ids. spot markets live above 10000, everything below is a perp.
pub const SPOT_ASSET_OFFSET: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Perp(PerpId),
    Spot(SpotMarketId),
}

impl Asset {
    pub fn from_raw(asset: u32) -> Self {
        if asset >= SPOT_ASSET_OFFSET {
            Asset::Spot(SpotMarketId(asset - SPOT_ASSET_OFFSET))
        } else {
            Asset::Perp(PerpId(asset))
        }
    }

    /// `None` for ids the u32 wire field can't carry: perps at or past the
    /// offset, spot markets within the offset of `u32::MAX`.
    pub fn to_raw(self) -> Option<u32> {
        match self {
            Asset::Perp(perp) if perp.0 < SPOT_ASSET_OFFSET => Some(perp.0),
            Asset::Perp(_) => None,
            Asset::Spot(spot) => spot.0.checked_add(SPOT_ASSET_OFFSET),
        }
    }
}

// Long = buy side of a fill. Short = sell side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            Side::Long
        } else {
            Side::Short
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Long)
    }

    pub fn sign(&self) -> i64 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

// 1.2: time in force as encoded on the wire. 1 = ALO, 2 = GTC, 3 = IOC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Add liquidity only: rejected if it would cross immediately.
    Alo,
    Gtc,
    /// Immediate or cancel: rejected if it cannot fill right away.
    Ioc,
}

impl TimeInForce {
    pub fn from_encoded(encoded: u8) -> Option<Self> {
        match encoded {
            1 => Some(TimeInForce::Alo),
            2 => Some(TimeInForce::Gtc),
            3 => Some(TimeInForce::Ioc),
            _ => None,
        }
    }

    pub fn encoded(&self) -> u8 {
        match self {
            TimeInForce::Alo => 1,
            TimeInForce::Gtc => 2,
            TimeInForce::Ioc => 3,
        }
    }
}

// 1.3: basis points. 100 bps = 1%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bps(pub u32);

impl Bps {
    pub const DENOMINATOR: u128 = 10_000;

    pub fn value(&self) -> u32 {
        self.0
    }

    /// `amount * bps / 10000`, rounded down.
    pub fn of(&self, amount: u64) -> u128 {
        amount as u128 * self.0 as u128 / Self::DENOMINATOR
    }
}

// 1.4: second resolution timestamp, the unit block timestamps use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Wall-clock view of the timestamp. `None` past chrono's range.
    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(i64::try_from(self.0).ok()?, 0)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

// 1.5: system addresses. spot sends to these bridge the token out to the EVM side.
// HYPE uses 0x2222...2222, every other token uses 0x20 followed by its index.
pub const HYPE_SYSTEM_ADDRESS: Address = Address::repeat_byte(0x22);

pub fn token_system_address(token: TokenId, hype_token: TokenId) -> Address {
    if token == hype_token {
        return HYPE_SYSTEM_ADDRESS;
    }
    let mut bytes = [0u8; 20];
    bytes[0] = 0x20;
    bytes[12..].copy_from_slice(&token.0.to_be_bytes());
    Address::from(bytes)
}

/// Returns the token a system address belongs to, if it is one.
/// HYPE only has 0x2222...2222. The 0x20 form of its index is a plain address.
pub fn system_address_token(address: Address, hype_token: TokenId) -> Option<TokenId> {
    if address == HYPE_SYSTEM_ADDRESS {
        return Some(hype_token);
    }
    let bytes = address.as_slice();
    if bytes[0] != 0x20 || bytes[1..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut index = [0u8; 8];
    index.copy_from_slice(&bytes[12..]);
    let token = TokenId(u64::from_be_bytes(index));
    (token != hype_token).then_some(token)
}

// 1.6: checked downcasts. ledger fields are u64/i64, intermediate math is wider.
// a value that doesn't fit is an error, never a silent truncation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CastError {
    #[error("SafeCastOverflowedUintDowncast: {value} does not fit in uint{bits}")]
    UintDowncast { bits: u8, value: String },

    #[error("SafeCastOverflowedIntDowncast: {value} does not fit in int{bits}")]
    IntDowncast { bits: u8, value: String },
}

pub fn to_u64(value: i128) -> Result<u64, CastError> {
    u64::try_from(value).map_err(|_| CastError::UintDowncast {
        bits: 64,
        value: value.to_string(),
    })
}

pub fn to_i64(value: i128) -> Result<i64, CastError> {
    i64::try_from(value).map_err(|_| CastError::IntDowncast {
        bits: 64,
        value: value.to_string(),
    })
}

pub fn u256_to_u64(value: U256) -> Result<u64, CastError> {
    u64::try_from(value).map_err(|_| CastError::UintDowncast {
        bits: 64,
        value: value.to_string(),
    })
}

/// Moves `value` from `from` decimals to `to` decimals. Scaling down rounds toward zero.
pub fn rescale(value: u128, from: u8, to: u8) -> Option<u128> {
    if to >= from {
        10u128.checked_pow((to - from) as u32)?.checked_mul(value)
    } else {
        Some(value / 10u128.checked_pow((from - to) as u32)?)
    }
}

/// Fixed-point integer as a human decimal, e.g. `(6_000_000_000, 6)` -> `6000`.
/// `None` past the 96-bit mantissa.
pub fn to_decimal(value: i128, decimals: u8) -> Option<rust_decimal::Decimal> {
    rust_decimal::Decimal::try_from_i128_with_scale(value, decimals as u32)
        .ok()
        .map(|d| d.normalize())
}
