// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::action::{ActionError, ActionKind};
use crate::margin::MarginError;
use crate::oracle::PriceError;
use crate::queue::ActionSeq;
use crate::registry::RegistryError;
use crate::types::{Address, Asset, CastError, ClientOrderId, OrderId, PerpId, TokenId, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which read failed. Rendered as `<Name>PrecompileFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrecompileError {
    AccountMarginSummary,
    MarkPx,
    SpotPx,
    SpotInfo,
    Position,
    SpotBalance,
    Delegations,
    DelegatorSummary,
    Withdrawable,
    TokenInfo,
    TokenSupply,
    VaultEquity,
    CoreUserExists,
    L1BlockNumber,
    OraclePx,
    Bbo,
    PerpAssetInfo,
}

impl fmt::Display for PrecompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}PrecompileFailed")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Add-liquidity-only order would have crossed.
    AloWouldCross,
    /// Immediate-or-cancel order had nothing to fill against.
    IocCouldNotFill,
    ReduceOnlyNoPosition,
    ReduceOnlyWouldIncrease,
    /// Size or price rounded down to zero in the market's decimals.
    ZeroSize,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Filled completely at the oracle price. `sz` and `px` are in market decimals.
    Filled { sz: u64, px: u64 },
    Resting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub oid: OrderId,
    pub status: OrderStatus,
}

impl OrderResult {
    pub fn is_filled(&self) -> bool {
        matches!(self.status, OrderStatus::Filled { .. })
    }
}

/// What one dispatched action did during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub seq: ActionSeq,
    pub sender: Address,
    pub kind: ActionKind,
    pub result: Result<(), CoreError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub outcomes: Vec<ActionOutcome>,
    /// The drain failed and every effect was rolled back.
    pub reverted: bool,
}

impl DrainReport {
    pub fn executed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_clean(&self) -> bool {
        !self.reverted && self.failures().next().is_none()
    }
}

/// Housekeeping done by one `next_block` step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockReport {
    pub block: u64,
    pub orders_filled: usize,
    pub staking_wei_released: u64,
    pub liquidations: Vec<crate::liquidation::LiquidationResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("{precompile}: {reason}")]
    PrecompileFailed { precompile: PrecompileError, reason: String },

    #[error("Account {0} does not exist on core")]
    UnknownAccount(Address),

    #[error("CannotSelfTransfer")]
    CannotSelfTransfer,

    #[error("StillLockedUntilTimestamp: locked until {locked_until}, now {now}")]
    StillLockedUntilTimestamp { locked_until: u64, now: u64 },

    #[error("CoreAmountTooLarge: {0}")]
    CoreAmountTooLarge(U256),

    #[error("EvmAmountTooSmall: {0}")]
    EvmAmountTooSmall(U256),

    #[error("HypeTransferFailed: {reason}")]
    HypeTransferFailed { reason: String },

    #[error("InvalidToken: {0}")]
    InvalidToken(TokenId),

    #[error("Token {0} has no linked EVM contract")]
    TokenNotLinked(TokenId),

    #[error("EVM balance of {token} too low: requested {requested}, available {available}")]
    EvmBalanceTooLow { token: TokenId, requested: U256, available: U256 },

    #[error("Validator {0} is not registered")]
    UnknownValidator(Address),

    #[error("Asset {0:?} is not registered")]
    UnknownAsset(Asset),

    #[error("Leverage {requested}x on {perp} exceeds max {max}x")]
    LeverageTooHigh { perp: PerpId, requested: u32, max: u32 },

    #[error("{0} only supports isolated margin")]
    IsolatedOnly(PerpId),

    #[error("Cannot switch margin mode on {0} with an open position")]
    MarginModeLocked(PerpId),

    #[error("Order rejected: {0}")]
    OrderRejected(RejectReason),

    #[error("Order {0:?} not found")]
    OrderNotFound(OrderId),

    #[error("Order with cloid {0:?} not found")]
    CloidNotFound(ClientOrderId),

    #[error("InvalidAction: {0}")]
    InvalidAction(#[from] ActionError),

    #[error("Bridge transfer {0} not found")]
    BridgeTransferNotFound(u64),

    #[error("Action {seq:?} failed: {source}")]
    ActionFailed { seq: ActionSeq, source: Box<CoreError> },

    #[error("Expected a queued action to revert, but every action succeeded")]
    ExpectedRevertNotTriggered,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Price error: {0}")]
    Price(#[from] PriceError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Margin error: {0}")]
    Margin(#[from] MarginError),

    #[error(transparent)]
    Cast(#[from] CastError),
}

impl CoreError {
    pub fn precompile(precompile: PrecompileError, reason: impl fmt::Display) -> Self {
        CoreError::PrecompileFailed {
            precompile,
            reason: reason.to_string(),
        }
    }

    /// Unwraps the failure a drain aborted on.
    pub fn root_cause(&self) -> &CoreError {
        match self {
            CoreError::ActionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
