// 11.0: every state change produces an event. used for audit trails and for tests that
// need to see what a drain actually did. the EventPayload enum lists all event types.

use crate::action::ActionKind;
use crate::oracle::PriceKey;
use crate::queue::ActionSeq;
use crate::types::{
    Address, Asset, Bytes, ClientOrderId, OrderId, Side, TimeInForce, Timestamp, TokenId, U256,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Queue events
    RawAction(RawActionEvent),
    ActionQueued(ActionQueuedEvent),
    ActionExecuted(ActionExecutedEvent),
    ActionFailed(ActionFailedEvent),

    // Trade events
    Fill(FillEvent),
    OrderResting(OrderRestingEvent),
    OrderCanceled(OrderCanceledEvent),
    LeverageUpdated(LeverageUpdatedEvent),

    // Price events
    PriceUpdate(PriceUpdateEvent),

    // Balance events
    SpotTransfer(SpotTransferEvent),
    UsdClassTransfer(UsdClassTransferEvent),
    VaultTransfer(VaultTransferEvent),

    // Staking events
    StakingDeposit(StakingEvent),
    StakingWithdrawalQueued(StakingWithdrawalEvent),
    StakingWithdrawalMatured(StakingWithdrawalEvent),
    Delegation(DelegationEvent),

    // Bridge events
    BridgedToEvm(BridgedToEvmEvent),
    BridgeInitiated(BridgeToCoreEvent),
    BridgeFinalized(BridgeToCoreEvent),

    // Risk events
    Liquidation(LiquidationEvent),
    BadDebt(BadDebtEvent),

    // Admin events
    AdminOverride(AdminOverrideEvent),
}

/// Raw bytes a contract handed to the core writer, before any decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawActionEvent {
    pub sender: Address,
    pub data: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionQueuedEvent {
    pub seq: ActionSeq,
    pub sender: Address,
    pub kind: ActionKind,
    pub value: U256,
    pub enqueued_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecutedEvent {
    pub seq: ActionSeq,
    pub sender: Address,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFailedEvent {
    pub seq: ActionSeq,
    pub sender: Address,
    pub kind: ActionKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub account: Address,
    pub asset: Asset,
    pub oid: OrderId,
    pub side: Side,
    pub sz: u64,
    pub px: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRestingEvent {
    pub account: Address,
    pub asset: Asset,
    pub oid: OrderId,
    pub cloid: Option<ClientOrderId>,
    pub side: Side,
    pub sz: u64,
    pub limit_px: u64,
    pub tif: TimeInForce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCanceledEvent {
    pub account: Address,
    pub asset: Asset,
    pub oid: OrderId,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CancelReason {
    UserRequested,
    RetryFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageUpdatedEvent {
    pub account: Address,
    pub asset: Asset,
    pub leverage: u32,
    pub is_isolated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdateEvent {
    pub key: PriceKey,
    pub px: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotTransferEvent {
    pub from: Address,
    pub to: Address,
    pub token: TokenId,
    pub wei: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsdClassTransferEvent {
    pub account: Address,
    pub ntl: u64,
    pub to_perp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultTransferEvent {
    pub account: Address,
    pub vault: Address,
    pub usd: u64,
    pub is_deposit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingEvent {
    pub account: Address,
    pub wei: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingWithdrawalEvent {
    pub account: Address,
    pub wei: u64,
    pub unlocks_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationEvent {
    pub account: Address,
    pub validator: Address,
    pub wei: u64,
    pub is_undelegate: bool,
    pub locked_until_timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgedToEvmEvent {
    pub account: Address,
    pub token: TokenId,
    pub core_wei: u64,
    pub evm_amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeToCoreEvent {
    pub id: u64,
    pub recipient: Address,
    pub token: TokenId,
    pub core_wei: u64,
    pub native: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub account: Address,
    pub positions_closed: usize,
    pub realized_pnl: i64,
    pub account_value: i64,
    pub margin_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtEvent {
    pub account: Address,
    pub debt_amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOverrideEvent {
    pub account: Address,
    pub field: String,
}
