// 2.0 action.rs: the write-side wire format. one version byte, a big endian u24
// action id, then the abi encoded payload. decoded once into CoreAction.

use crate::types::{Address, Asset, Bytes, ClientOrderId, OrderId, TimeInForce, TokenId};
use alloy_sol_types::{sol, SolValue};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ACTION_VERSION: u8 = 1;
const HEADER_LEN: usize = 4;

pub const LIMIT_ORDER_ACTION: u32 = 1;
pub const VAULT_TRANSFER_ACTION: u32 = 2;
pub const TOKEN_DELEGATE_ACTION: u32 = 3;
pub const STAKING_DEPOSIT_ACTION: u32 = 4;
pub const STAKING_WITHDRAW_ACTION: u32 = 5;
pub const SPOT_SEND_ACTION: u32 = 6;
pub const USD_CLASS_TRANSFER_ACTION: u32 = 7;
pub const CANCEL_BY_OID_ACTION: u32 = 10;
pub const CANCEL_BY_CLOID_ACTION: u32 = 11;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct LimitOrderPayload {
        uint32 asset;
        bool isBuy;
        uint64 limitPx;
        uint64 sz;
        bool reduceOnly;
        uint8 encodedTif;
        uint128 cloid;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct VaultTransferPayload {
        address vault;
        bool isDeposit;
        uint64 usd;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TokenDelegatePayload {
        address validator;
        uint64 wei;
        bool isUndelegate;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct StakingPayload {
        uint64 wei;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SpotSendPayload {
        address destination;
        uint64 token;
        uint64 wei;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct UsdClassTransferPayload {
        uint64 ntl;
        bool toPerp;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CancelByOidPayload {
        uint32 asset;
        uint64 oid;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CancelByCloidPayload {
        uint32 asset;
        uint128 cloid;
    }
}

/// Limit order as carried by the action. `limit_px` and `sz` have 8 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub asset: Asset,
    pub is_buy: bool,
    pub limit_px: u64,
    pub sz: u64,
    pub reduce_only: bool,
    pub tif: TimeInForce,
    /// Zero on the wire means no client id.
    pub cloid: Option<ClientOrderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTransfer {
    pub vault: Address,
    pub is_deposit: bool,
    pub usd: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDelegate {
    pub validator: Address,
    pub wei: u64,
    pub is_undelegate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotSend {
    pub destination: Address,
    pub token: TokenId,
    pub wei: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsdClassTransfer {
    pub ntl: u64,
    pub to_perp: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreAction {
    LimitOrder(LimitOrder),
    VaultTransfer(VaultTransfer),
    TokenDelegate(TokenDelegate),
    StakingDeposit { wei: u64 },
    StakingWithdraw { wei: u64 },
    SpotSend(SpotSend),
    UsdClassTransfer(UsdClassTransfer),
    CancelByOid { asset: Asset, oid: OrderId },
    CancelByCloid { asset: Asset, cloid: ClientOrderId },
}

/// Tag of a queued action. `Raw` marks bytes that did not decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    LimitOrder,
    VaultTransfer,
    TokenDelegate,
    StakingDeposit,
    StakingWithdraw,
    SpotSend,
    UsdClassTransfer,
    CancelByOid,
    CancelByCloid,
    Raw,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl CoreAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            CoreAction::LimitOrder(_) => ActionKind::LimitOrder,
            CoreAction::VaultTransfer(_) => ActionKind::VaultTransfer,
            CoreAction::TokenDelegate(_) => ActionKind::TokenDelegate,
            CoreAction::StakingDeposit { .. } => ActionKind::StakingDeposit,
            CoreAction::StakingWithdraw { .. } => ActionKind::StakingWithdraw,
            CoreAction::SpotSend(_) => ActionKind::SpotSend,
            CoreAction::UsdClassTransfer(_) => ActionKind::UsdClassTransfer,
            CoreAction::CancelByOid { .. } => ActionKind::CancelByOid,
            CoreAction::CancelByCloid { .. } => ActionKind::CancelByCloid,
        }
    }

    pub fn action_id(&self) -> u32 {
        match self {
            CoreAction::LimitOrder(_) => LIMIT_ORDER_ACTION,
            CoreAction::VaultTransfer(_) => VAULT_TRANSFER_ACTION,
            CoreAction::TokenDelegate(_) => TOKEN_DELEGATE_ACTION,
            CoreAction::StakingDeposit { .. } => STAKING_DEPOSIT_ACTION,
            CoreAction::StakingWithdraw { .. } => STAKING_WITHDRAW_ACTION,
            CoreAction::SpotSend(_) => SPOT_SEND_ACTION,
            CoreAction::UsdClassTransfer(_) => USD_CLASS_TRANSFER_ACTION,
            CoreAction::CancelByOid { .. } => CANCEL_BY_OID_ACTION,
            CoreAction::CancelByCloid { .. } => CANCEL_BY_CLOID_ACTION,
        }
    }

    /// Header plus abi encoded payload, as a contract would hand it to the core writer.
    pub fn encode(&self) -> Result<Bytes, ActionError> {
        let raw_asset = |asset: Asset| asset.to_raw().ok_or(ActionError::AssetOutOfRange(asset));
        let payload = match *self {
            CoreAction::LimitOrder(order) => LimitOrderPayload {
                asset: raw_asset(order.asset)?,
                isBuy: order.is_buy,
                limitPx: order.limit_px,
                sz: order.sz,
                reduceOnly: order.reduce_only,
                encodedTif: order.tif.encoded(),
                cloid: order.cloid.map(|c| c.0).unwrap_or(0),
            }
            .abi_encode(),
            CoreAction::VaultTransfer(transfer) => VaultTransferPayload {
                vault: transfer.vault,
                isDeposit: transfer.is_deposit,
                usd: transfer.usd,
            }
            .abi_encode(),
            CoreAction::TokenDelegate(delegate) => TokenDelegatePayload {
                validator: delegate.validator,
                wei: delegate.wei,
                isUndelegate: delegate.is_undelegate,
            }
            .abi_encode(),
            CoreAction::StakingDeposit { wei } | CoreAction::StakingWithdraw { wei } => {
                StakingPayload { wei }.abi_encode()
            }
            CoreAction::SpotSend(send) => SpotSendPayload {
                destination: send.destination,
                token: send.token.0,
                wei: send.wei,
            }
            .abi_encode(),
            CoreAction::UsdClassTransfer(transfer) => UsdClassTransferPayload {
                ntl: transfer.ntl,
                toPerp: transfer.to_perp,
            }
            .abi_encode(),
            CoreAction::CancelByOid { asset, oid } => CancelByOidPayload {
                asset: raw_asset(asset)?,
                oid: oid.0,
            }
            .abi_encode(),
            CoreAction::CancelByCloid { asset, cloid } => CancelByCloidPayload {
                asset: raw_asset(asset)?,
                cloid: cloid.0,
            }
            .abi_encode(),
        };

        let id = self.action_id().to_be_bytes();
        let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
        data.push(ACTION_VERSION);
        data.extend_from_slice(&id[1..]);
        data.extend_from_slice(&payload);
        Ok(Bytes::from(data))
    }

    pub fn decode(data: &[u8]) -> Result<Self, ActionError> {
        if data.len() < HEADER_LEN {
            return Err(ActionError::TooShort(data.len()));
        }
        if data[0] != ACTION_VERSION {
            return Err(ActionError::UnsupportedVersion(data[0]));
        }
        let action_id = u32::from_be_bytes([0, data[1], data[2], data[3]]);
        let payload = &data[HEADER_LEN..];
        let malformed = |e: alloy_sol_types::Error| ActionError::Malformed {
            action_id,
            reason: e.to_string(),
        };

        let action = match action_id {
            LIMIT_ORDER_ACTION => {
                let p = LimitOrderPayload::abi_decode(payload).map_err(malformed)?;
                let tif = TimeInForce::from_encoded(p.encodedTif)
                    .ok_or(ActionError::InvalidTif(p.encodedTif))?;
                CoreAction::LimitOrder(LimitOrder {
                    asset: Asset::from_raw(p.asset),
                    is_buy: p.isBuy,
                    limit_px: p.limitPx,
                    sz: p.sz,
                    reduce_only: p.reduceOnly,
                    tif,
                    cloid: (p.cloid != 0).then_some(ClientOrderId(p.cloid)),
                })
            }
            VAULT_TRANSFER_ACTION => {
                let p = VaultTransferPayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::VaultTransfer(VaultTransfer {
                    vault: p.vault,
                    is_deposit: p.isDeposit,
                    usd: p.usd,
                })
            }
            TOKEN_DELEGATE_ACTION => {
                let p = TokenDelegatePayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::TokenDelegate(TokenDelegate {
                    validator: p.validator,
                    wei: p.wei,
                    is_undelegate: p.isUndelegate,
                })
            }
            STAKING_DEPOSIT_ACTION => {
                let p = StakingPayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::StakingDeposit { wei: p.wei }
            }
            STAKING_WITHDRAW_ACTION => {
                let p = StakingPayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::StakingWithdraw { wei: p.wei }
            }
            SPOT_SEND_ACTION => {
                let p = SpotSendPayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::SpotSend(SpotSend {
                    destination: p.destination,
                    token: TokenId(p.token),
                    wei: p.wei,
                })
            }
            USD_CLASS_TRANSFER_ACTION => {
                let p = UsdClassTransferPayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::UsdClassTransfer(UsdClassTransfer {
                    ntl: p.ntl,
                    to_perp: p.toPerp,
                })
            }
            CANCEL_BY_OID_ACTION => {
                let p = CancelByOidPayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::CancelByOid {
                    asset: Asset::from_raw(p.asset),
                    oid: OrderId(p.oid),
                }
            }
            CANCEL_BY_CLOID_ACTION => {
                let p = CancelByCloidPayload::abi_decode(payload).map_err(malformed)?;
                CoreAction::CancelByCloid {
                    asset: Asset::from_raw(p.asset),
                    cloid: ClientOrderId(p.cloid),
                }
            }
            other => return Err(ActionError::UnknownAction(other)),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Action data too short: {0} bytes")]
    TooShort(usize),

    #[error("Unsupported action version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown action id {0}")]
    UnknownAction(u32),

    #[error("Malformed payload for action {action_id}: {reason}")]
    Malformed { action_id: u32, reason: String },

    #[error("Invalid time in force {0}")]
    InvalidTif(u8),

    #[error("Asset {0:?} has no wire encoding")]
    AssetOutOfRange(Asset),
}
