// hypercore-sim: an in-memory model of the core ledger behind the EVM precompiles.
// reads are pure functions of the ledger. writes are queued as encoded actions
// and only land when the queue is drained.
// deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: TokenId, PerpId, Asset, Side, Timestamp, unit helpers
//   2.x  registry.rs: tokens, perp markets, spot markets, validators
//   3.x  oracle.rs: mark and spot prices, bbo, basis point bumps
//   4.x  position.rs: perp position, fills, realized pnl
//   5.x  account.rs: balances, holds, staking, delegations, vault equity
//   6.x  margin.rs: margin summary, withdrawable
//   6.2  liquidation.rs: liquidation status and settlement
//   7.x  config.rs: token ids, lock periods, env presets
//   8.x  engine/: the core: reads, writes, bridge, orders, queue drain, liquidations
//   9.x  action.rs: action wire format
//   9.1  queue.rs: deferred action queue
//   11.x events.rs: state transition events for audit

pub mod account;
pub mod engine;
pub mod events;
pub mod liquidation;
pub mod margin;
pub mod oracle;
pub mod position;
pub mod registry;
pub mod types;

pub mod action;
pub mod config;
pub mod queue;

// re exports for convenience
pub use account::{
    Account, AccountError, Delegation, DelegatorSummary, PendingWithdrawal, SpotBalance,
    VaultEquity,
};
pub use action::{
    ActionError, ActionKind, CoreAction, LimitOrder, SpotSend, TokenDelegate, UsdClassTransfer,
    VaultTransfer,
};
pub use config::{ConfigError, Environment, SimConfig};
pub use engine::*;
pub use events::{Event, EventId, EventPayload};
pub use liquidation::{ClosedPosition, LiquidationResult, LiquidationStatus};
pub use margin::{AccountMarginSummary, Withdrawable};
pub use oracle::{Bbo, PriceKey, PriceOracleState};
pub use position::Position;
pub use queue::{ActionQueue, ActionSeq, QueuedAction};
pub use registry::{AssetRegistry, PerpAssetInfo, RegistryError, SpotInfo, TokenInfo};
pub use types::*;
