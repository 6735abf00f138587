// 8.0: the simulated core. owns the ledger, the action queue and the event log.
// every state change goes through the staged account pattern in core.rs:
// clone, mutate, validate, commit. nothing is written on a failed path.
// deterministic with no external I/O. time only moves when the caller moves it.

mod admin;
mod bridge;
mod core;
mod execution;
mod ledger;
mod liquidations;
mod orders;
mod pricing;
mod queries;
mod results;
mod traits;

pub use bridge::{core_to_evm, evm_to_core};
pub use self::core::{CoreSim, PendingBridgeCredit, PendingOrder};
pub use queries::TokenSupply;
pub use results::{
    ActionOutcome, BlockReport, CoreError, DrainReport, OrderResult, OrderStatus, PrecompileError,
    RejectReason,
};
pub use traits::{AdminOverride, LedgerMutator};
