// 8.5 engine/execution.rs: the deferred action pipeline and block stepping.
// enqueue stamps each action with the current time. a drain runs them in
// sequence order, each with the clock set back to its stamp.

use super::core::{CoreSim, Ledger};
use super::results::{ActionOutcome, BlockReport, CoreError, DrainReport};
use super::traits::LedgerMutator;
use crate::action::{ActionKind, CoreAction};
use crate::events::{
    ActionExecutedEvent, ActionFailedEvent, ActionQueuedEvent, Event, EventPayload, RawActionEvent,
};
use crate::queue::{ActionQueue, ActionSeq, QueuedAction};
use crate::types::{Address, Asset, Bytes, Timestamp, U256};

/// Everything a reverted drain puts back.
struct Snapshot {
    ledger: Ledger,
    queue: ActionQueue,
    events: Vec<Event>,
    next_event_id: u64,
}

impl CoreSim {
    pub fn enqueue_action(
        &mut self,
        sender: Address,
        data: impl Into<Bytes>,
        value: U256,
    ) -> ActionSeq {
        let now = self.current_time;
        self.enqueue_action_at(sender, now, data, value)
    }

    /// Enqueues with an explicit timestamp. The action executes as if the
    /// clock read `timestamp`.
    pub fn enqueue_action_at(
        &mut self,
        sender: Address,
        timestamp: Timestamp,
        data: impl Into<Bytes>,
        value: U256,
    ) -> ActionSeq {
        let queued = self.queue.push(sender, data.into(), value, timestamp);
        let (seq, kind) = (queued.seq, queued.kind());
        self.record_queued(sender, seq, kind, value, timestamp)
    }

    fn record_queued(
        &mut self,
        sender: Address,
        seq: ActionSeq,
        kind: ActionKind,
        value: U256,
        timestamp: Timestamp,
    ) -> ActionSeq {
        tracing::debug!(seq = seq.0, %sender, %kind, "action queued");
        self.emit_event(EventPayload::ActionQueued(ActionQueuedEvent {
            seq,
            sender,
            kind,
            value,
            enqueued_at: timestamp,
        }));
        seq
    }

    /// Entry point for the action precompile: records the raw bytes and queues them.
    pub fn send_raw_action(&mut self, sender: Address, data: impl Into<Bytes>) -> ActionSeq {
        let data = data.into();
        self.emit_event(EventPayload::RawAction(RawActionEvent {
            sender,
            data: data.clone(),
        }));
        self.enqueue_action(sender, data, U256::ZERO)
    }

    /// Encodes a typed action and queues it.
    /// An action with no wire encoding still takes its slot and fails at dispatch.
    pub fn enqueue(&mut self, sender: Address, action: CoreAction) -> ActionSeq {
        match action.encode() {
            Ok(data) => self.enqueue_action(sender, data, U256::ZERO),
            Err(e) => {
                let now = self.current_time;
                let queued = self.queue.push_decoded(sender, Bytes::new(), Err(e), U256::ZERO, now);
                let (seq, kind) = (queued.seq, queued.kind());
                self.record_queued(sender, seq, kind, U256::ZERO, now)
            }
        }
    }

    /// Drains the queue in FIFO order.
    ///
    /// In atomic mode (`revert_on_failure`, or `expect_revert`) the first
    /// failure restores the ledger, queue and event log to their state before
    /// the drain. Otherwise a failing action is logged and skipped.
    ///
    /// With `expect_revert` a rollback is the expected outcome and returns a
    /// report with `reverted` set. A drain that completes cleanly instead
    /// returns `ExpectedRevertNotTriggered` and keeps its effects.
    pub fn execute_queued_actions(
        &mut self,
        expect_revert: bool,
    ) -> Result<DrainReport, CoreError> {
        let atomic = expect_revert || self.revert_on_failure;
        let mut snapshot = atomic.then(|| Snapshot {
            ledger: self.ledger.clone(),
            queue: self.queue.clone(),
            events: self.events.clone(),
            next_event_id: self.next_event_id,
        });

        let actions = self.queue.take_all();
        let saved_time = self.current_time;
        tracing::info!(count = actions.len(), atomic, "draining action queue");

        let mut report = DrainReport::default();
        for queued in actions {
            self.current_time = queued.enqueued_at;
            let result = self.dispatch(&queued);
            self.current_time = saved_time;

            let (seq, sender, kind) = (queued.seq, queued.sender, queued.kind());
            match result {
                Ok(()) => {
                    self.emit_event(EventPayload::ActionExecuted(ActionExecutedEvent {
                        seq,
                        sender,
                        kind,
                    }));
                    report.outcomes.push(ActionOutcome {
                        seq,
                        sender,
                        kind,
                        result: Ok(()),
                    });
                }
                Err(err) => {
                    if let Some(saved) = snapshot.take() {
                        self.restore(saved);
                        tracing::warn!(
                            seq = seq.0,
                            %sender,
                            %kind,
                            error = %err,
                            "action failed, drain reverted"
                        );
                        report.outcomes.push(ActionOutcome {
                            seq,
                            sender,
                            kind,
                            result: Err(err.clone()),
                        });
                        report.reverted = true;
                        if expect_revert {
                            return Ok(report);
                        }
                        return Err(CoreError::ActionFailed {
                            seq,
                            source: Box::new(err),
                        });
                    }

                    tracing::warn!(
                        seq = seq.0,
                        %sender,
                        %kind,
                        error = %err,
                        "action failed, skipping"
                    );
                    self.emit_event(EventPayload::ActionFailed(ActionFailedEvent {
                        seq,
                        sender,
                        kind,
                        reason: err.to_string(),
                    }));
                    report.outcomes.push(ActionOutcome {
                        seq,
                        sender,
                        kind,
                        result: Err(err),
                    });
                }
            }
        }

        if expect_revert {
            return Err(CoreError::ExpectedRevertNotTriggered);
        }
        Ok(report)
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.ledger = snapshot.ledger;
        self.queue = snapshot.queue;
        self.events = snapshot.events;
        self.next_event_id = snapshot.next_event_id;
    }

    fn dispatch(&mut self, queued: &QueuedAction) -> Result<(), CoreError> {
        let sender = queued.sender;
        match queued.action.clone()? {
            CoreAction::LimitOrder(order) => match order.asset {
                Asset::Perp(_) => self.execute_perp_limit_order(sender, order).map(|_| ()),
                Asset::Spot(_) => self.execute_spot_limit_order(sender, order).map(|_| ()),
            },
            CoreAction::VaultTransfer(transfer) => self.execute_vault_transfer(sender, transfer),
            CoreAction::TokenDelegate(delegate) => self.execute_token_delegate(sender, delegate),
            CoreAction::StakingDeposit { wei } => self.execute_staking_deposit(sender, wei),
            CoreAction::StakingWithdraw { wei } => self.execute_staking_withdraw(sender, wei),
            CoreAction::SpotSend(send) => self.execute_spot_send(sender, send),
            CoreAction::UsdClassTransfer(transfer) => {
                self.execute_usd_class_transfer(sender, transfer)
            }
            CoreAction::CancelByOid { asset, oid } => self.cancel_order_by_oid(sender, asset, oid),
            CoreAction::CancelByCloid { asset, cloid } => {
                self.cancel_order_by_cloid(sender, asset, cloid)
            }
        }
    }

    /// Advances one block: the clock and block number move first, then resting
    /// orders are retried, matured unstakes paid out and unhealthy accounts
    /// liquidated.
    pub fn next_block(&mut self) -> BlockReport {
        self.l1_block_number += 1;
        self.advance_time(self.config.block_time_secs);

        let orders_filled = self.process_pending_orders();
        let staking_wei_released = self.process_staking_withdrawals();
        let liquidations = self.liquidate_positions();

        tracing::debug!(
            block = self.l1_block_number,
            orders_filled,
            staking_wei_released,
            liquidations = liquidations.len(),
            "block processed"
        );
        BlockReport {
            block: self.l1_block_number,
            orders_filled,
            staking_wei_released,
            liquidations,
        }
    }
}
