//! Deferred action queue.
//!
//! Actions are decoded exactly once, when they are enqueued, and carried as a
//! tagged value from then on. Bytes that fail to decode are still queued so the
//! failure surfaces at dispatch time, in order, like every other failure.

use crate::action::{ActionError, ActionKind, CoreAction};
use crate::types::{Address, Bytes, Timestamp, U256};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionSeq(pub u64);

#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub seq: ActionSeq,
    pub sender: Address,
    pub data: Bytes,
    pub action: Result<CoreAction, ActionError>,
    /// Native value attached by the caller. Kept for audit, never moved.
    pub value: U256,
    pub enqueued_at: Timestamp,
}

impl QueuedAction {
    pub fn kind(&self) -> ActionKind {
        match &self.action {
            Ok(action) => action.kind(),
            Err(_) => ActionKind::Raw,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    pending: VecDeque<QueuedAction>,
    next_seq: u64,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        sender: Address,
        data: Bytes,
        value: U256,
        enqueued_at: Timestamp,
    ) -> &QueuedAction {
        let action = CoreAction::decode(&data);
        self.push_decoded(sender, data, action, value, enqueued_at)
    }

    /// Queues an action decoded elsewhere, or the error standing in for it.
    pub fn push_decoded(
        &mut self,
        sender: Address,
        data: Bytes,
        action: Result<CoreAction, ActionError>,
        value: U256,
        enqueued_at: Timestamp,
    ) -> &QueuedAction {
        let seq = ActionSeq(self.next_seq);
        self.next_seq += 1;
        self.pending.push_back(QueuedAction {
            seq,
            sender,
            data,
            action,
            value,
            enqueued_at,
        });
        // just pushed
        &self.pending[self.pending.len() - 1]
    }

    /// Takes every action queued so far. Anything pushed afterwards waits for the next drain.
    pub fn take_all(&mut self) -> Vec<QueuedAction> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedAction> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::UsdClassTransfer;

    fn transfer(ntl: u64) -> Bytes {
        CoreAction::UsdClassTransfer(UsdClassTransfer { ntl, to_perp: true })
            .encode()
            .unwrap()
    }

    #[test]
    fn fifo_with_increasing_seq() {
        let mut queue = ActionQueue::new();
        let sender = Address::repeat_byte(1);
        for ntl in [10, 20, 30] {
            queue.push(sender, transfer(ntl), U256::ZERO, Timestamp(ntl));
        }

        let drained = queue.take_all();
        assert!(queue.is_empty());
        let seqs: Vec<u64> = drained.iter().map(|a| a.seq.0).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(drained[2].enqueued_at, Timestamp(30));
    }

    #[test]
    fn undecodable_bytes_still_queue() {
        let mut queue = ActionQueue::new();
        let junk = Bytes::from(vec![9, 9]);
        let queued = queue.push(Address::ZERO, junk, U256::from(5), Timestamp(0));
        assert_eq!(queued.kind(), ActionKind::Raw);
        assert_eq!(queued.value, U256::from(5));
        assert_eq!(queue.len(), 1);
    }
}
