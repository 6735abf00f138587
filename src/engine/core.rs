// 8.0 engine/core.rs: the simulated core.
// holds the ledger, the action queue, the event log and the clock.

use super::results::CoreError;
use crate::account::Account;
use crate::action::LimitOrder;
use crate::config::SimConfig;
use crate::events::{Event, EventId, EventPayload};
use crate::oracle::PriceOracleState;
use crate::queue::ActionQueue;
use crate::registry::AssetRegistry;
use crate::types::{Address, Asset, ClientOrderId, OrderId, Side, Timestamp, TokenId, U256};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A resting limit order. `sz` and `limit_px` are already in market decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub oid: OrderId,
    pub cloid: Option<ClientOrderId>,
    pub sender: Address,
    pub asset: Asset,
    pub side: Side,
    pub sz: u64,
    pub limit_px: u64,
    pub reduce_only: bool,
    /// Spot only: token and wei reserved on the paying side.
    pub hold: Option<(TokenId, u64)>,
    pub placed_at: Timestamp,
}

impl PendingOrder {
    pub fn from_action(
        oid: OrderId,
        sender: Address,
        order: &LimitOrder,
        sz: u64,
        limit_px: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            oid,
            cloid: order.cloid,
            sender,
            asset: order.asset,
            side: Side::from_is_buy(order.is_buy),
            sz,
            limit_px,
            reduce_only: order.reduce_only,
            hold: None,
            placed_at: now,
        }
    }
}

/// EVM -> core transfer waiting for its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBridgeCredit {
    pub id: u64,
    pub recipient: Address,
    pub token: TokenId,
    pub core_wei: u64,
    pub native: bool,
}

/** 8.1: everything an action can touch. cloned whole for all-or-nothing drains */
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub(super) registry: AssetRegistry,
    pub(super) oracle: PriceOracleState,
    /// Insertion order is activation order. Liquidation scans follow it.
    pub(super) accounts: IndexMap<Address, Account>,
    /// Placement order.
    pub(super) orders: Vec<PendingOrder>,
    pub(super) bridge_credits: BTreeMap<u64, PendingBridgeCredit>,
    pub(super) evm_token_balances: HashMap<(Address, TokenId), U256>,
    pub(super) evm_native_balances: HashMap<Address, U256>,
    pub(super) next_order_id: u64,
    pub(super) next_bridge_id: u64,
}

#[derive(Debug, Clone)]
pub struct CoreSim {
    pub(super) config: SimConfig,
    pub(super) ledger: Ledger,
    pub(super) queue: ActionQueue,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
    pub(super) l1_block_number: u64,
    pub(super) revert_on_failure: bool,
}

impl Default for CoreSim {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl CoreSim {
    pub fn new(config: SimConfig) -> Self {
        let revert_on_failure = config.revert_on_failure;
        Self {
            config,
            ledger: Ledger {
                next_order_id: 1,
                next_bridge_id: 1,
                ..Ledger::default()
            },
            queue: ActionQueue::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp(0),
            l1_block_number: 0,
            revert_on_failure,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub fn set_l1_block_number(&mut self, block: u64) {
        self.l1_block_number = block;
    }

    pub fn account(&self, address: Address) -> Option<&Account> {
        self.ledger.accounts.get(&address)
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.ledger.accounts.iter()
    }

    pub fn pending_orders(&self) -> &[PendingOrder] {
        &self.ledger.orders
    }

    pub fn pending_bridge_credits(&self) -> impl Iterator<Item = &PendingBridgeCredit> {
        self.ledger.bridge_credits.values()
    }

    pub fn evm_token_balance(&self, address: Address, token: TokenId) -> U256 {
        self.ledger
            .evm_token_balances
            .get(&(address, token))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn evm_native_balance(&self, address: Address) -> U256 {
        self.ledger
            .evm_native_balances
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn queued_actions(&self) -> usize {
        self.queue.len()
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn revert_on_failure(&self) -> bool {
        self.revert_on_failure
    }

    pub fn set_revert_on_failure(&mut self, revert: bool) {
        self.revert_on_failure = revert;
    }

    // staged copy of an account: existing state, or a fresh inactive one
    pub(super) fn staged_account(&self, address: Address) -> Account {
        self.ledger
            .accounts
            .get(&address)
            .cloned()
            .unwrap_or_else(|| Account::new(address, self.current_time))
    }

    pub(super) fn existing_account(&self, address: Address) -> Result<Account, CoreError> {
        self.ledger
            .accounts
            .get(&address)
            .cloned()
            .ok_or(CoreError::UnknownAccount(address))
    }

    // writes a staged account back. existing accounts keep their slot in scan order.
    pub(super) fn commit_account(&mut self, account: Account) {
        self.ledger.accounts.insert(account.address, account);
    }

    pub(super) fn mark_px_fn(&self) -> impl Fn(crate::types::PerpId) -> Option<u64> + '_ {
        move |perp| self.ledger.oracle.mark_px(perp).ok()
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        tracing::debug!(id = event.id.0, payload = ?event.payload, "event");

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
