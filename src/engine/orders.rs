//! Order placement, fills and the resting order book.
//!
//! There is no matching engine. An order is executable when the oracle price
//! for its market is set and crosses the limit, and then it fills completely at
//! that oracle price. Everything else either rests or is rejected according to
//! its time in force.

use super::core::{CoreSim, PendingOrder};
use super::results::{CoreError, OrderResult, OrderStatus, RejectReason};
use crate::account::{Account, AccountError};
use crate::action::LimitOrder;
use crate::events::{
    CancelReason, EventPayload, FillEvent, LeverageUpdatedEvent, OrderCanceledEvent,
    OrderRestingEvent,
};
use crate::margin::{calculate_margin_summary, margin_required};
use crate::position::{apply_fill, Position};
use crate::registry::{PerpAssetInfo, TokenInfo};
use crate::types::{
    rescale, to_i64, to_u64, Address, Asset, CastError, OrderId, PerpId, Side, SpotMarketId,
    TimeInForce, TokenId,
};

/// Orders carry sizes and prices with 8 decimals.
pub const ACTION_DECIMALS: u8 = 8;

/// Buy crosses at or above the price, sell at or below.
pub fn crosses(side: Side, limit_px: u64, px: u64) -> bool {
    match side {
        Side::Long => limit_px >= px,
        Side::Short => limit_px <= px,
    }
}

fn to_market_units(value: u64, decimals: u8) -> Result<u64, CoreError> {
    let scaled = rescale(value as u128, ACTION_DECIMALS, decimals).ok_or(CastError::UintDowncast {
        bits: 64,
        value: value.to_string(),
    })?;
    Ok(to_u64(scaled as i128)?)
}

// base/quote legs of a spot fill, in each token's wei
struct SpotLegs {
    base: TokenId,
    quote: TokenId,
    base_wei: u64,
    quote_wei: u64,
}

impl CoreSim {
    fn next_order_id(&mut self) -> OrderId {
        let id = OrderId(self.ledger.next_order_id);
        self.ledger.next_order_id += 1;
        id
    }

    fn perp_info(&self, perp: PerpId) -> Result<PerpAssetInfo, CoreError> {
        self.ledger
            .registry
            .perp_info(perp)
            .cloned()
            .ok_or(CoreError::UnknownAsset(Asset::Perp(perp)))
    }

    fn token(&self, token: TokenId) -> Result<TokenInfo, CoreError> {
        self.ledger
            .registry
            .token_info(token)
            .cloned()
            .ok_or(CoreError::InvalidToken(token))
    }

    fn default_position(&self, info: &PerpAssetInfo) -> Position {
        Position::flat(self.config.default_leverage.min(info.max_leverage), info.only_isolated)
    }

    // 8.2: reduce only. clamps to the open size, never grows or opens a position.
    fn reduce_only_size(
        account: &Account,
        perp: PerpId,
        side: Side,
        sz: u64,
    ) -> Result<u64, CoreError> {
        let szi = account.position(perp).map(|p| p.szi).unwrap_or(0);
        if szi == 0 {
            return Err(CoreError::OrderRejected(RejectReason::ReduceOnlyNoPosition));
        }
        if szi.signum() == side.sign() {
            return Err(CoreError::OrderRejected(RejectReason::ReduceOnlyWouldIncrease));
        }
        Ok(sz.min(szi.unsigned_abs()))
    }

    pub(super) fn place_perp_order(
        &mut self,
        sender: Address,
        perp: PerpId,
        order: LimitOrder,
    ) -> Result<OrderResult, CoreError> {
        let info = self.perp_info(perp)?;
        let account = self.existing_account(sender)?;
        let side = Side::from_is_buy(order.is_buy);

        let mut sz = to_market_units(order.sz, info.sz_decimals)?;
        let limit_px = to_market_units(order.limit_px, info.px_decimals())?;
        if sz == 0 || limit_px == 0 {
            return Err(CoreError::OrderRejected(RejectReason::ZeroSize));
        }
        if order.reduce_only {
            sz = Self::reduce_only_size(&account, perp, side, sz)?;
        }

        let mark = self.ledger.oracle.mark_px(perp).ok();
        match (order.tif, mark.filter(|px| crosses(side, limit_px, *px))) {
            (TimeInForce::Alo, Some(_)) => {
                Err(CoreError::OrderRejected(RejectReason::AloWouldCross))
            }
            (TimeInForce::Ioc, None) => {
                Err(CoreError::OrderRejected(RejectReason::IocCouldNotFill))
            }
            (_, Some(px)) => {
                self.fill_perp(sender, perp, side, sz, px)?;
                let oid = self.next_order_id();
                self.on_fill(sender, Asset::Perp(perp), oid, side, sz, px);
                Ok(OrderResult {
                    oid,
                    status: OrderStatus::Filled { sz, px },
                })
            }
            (_, None) => {
                let oid = self.next_order_id();
                let pending =
                    PendingOrder::from_action(oid, sender, &order, sz, limit_px, self.current_time);
                self.rest(pending, order.tif);
                Ok(OrderResult {
                    oid,
                    status: OrderStatus::Resting,
                })
            }
        }
    }

    // 8.3: one perp fill. pnl and freed isolated margin go to the perp balance first,
    // then any new exposure has to be backed by margin.
    fn fill_perp(
        &mut self,
        sender: Address,
        perp: PerpId,
        side: Side,
        sz: u64,
        px: u64,
    ) -> Result<(), CoreError> {
        let info = self.perp_info(perp)?;
        let mut account = self.existing_account(sender)?;
        let current = account
            .position(perp)
            .copied()
            .unwrap_or_else(|| self.default_position(&info));

        let delta = to_i64(side.sign() as i128 * sz as i128)?;
        let update = apply_fill(&current, delta, px)?;
        let mut next = update.new_position;

        account.perp_balance = to_i64(
            account.perp_balance as i128
                + update.realized_pnl as i128
                + update.margin_released as i128,
        )?;

        if next.is_isolated && update.opened_size > 0 {
            let margin = margin_required(update.opened_size as i128 * px as i128, next.leverage);
            if (account.perp_balance as i128) < margin {
                return Err(AccountError::InsufficientMargin {
                    required: to_u64(margin)?,
                    account_value: account.perp_balance,
                }
                .into());
            }
            account.perp_balance = to_i64(account.perp_balance as i128 - margin)?;
            next.isolated_raw_usd = to_i64(next.isolated_raw_usd as i128 + margin)?;
        }
        account.set_position(perp, next);

        if update.opened_size > 0 {
            let summary = calculate_margin_summary(&account, self.mark_px_fn())?;
            if summary.is_liquidatable() {
                return Err(AccountError::InsufficientMargin {
                    required: summary.margin_used,
                    account_value: summary.account_value,
                }
                .into());
            }
        }

        self.commit_account(account);
        Ok(())
    }

    pub(super) fn place_spot_order(
        &mut self,
        sender: Address,
        spot: SpotMarketId,
        order: LimitOrder,
    ) -> Result<OrderResult, CoreError> {
        let info = self
            .ledger
            .registry
            .spot_info(spot)
            .cloned()
            .ok_or(CoreError::UnknownAsset(Asset::Spot(spot)))?;
        let base = self.token(info.base())?;
        let side = Side::from_is_buy(order.is_buy);

        let sz = to_market_units(order.sz, base.sz_decimals)?;
        let px_decimals = ACTION_DECIMALS.saturating_sub(base.sz_decimals);
        let limit_px = to_market_units(order.limit_px, px_decimals)?;
        if sz == 0 || limit_px == 0 {
            return Err(CoreError::OrderRejected(RejectReason::ZeroSize));
        }
        let mut account = self.existing_account(sender)?;

        let mark = self.ledger.oracle.spot_px(spot).ok();
        match (order.tif, mark.filter(|px| crosses(side, limit_px, *px))) {
            (TimeInForce::Alo, Some(_)) => {
                Err(CoreError::OrderRejected(RejectReason::AloWouldCross))
            }
            (TimeInForce::Ioc, None) => {
                Err(CoreError::OrderRejected(RejectReason::IocCouldNotFill))
            }
            (_, Some(px)) => {
                self.fill_spot(sender, spot, side, sz, px, None)?;
                let oid = self.next_order_id();
                self.on_fill(sender, Asset::Spot(spot), oid, side, sz, px);
                Ok(OrderResult {
                    oid,
                    status: OrderStatus::Filled { sz, px },
                })
            }
            (_, None) => {
                // resting spot orders reserve what they would pay at their limit
                let legs = self.spot_legs(spot, sz, limit_px)?;
                let hold = match side {
                    Side::Long => (legs.quote, legs.quote_wei),
                    Side::Short => (legs.base, legs.base_wei),
                };
                account.place_hold(hold.0, hold.1)?;
                self.commit_account(account);

                let oid = self.next_order_id();
                let mut pending =
                    PendingOrder::from_action(oid, sender, &order, sz, limit_px, self.current_time);
                pending.hold = Some(hold);
                self.rest(pending, order.tif);
                Ok(OrderResult {
                    oid,
                    status: OrderStatus::Resting,
                })
            }
        }
    }

    fn spot_legs(&self, spot: SpotMarketId, sz: u64, px: u64) -> Result<SpotLegs, CoreError> {
        let info = self
            .ledger
            .registry
            .spot_info(spot)
            .ok_or(CoreError::UnknownAsset(Asset::Spot(spot)))?;
        let (base, quote) = (info.base(), info.quote());
        let base_info = self.token(base)?;
        let quote_info = self.token(quote)?;

        let overflow = || CastError::UintDowncast {
            bits: 64,
            value: format!("{sz} @ {px}"),
        };
        let base_wei = rescale(sz as u128, base_info.sz_decimals, base_info.wei_decimals)
            .ok_or_else(overflow)?;
        // sz * px carries 8 decimals whatever the base
        let ntl = (sz as u128).checked_mul(px as u128).ok_or_else(overflow)?;
        let quote_wei =
            rescale(ntl, ACTION_DECIMALS, quote_info.wei_decimals).ok_or_else(overflow)?;

        Ok(SpotLegs {
            base,
            quote,
            base_wei: u64::try_from(base_wei).map_err(|_| overflow())?,
            quote_wei: u64::try_from(quote_wei).map_err(|_| overflow())?,
        })
    }

    fn fill_spot(
        &mut self,
        sender: Address,
        spot: SpotMarketId,
        side: Side,
        sz: u64,
        px: u64,
        hold: Option<(TokenId, u64)>,
    ) -> Result<(), CoreError> {
        let legs = self.spot_legs(spot, sz, px)?;
        let mut account = self.existing_account(sender)?;
        if let Some((token, wei)) = hold {
            account.release_hold(token, wei);
        }

        match side {
            Side::Long => {
                account.debit_spot(legs.quote, legs.quote_wei)?;
                account.credit_spot(legs.base, legs.base_wei)?;
                let balance = account.spot_balances.entry(legs.base).or_default();
                balance.entry_ntl = balance.entry_ntl.saturating_add(legs.quote_wei);
            }
            Side::Short => {
                account.debit_spot(legs.base, legs.base_wei)?;
                account.credit_spot(legs.quote, legs.quote_wei)?;
            }
        }

        self.commit_account(account);
        Ok(())
    }

    fn rest(&mut self, pending: PendingOrder, tif: TimeInForce) {
        self.emit_event(EventPayload::OrderResting(OrderRestingEvent {
            account: pending.sender,
            asset: pending.asset,
            oid: pending.oid,
            cloid: pending.cloid,
            side: pending.side,
            sz: pending.sz,
            limit_px: pending.limit_px,
            tif,
        }));
        self.ledger.orders.push(pending);
    }

    fn on_fill(
        &mut self,
        account: Address,
        asset: Asset,
        oid: OrderId,
        side: Side,
        sz: u64,
        px: u64,
    ) {
        self.emit_event(EventPayload::Fill(FillEvent {
            account,
            asset,
            oid,
            side,
            sz,
            px,
        }));
    }

    fn release_order_hold(&mut self, order: &PendingOrder) {
        let Some((token, wei)) = order.hold else {
            return;
        };
        if let Some(account) = self.ledger.accounts.get_mut(&order.sender) {
            account.release_hold(token, wei);
        }
    }

    pub(super) fn cancel_pending(&mut self, index: usize) {
        let order = self.ledger.orders.remove(index);
        self.release_order_hold(&order);
        self.emit_event(EventPayload::OrderCanceled(OrderCanceledEvent {
            account: order.sender,
            asset: order.asset,
            oid: order.oid,
            reason: CancelReason::UserRequested,
        }));
    }

    fn fill_resting(&mut self, order: &PendingOrder, px: u64) -> Result<u64, CoreError> {
        match order.asset {
            Asset::Perp(perp) => {
                let sz = if order.reduce_only {
                    let account = self.existing_account(order.sender)?;
                    Self::reduce_only_size(&account, perp, order.side, order.sz)?
                } else {
                    order.sz
                };
                self.fill_perp(order.sender, perp, order.side, sz, px)?;
                Ok(sz)
            }
            Asset::Spot(spot) => {
                self.fill_spot(order.sender, spot, order.side, order.sz, px, order.hold)?;
                Ok(order.sz)
            }
        }
    }

    /// Retries resting orders in placement order. Returns how many filled.
    /// An order that crosses but cannot fill is canceled and its hold released.
    pub fn process_pending_orders(&mut self) -> usize {
        if self.ledger.orders.is_empty() {
            return 0;
        }
        let orders = std::mem::take(&mut self.ledger.orders);
        let mut still_resting = Vec::with_capacity(orders.len());
        let mut filled = 0;

        for order in orders {
            let px = match order.asset {
                Asset::Perp(perp) => self.ledger.oracle.mark_px(perp).ok(),
                Asset::Spot(spot) => self.ledger.oracle.spot_px(spot).ok(),
            };
            let Some(px) = px.filter(|px| crosses(order.side, order.limit_px, *px)) else {
                still_resting.push(order);
                continue;
            };

            match self.fill_resting(&order, px) {
                Ok(sz) => {
                    filled += 1;
                    self.on_fill(order.sender, order.asset, order.oid, order.side, sz, px);
                }
                Err(e) => {
                    tracing::warn!(
                        oid = order.oid.0,
                        sender = %order.sender,
                        error = %e,
                        "resting order could not fill"
                    );
                    self.release_order_hold(&order);
                    self.emit_event(EventPayload::OrderCanceled(OrderCanceledEvent {
                        account: order.sender,
                        asset: order.asset,
                        oid: order.oid,
                        reason: CancelReason::RetryFailed(e.to_string()),
                    }));
                }
            }
        }

        self.ledger.orders = still_resting;
        filled
    }

    pub(super) fn set_leverage(
        &mut self,
        sender: Address,
        perp: PerpId,
        leverage: u32,
        is_isolated: bool,
    ) -> Result<(), CoreError> {
        let info = self.perp_info(perp)?;
        if leverage == 0 || leverage > info.max_leverage {
            return Err(CoreError::LeverageTooHigh {
                perp,
                requested: leverage,
                max: info.max_leverage,
            });
        }
        if info.only_isolated && !is_isolated {
            return Err(CoreError::IsolatedOnly(perp));
        }

        let mut account = self.existing_account(sender)?;
        let mut position = account
            .position(perp)
            .copied()
            .unwrap_or_else(|| self.default_position(&info));
        if !position.is_empty() && position.is_isolated != is_isolated {
            return Err(CoreError::MarginModeLocked(perp));
        }
        position.leverage = leverage;
        position.is_isolated = is_isolated;
        account.set_position(perp, position);

        if !position.is_empty() {
            let summary = calculate_margin_summary(&account, self.mark_px_fn())?;
            if summary.is_liquidatable() {
                return Err(AccountError::InsufficientMargin {
                    required: summary.margin_used,
                    account_value: summary.account_value,
                }
                .into());
            }
        }
        self.commit_account(account);

        self.emit_event(EventPayload::LeverageUpdated(LeverageUpdatedEvent {
            account: sender,
            asset: Asset::Perp(perp),
            leverage,
            is_isolated,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::engine::{AdminOverride, LedgerMutator};
    use crate::registry::SpotInfo;
    use crate::types::ClientOrderId;

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BTC: PerpId = PerpId(0);
    const USDC: TokenId = TokenId(0);
    const PURR: TokenId = TokenId(1);
    const PURR_USDC: SpotMarketId = SpotMarketId(0);

    fn sim() -> CoreSim {
        let mut sim = CoreSim::new(SimConfig::default());
        sim.register_token_info(USDC, TokenInfo::usdc()).unwrap();
        sim.register_token_info(PURR, TokenInfo::new("PURR", 0, 5)).unwrap();
        sim.register_spot(PURR_USDC, SpotInfo::new("PURR/USDC", PURR, USDC)).unwrap();
        // sz decimals 2 -> px decimals 4
        sim.register_perp(BTC, PerpAssetInfo::new("BTC", 2, 10)).unwrap();
        sim.force_perp_balance(ALICE, 10_000_000_000).unwrap();
        sim
    }

    fn perp_order(is_buy: bool, px: u64, sz: u64, tif: TimeInForce) -> LimitOrder {
        LimitOrder {
            asset: Asset::Perp(BTC),
            is_buy,
            limit_px: px * 100_000_000,
            sz: sz * 100_000_000,
            reduce_only: false,
            tif,
            cloid: None,
        }
    }

    #[test]
    fn crossing_gtc_fills_at_oracle() {
        let mut sim = sim();
        sim.set_mark_px(BTC, 60_000_0000).unwrap();
        let result = sim
            .execute_perp_limit_order(ALICE, perp_order(true, 61_000, 1, TimeInForce::Gtc))
            .unwrap();
        assert_eq!(result.status, OrderStatus::Filled { sz: 100, px: 60_000_0000 });

        let position = sim.read_position(ALICE, BTC).unwrap();
        assert_eq!(position.szi, 100);
        assert_eq!(position.entry_ntl, 60_000_000_000);
    }

    #[test]
    fn tif_rules() {
        let mut sim = sim();
        sim.set_mark_px(BTC, 60_000_0000).unwrap();

        let alo =
            sim.execute_perp_limit_order(ALICE, perp_order(true, 61_000, 1, TimeInForce::Alo));
        assert_eq!(alo, Err(CoreError::OrderRejected(RejectReason::AloWouldCross)));

        let ioc =
            sim.execute_perp_limit_order(ALICE, perp_order(true, 59_000, 1, TimeInForce::Ioc));
        assert_eq!(ioc, Err(CoreError::OrderRejected(RejectReason::IocCouldNotFill)));

        let alo_rest = sim
            .execute_perp_limit_order(ALICE, perp_order(true, 59_000, 1, TimeInForce::Alo))
            .unwrap();
        assert_eq!(alo_rest.status, OrderStatus::Resting);
        assert_eq!(sim.pending_orders().len(), 1);
    }

    #[test]
    fn resting_order_fills_once_price_crosses() {
        let mut sim = sim();
        sim.set_mark_px(BTC, 60_000_0000).unwrap();
        sim.execute_perp_limit_order(ALICE, perp_order(true, 59_000, 1, TimeInForce::Gtc))
            .unwrap();
        assert_eq!(sim.process_pending_orders(), 0);

        sim.set_mark_px(BTC, 58_500_0000).unwrap();
        assert_eq!(sim.process_pending_orders(), 1);
        assert!(sim.pending_orders().is_empty());
        assert_eq!(sim.read_position(ALICE, BTC).unwrap().szi, 100);
    }

    #[test]
    fn reduce_only_clamps_and_rejects() {
        let mut sim = sim();
        sim.set_mark_px(BTC, 60_000_0000).unwrap();

        let mut close = perp_order(false, 59_000, 5, TimeInForce::Ioc);
        close.reduce_only = true;
        assert_eq!(
            sim.execute_perp_limit_order(ALICE, close),
            Err(CoreError::OrderRejected(RejectReason::ReduceOnlyNoPosition))
        );

        sim.execute_perp_limit_order(ALICE, perp_order(true, 61_000, 1, TimeInForce::Ioc))
            .unwrap();
        let result = sim.execute_perp_limit_order(ALICE, close).unwrap();
        assert_eq!(result.status, OrderStatus::Filled { sz: 100, px: 60_000_0000 });
        assert!(sim.read_position(ALICE, BTC).unwrap().is_empty());
    }

    #[test]
    fn opening_beyond_margin_rejected() {
        let mut sim = sim();
        sim.set_mark_px(BTC, 60_000_0000).unwrap();
        // 10_000 usd at 10x supports 100_000 notional, 2 BTC is 120_000
        let result =
            sim.execute_perp_limit_order(ALICE, perp_order(true, 61_000, 2, TimeInForce::Ioc));
        assert!(matches!(result, Err(CoreError::Account(AccountError::InsufficientMargin { .. }))));
        assert!(sim.read_position(ALICE, BTC).unwrap().is_empty());
    }

    #[test]
    fn leverage_bounds() {
        let mut sim = sim();
        assert_eq!(
            sim.update_leverage(ALICE, BTC, 11, false),
            Err(CoreError::LeverageTooHigh { perp: BTC, requested: 11, max: 10 })
        );
        sim.update_leverage(ALICE, BTC, 3, true).unwrap();
        let position = sim.read_position(ALICE, BTC).unwrap();
        assert_eq!((position.leverage, position.is_isolated), (3, true));
    }

    #[test]
    fn isolated_fill_moves_margin() {
        let mut sim = sim();
        sim.set_mark_px(BTC, 60_000_0000).unwrap();
        sim.update_leverage(ALICE, BTC, 10, true).unwrap();
        sim.execute_perp_limit_order(ALICE, perp_order(true, 61_000, 1, TimeInForce::Ioc))
            .unwrap();

        // 60_000 notional at 10x
        let position = sim.read_position(ALICE, BTC).unwrap();
        assert_eq!(position.isolated_raw_usd, 6_000_000_000);
        assert_eq!(sim.account(ALICE).unwrap().perp_balance, 4_000_000_000);
        assert_eq!(sim.read_account_margin_summary(ALICE).unwrap().account_value, 10_000_000_000);

        // closing hands the isolated margin back
        let mut close = perp_order(false, 59_000, 1, TimeInForce::Ioc);
        close.reduce_only = true;
        sim.execute_perp_limit_order(ALICE, close).unwrap();
        assert_eq!(sim.account(ALICE).unwrap().perp_balance, 10_000_000_000);
    }

    #[test]
    fn resting_spot_buy_holds_quote_until_cancel() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, USDC, 100_000_000_000).unwrap();
        let order = LimitOrder {
            asset: Asset::Spot(PURR_USDC),
            is_buy: true,
            limit_px: 20_000_000, // 0.2
            sz: 1_000 * 100_000_000,
            reduce_only: false,
            tif: TimeInForce::Gtc,
            cloid: Some(ClientOrderId(42)),
        };
        let result = sim.execute_spot_limit_order(ALICE, order).unwrap();
        assert_eq!(result.status, OrderStatus::Resting);
        // 1000 PURR at 0.2 = 200 USDC
        assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().hold, 20_000_000_000);

        sim.cancel_order_by_cloid(ALICE, Asset::Spot(PURR_USDC), ClientOrderId(42))
            .unwrap();
        assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().hold, 0);
        assert_eq!(
            sim.cancel_order_by_cloid(ALICE, Asset::Spot(PURR_USDC), ClientOrderId(42)),
            Err(CoreError::CloidNotFound(ClientOrderId(42)))
        );
    }

    #[test]
    fn spot_fill_moves_both_legs() {
        let mut sim = sim();
        sim.force_spot_balance(ALICE, USDC, 1_000_000_000).unwrap();
        sim.set_spot_px(PURR_USDC, 10_000_000).unwrap(); // 0.1
        let order = LimitOrder {
            asset: Asset::Spot(PURR_USDC),
            is_buy: true,
            limit_px: 20_000_000,
            sz: 50 * 100_000_000,
            reduce_only: false,
            tif: TimeInForce::Ioc,
            cloid: None,
        };
        sim.execute_spot_limit_order(ALICE, order).unwrap();

        // 50 PURR at 0.1 = 5 USDC
        assert_eq!(sim.read_spot_balance(ALICE, USDC).unwrap().total, 1_000_000_000 - 500_000_000);
        let purr = sim.read_spot_balance(ALICE, PURR).unwrap();
        assert_eq!(purr.total, 50 * 100_000);
        assert_eq!(purr.entry_ntl, 500_000_000);
    }
}
