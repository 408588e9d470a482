//! Protective Order Manager.
//!
//! Stop-loss and take-profit legs are reduce-only STOP_MARKET /
//! TAKE_PROFIT_MARKET orders triggered on the configured working type.
//!
//! A position moves NO_PROTECTION → PROTECTED on first placement, then
//! PROTECTED → UPDATING → PROTECTED on every [`Engine::safe_update`]. During an
//! update the new legs are placed **before** the old ones are cancelled, so the
//! position is never without a working stop. If placement fails the old legs
//! stay on the book untouched.
//!
//! `safe_update` evaluates, in order, returning at the first match:
//!
//! 1. trailing check: a new stop-loss may only tighten (→ `rejected`)
//! 2. danger zone: mark too close to an existing trigger (→ `skipped`)
//! 3. nothing to protect (→ `skipped`)
//! 4. already optimal: prices and sizes already match (→ `skipped`)
//! 5. atomic replace (→ `updated`, or `error` with old legs intact)

use std::time::Duration;

use perp_core::{Order, OrderRequest, PerpError, PositionDirection, Result, Side};
use perp_td::retry::{RetryPolicy, Verdict};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::ProtectionPolicy;
use crate::report::{ProtectionAction, ProtectionOutcome};
use crate::state::PositionState;
use crate::{Engine, client_order_id};

/// IDs of freshly placed legs and of the old orders cancelled afterwards.
#[derive(Debug, Clone, Default)]
pub struct PlacedProtection {
    pub stop_loss_order_id: Option<u64>,
    pub take_profit_order_id: Option<u64>,
    pub cancelled_orders: Vec<u64>,
}

/// Trailing-stop rule: with an existing stop-loss, a LONG may only raise it
/// and a SHORT may only lower it. Without one, any value is accepted.
pub fn check_trailing(
    direction: PositionDirection,
    new_stop_loss: Option<Decimal>,
    existing_stop_loss: Option<Decimal>,
) -> std::result::Result<(), String> {
    let (Some(new), Some(old)) = (new_stop_loss, existing_stop_loss) else {
        return Ok(());
    };
    if old <= Decimal::ZERO {
        return Ok(());
    }
    match direction {
        PositionDirection::Long if new < old => Err(format!(
            "stop-loss for LONG may only move up: {new} is below existing {old}"
        )),
        PositionDirection::Short if new > old => Err(format!(
            "stop-loss for SHORT may only move down: {new} is above existing {old}"
        )),
        _ => Ok(()),
    }
}

/// Reason to leave protection alone because `price` is about to hit an
/// existing trigger.
pub fn danger_zone(
    policy: &ProtectionPolicy,
    price: Decimal,
    existing_stop_loss: Option<Decimal>,
    existing_take_profit: Option<Decimal>,
) -> Option<String> {
    if price <= Decimal::ZERO {
        return None;
    }
    let near = |trigger: Decimal, threshold: Decimal| (price - trigger).abs() / price < threshold;

    if let Some(sl) = existing_stop_loss.filter(|sl| near(*sl, policy.sl_danger_pct)) {
        return Some(format!(
            "price {price} within {}% of stop-loss {sl}",
            policy.sl_danger_pct * Decimal::ONE_HUNDRED
        ));
    }
    if let Some(tp) = existing_take_profit.filter(|tp| near(*tp, policy.tp_danger_pct)) {
        return Some(format!(
            "price {price} within {}% of take-profit {tp}",
            policy.tp_danger_pct * Decimal::ONE_HUNDRED
        ));
    }
    None
}

/// Differences between the protection on the book and what the position
/// needs. Empty means already optimal.
///
/// A leg is checked when it is requested or already exists: its trigger must
/// match the request within `price_match_pct`, its size must match the
/// position within `quantity_tolerance_pct`, it must be the only one of its
/// kind and sit on the exit side.
pub fn protection_mismatch(
    policy: &ProtectionPolicy,
    state: &PositionState,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Vec<String> {
    let mut out = Vec::new();
    let Some(direction) = state.direction() else {
        return out;
    };
    let quantity = state.quantity();
    let exit_side = direction.exit_side();

    let stops: Vec<&Order> = state.open_orders.iter().filter(|o| o.is_stop_loss()).collect();
    let targets: Vec<&Order> = state.open_orders.iter().filter(|o| o.is_take_profit()).collect();

    leg_mismatch(policy, "stop-loss", stop_loss, state.stop_loss(), stops.len(), quantity, exit_side, &mut out);
    leg_mismatch(
        policy,
        "take-profit",
        take_profit,
        state.take_profit(),
        targets.len(),
        quantity,
        exit_side,
        &mut out,
    );
    out
}

#[allow(clippy::too_many_arguments)]
fn leg_mismatch(
    policy: &ProtectionPolicy,
    name: &str,
    requested: Option<Decimal>,
    existing: Option<&Order>,
    count: usize,
    position_qty: Decimal,
    exit_side: Side,
    out: &mut Vec<String>,
) {
    let Some(order) = existing else {
        if let Some(price) = requested {
            out.push(format!("{name} missing (requested {price})"));
        }
        return;
    };
    if let Some(price) = requested {
        if !prices_match(price, order.stop_price, policy.price_match_pct) {
            out.push(format!("{name} trigger {} differs from requested {price}", order.stop_price));
        }
    }
    if !quantity_matches(order.quantity, position_qty, policy.quantity_tolerance_pct) {
        out.push(format!(
            "{name} quantity {} does not match position {position_qty}",
            order.quantity
        ));
    }
    if order.side != exit_side {
        out.push(format!("{name} is on the wrong side ({})", order.side));
    }
    if count > 1 {
        out.push(format!("{count} {name} orders on the book"));
    }
}

fn prices_match(requested: Decimal, existing: Decimal, tolerance: Decimal) -> bool {
    existing > Decimal::ZERO && (requested - existing).abs() / existing <= tolerance
}

fn quantity_matches(order_qty: Decimal, position_qty: Decimal, tolerance: Decimal) -> bool {
    if position_qty.is_zero() {
        return order_qty.is_zero();
    }
    (order_qty - position_qty).abs() / position_qty <= tolerance
}

impl Engine {
    /// Reconcile `symbol`'s stop-loss / take-profit with the requested prices.
    /// `None` keeps the existing trigger for that leg.
    pub async fn update_protection(
        &self,
        symbol: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<ProtectionOutcome> {
        let state = self.position_state(symbol).await?;
        if !state.has_position() {
            return Ok(ProtectionOutcome::new(
                symbol,
                ProtectionAction::Error,
                format!("no open position for {symbol}"),
            ));
        }
        self.safe_update(&state, stop_loss, take_profit).await
    }

    /// The guarded update described in the module docs, against a snapshot.
    pub async fn safe_update(
        &self,
        state: &PositionState,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<ProtectionOutcome> {
        let symbol = state.symbol.as_str();
        let Some(direction) = state.direction() else {
            return Ok(ProtectionOutcome::new(
                symbol,
                ProtectionAction::Error,
                format!("no open position for {symbol}"),
            ));
        };
        let existing_sl = state.stop_loss_price();
        let existing_tp = state.take_profit_price();

        if let Err(reason) = check_trailing(direction, stop_loss, existing_sl) {
            warn!("[protect] {symbol}: rejected: {reason}");
            return Ok(self.describe(state, ProtectionAction::Rejected, reason));
        }

        let price = self.current_price(state).await?;
        if let Some(reason) = danger_zone(&self.policy, price, existing_sl, existing_tp) {
            warn!("[protect] {symbol}: skipped: {reason}");
            return Ok(self.describe(state, ProtectionAction::Skipped, reason));
        }

        if stop_loss.is_none() && take_profit.is_none() && existing_sl.is_none() && existing_tp.is_none()
        {
            return Ok(self.describe(
                state,
                ProtectionAction::Skipped,
                "no stop-loss or take-profit requested or present",
            ));
        }

        let mismatches = protection_mismatch(&self.policy, state, stop_loss, take_profit);
        if mismatches.is_empty() {
            info!("[protect] {symbol}: protection already optimal");
            return Ok(self.describe(state, ProtectionAction::Skipped, "already optimal"));
        }

        let target_sl = stop_loss.or(existing_sl);
        let target_tp = take_profit.or(existing_tp);
        match self
            .replace_protection(state, state.quantity(), target_sl, target_tp)
            .await
        {
            Ok(placed) => {
                info!(
                    "[protect] {symbol}: updated {direction} protection sl={target_sl:?} tp={target_tp:?} qty={}",
                    state.quantity()
                );
                let mut outcome =
                    ProtectionOutcome::new(symbol, ProtectionAction::Updated, "protection replaced")
                        .with_details(mismatches);
                outcome.stop_loss_price = target_sl;
                outcome.take_profit_price = target_tp;
                outcome.stop_loss_order_id = placed.stop_loss_order_id;
                outcome.take_profit_order_id = placed.take_profit_order_id;
                outcome.cancelled_orders = placed.cancelled_orders;
                Ok(outcome)
            }
            Err(err) => {
                warn!("[protect] {symbol}: placement failed, existing orders kept: {err}");
                Ok(self
                    .describe(state, ProtectionAction::Error, format!("placement failed: {err}"))
                    .with_details(mismatches))
            }
        }
    }

    /// Place new legs sized to `quantity`, then cancel every reduce-only order
    /// in `state`. Nothing is cancelled if placement fails.
    pub async fn replace_protection(
        &self,
        state: &PositionState,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<PlacedProtection> {
        let direction = state
            .direction()
            .ok_or_else(|| PerpError::NoPosition(state.symbol.clone()))?;
        let old: Vec<u64> = state.protective_orders().map(|o| o.order_id).collect();

        let mut placed = self
            .place_protection(&state.symbol, direction, quantity, stop_loss, take_profit)
            .await?;
        placed.cancelled_orders = self.cancel_orders_best_effort(&state.symbol, &old).await;
        Ok(placed)
    }

    /// Submit the stop-loss and/or take-profit legs for a `direction`
    /// position of `quantity`. If the take-profit cannot be placed, the
    /// stop-loss placed by this call is withdrawn again.
    pub async fn place_protection(
        &self,
        symbol: &str,
        direction: PositionDirection,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<PlacedProtection> {
        let side = direction.exit_side();
        let working_type = self.config.working_type;
        let mut placed = PlacedProtection::default();

        if let Some(trigger) = stop_loss {
            let request = OrderRequest::stop_loss(symbol, side, quantity, trigger, working_type)
                .with_client_id(client_order_id("sl"));
            let order = self.place_with_retry(&request, "stop-loss").await?;
            info!("[protect] {symbol}: stop-loss {} placed at {trigger} qty={quantity}", order.order_id);
            placed.stop_loss_order_id = Some(order.order_id);
        }

        if let Some(trigger) = take_profit {
            let request = OrderRequest::take_profit(symbol, side, quantity, trigger, working_type)
                .with_client_id(client_order_id("tp"));
            match self.place_with_retry(&request, "take-profit").await {
                Ok(order) => {
                    info!("[protect] {symbol}: take-profit {} placed at {trigger} qty={quantity}", order.order_id);
                    placed.take_profit_order_id = Some(order.order_id);
                }
                Err(err) => {
                    if let Some(id) = placed.stop_loss_order_id {
                        if let Err(cancel_err) = self.api.cancel_order(symbol, id).await {
                            warn!("[protect] {symbol}: could not withdraw new stop-loss {id}: {cancel_err}");
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok(placed)
    }

    /// Retries reuse the request's client order ID, so a duplicate submit is
    /// refused by the exchange rather than doubled.
    async fn place_with_retry(&self, request: &OrderRequest, label: &str) -> Result<Order> {
        let policy = RetryPolicy::fixed_attempts(
            self.config.protection_retries.max(1),
            Duration::from_millis(self.config.protection_retry_delay_ms),
        );
        let label = format!("{} {label}", request.symbol);
        policy
            .run(
                &label,
                |_| self.api.place_order(request),
                |err: &PerpError| match err {
                    PerpError::Validation { .. }
                    | PerpError::Config(_)
                    | PerpError::SymbolNotFound(_) => Verdict::Fatal,
                    _ => Verdict::Retry,
                },
            )
            .await
    }

    /// Cancel each order, logging failures. Returns the IDs actually cancelled.
    pub(crate) async fn cancel_orders_best_effort(&self, symbol: &str, ids: &[u64]) -> Vec<u64> {
        let mut cancelled = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.api.cancel_order(symbol, id).await {
                Ok(_) => {
                    info!("[protect] {symbol}: cancelled order {id}");
                    cancelled.push(id);
                }
                Err(err) => warn!("[protect] {symbol}: cancel {id} failed: {err}"),
            }
        }
        cancelled
    }

    /// Mark from the position snapshot, or the premium index when absent.
    async fn current_price(&self, state: &PositionState) -> Result<Decimal> {
        match state.mark_price() {
            Some(mark) if mark > Decimal::ZERO => Ok(mark),
            _ => Ok(self.api.mark_price(&state.symbol).await?.mark_price),
        }
    }

    /// Outcome carrying the protection currently on the book.
    fn describe(
        &self,
        state: &PositionState,
        action: ProtectionAction,
        reason: impl Into<String>,
    ) -> ProtectionOutcome {
        let mut outcome = ProtectionOutcome::new(&state.symbol, action, reason);
        outcome.stop_loss_price = state.stop_loss_price();
        outcome.take_profit_price = state.take_profit_price();
        outcome.stop_loss_order_id = state.stop_loss().map(|o| o.order_id);
        outcome.take_profit_order_id = state.take_profit().map(|o| o.order_id);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SYMBOL, SimExchange};
    use perp_core::OrderType;
    use rust_decimal_macros::dec;

    #[test]
    fn trailing_long_only_tightens_upward() {
        let long = PositionDirection::Long;
        assert!(check_trailing(long, Some(dec!(95)), Some(dec!(100))).is_err());
        assert!(check_trailing(long, Some(dec!(105)), Some(dec!(100))).is_ok());
        assert!(check_trailing(long, Some(dec!(100)), Some(dec!(100))).is_ok());
        assert!(check_trailing(long, Some(dec!(50)), None).is_ok());
    }

    #[test]
    fn trailing_short_only_tightens_downward() {
        let short = PositionDirection::Short;
        assert!(check_trailing(short, Some(dec!(105)), Some(dec!(100))).is_err());
        assert!(check_trailing(short, Some(dec!(95)), Some(dec!(100))).is_ok());
        assert!(check_trailing(short, None, Some(dec!(100))).is_ok());
    }

    #[test]
    fn danger_zone_thresholds_are_strict() {
        let policy = ProtectionPolicy::default();
        // 0.4% from the stop
        assert!(danger_zone(&policy, dec!(100), Some(dec!(99.6)), None).is_some());
        // exactly 0.5% is outside the zone
        assert!(danger_zone(&policy, dec!(100), Some(dec!(99.5)), None).is_none());
        // 0.1% from the target
        assert!(danger_zone(&policy, dec!(100), None, Some(dec!(100.1))).is_some());
        assert!(danger_zone(&policy, dec!(100), None, Some(dec!(100.3))).is_none());
    }

    #[tokio::test]
    async fn long_rejects_wider_stop_and_accepts_tighter() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        sim.set_mark(dec!(110));
        let old_sl = sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(100), true);
        let engine = sim.engine();

        let rejected = engine.update_protection(SYMBOL, Some(dec!(95)), None).await.unwrap();
        assert_eq!(rejected.action, ProtectionAction::Rejected);
        assert!(!rejected.success);
        assert_eq!(sim.open_order_ids(), vec![old_sl]);

        let updated = engine.update_protection(SYMBOL, Some(dec!(105)), None).await.unwrap();
        assert_eq!(updated.action, ProtectionAction::Updated);
        assert_eq!(updated.cancelled_orders, vec![old_sl]);
        let orders = sim.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].stop_price, dec!(105));
        assert_eq!(orders[0].side, Side::Sell);
        assert!(orders[0].reduce_only);
    }

    #[tokio::test]
    async fn short_rejects_wider_stop_and_accepts_tighter() {
        let sim = SimExchange::new();
        sim.set_position(dec!(-1), dec!(100));
        sim.set_mark(dec!(90));
        sim.seed_order(OrderType::StopMarket, Side::Buy, dec!(1), dec!(100), true);
        let engine = sim.engine();

        let rejected = engine.update_protection(SYMBOL, Some(dec!(105)), None).await.unwrap();
        assert_eq!(rejected.action, ProtectionAction::Rejected);

        let updated = engine.update_protection(SYMBOL, Some(dec!(95)), None).await.unwrap();
        assert_eq!(updated.action, ProtectionAction::Updated);
        assert_eq!(sim.orders()[0].stop_price, dec!(95));
        assert_eq!(sim.orders()[0].side, Side::Buy);
    }

    #[tokio::test]
    async fn repeated_update_is_skipped_as_optimal() {
        let sim = SimExchange::new();
        sim.set_position(dec!(2), dec!(100));
        let engine = sim.engine();

        let first = engine
            .update_protection(SYMBOL, Some(dec!(90)), Some(dec!(120)))
            .await
            .unwrap();
        assert_eq!(first.action, ProtectionAction::Updated);
        let placed = sim.calls().iter().filter(|c| c.starts_with("place")).count();
        assert_eq!(placed, 2);

        let second = engine
            .update_protection(SYMBOL, Some(dec!(90)), Some(dec!(120)))
            .await
            .unwrap();
        assert_eq!(second.action, ProtectionAction::Skipped);
        assert_eq!(second.reason, "already optimal");
        let placed_after = sim.calls().iter().filter(|c| c.starts_with("place")).count();
        assert_eq!(placed_after, 2);
        assert_eq!(sim.orders().len(), 2);
    }

    #[tokio::test]
    async fn stop_exactly_at_match_tolerance_is_optimal() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        sim.set_mark(dec!(120));
        let sl = sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(100), true);

        let outcome = sim
            .engine()
            .update_protection(SYMBOL, Some(dec!(100.1)), None)
            .await
            .unwrap();
        assert_eq!(outcome.action, ProtectionAction::Skipped);
        assert_eq!(outcome.reason, "already optimal");
        assert_eq!(sim.open_order_ids(), vec![sl]);
    }

    #[tokio::test]
    async fn failed_placement_keeps_old_orders() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        let old_sl = sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(90), true);
        let old_tp = sim.seed_order(OrderType::TakeProfitMarket, Side::Sell, dec!(1), dec!(120), true);
        sim.set_fail_protective(true);
        let engine = sim.engine();

        let outcome = engine
            .update_protection(SYMBOL, Some(dec!(95)), Some(dec!(125)))
            .await
            .unwrap();
        assert_eq!(outcome.action, ProtectionAction::Error);
        assert!(!outcome.success);
        assert_eq!(sim.open_order_ids(), vec![old_sl, old_tp]);
        // three attempts, no cancels
        let calls = sim.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("place STOP_MARKET")).count(), 3);
        assert!(!calls.iter().any(|c| c.starts_with("cancel")));
    }

    #[tokio::test]
    async fn inside_danger_zone_nothing_changes() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        sim.set_mark(dec!(90.3));
        let old_sl = sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(90), true);
        let engine = sim.engine();

        let outcome = engine.update_protection(SYMBOL, Some(dec!(91)), None).await.unwrap();
        assert_eq!(outcome.action, ProtectionAction::Skipped);
        assert!(outcome.reason.contains("stop-loss"));
        assert_eq!(sim.open_order_ids(), vec![old_sl]);
    }

    #[tokio::test]
    async fn unspecified_leg_keeps_existing_trigger() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(90), true);
        sim.seed_order(OrderType::TakeProfitMarket, Side::Sell, dec!(1), dec!(120), true);
        let engine = sim.engine();

        let outcome = engine.update_protection(SYMBOL, Some(dec!(92)), None).await.unwrap();
        assert_eq!(outcome.action, ProtectionAction::Updated);
        assert_eq!(outcome.take_profit_price, Some(dec!(120)));
        let orders = sim.orders();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().any(|o| o.is_take_profit() && o.stop_price == dec!(120)));
        assert!(orders.iter().any(|o| o.is_stop_loss() && o.stop_price == dec!(92)));
    }

    #[tokio::test]
    async fn undersized_protection_is_resynced_to_position() {
        let sim = SimExchange::new();
        sim.set_position(dec!(3), dec!(100));
        sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(90), true);
        let engine = sim.engine();

        let outcome = engine.update_protection(SYMBOL, None, None).await.unwrap();
        assert_eq!(outcome.action, ProtectionAction::Updated);
        let orders = sim.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].quantity, dec!(3));
        assert_eq!(orders[0].stop_price, dec!(90));
    }

    #[tokio::test]
    async fn flat_symbol_is_an_error_outcome() {
        let sim = SimExchange::new();
        let outcome = sim
            .engine()
            .update_protection(SYMBOL, Some(dec!(90)), None)
            .await
            .unwrap();
        assert_eq!(outcome.action, ProtectionAction::Error);
        assert!(sim.calls().is_empty());
    }
}
