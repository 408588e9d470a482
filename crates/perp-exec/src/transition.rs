//! Position Transition Engine: open (with implicit flip), close, reduce.
//!
//! Each transition re-reads the position after its market order settles and
//! sizes protection from what the exchange reports, not from what was asked
//! for. A failure midway (e.g. after the opposite side was closed but before
//! the new entry) leaves a state the next snapshot observes as-is.

use perp_core::{OrderRequest, PerpError, PositionDirection, Result};
use perp_td::precision::floor_to_step;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::protection::check_trailing;
use crate::report::{CloseReport, OpenReport, ReduceReport, ResyncOutcome};
use crate::sizing::{resolve_leverage, size_order, validate_order_params};
use crate::state::PositionState;
use crate::{Engine, client_order_id};

/// Polls of the position after closing the opposite side before giving up.
const CLOSE_VERIFY_ATTEMPTS: u32 = 3;

/// Request to open or add to a position.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenRequest {
    pub symbol: String,
    pub direction: PositionDirection,
    pub notional_usd: Decimal,
    pub leverage: u32,
    /// Limit price; a market order is sent when absent.
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

fn check_percent(percent: Decimal) -> Result<()> {
    if percent <= Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(PerpError::validation(format!(
            "percent must be in (0, 100], got {percent}"
        )));
    }
    Ok(())
}

impl Engine {
    /// Open `request.direction`, closing an opposite position first.
    pub async fn open(&self, request: &OpenRequest) -> Result<OpenReport> {
        let symbol = request.symbol.as_str();
        let direction = request.direction;
        let mut adjustments = Vec::new();
        let mut warnings = Vec::new();

        let state = self.position_state(symbol).await?;
        let previous_direction = state.direction();
        let previous_quantity = state.quantity();

        match previous_direction {
            Some(current) if current != direction => {
                self.flatten(&state).await?;
                adjustments.push(format!(
                    "closed {current} position of {previous_quantity} before opening {direction}"
                ));
            }
            Some(_) => {}
            None => match self.api.cancel_all_orders(symbol).await {
                Ok(()) if !state.open_orders.is_empty() => adjustments.push(format!(
                    "cancelled {} stale order(s) before entry",
                    state.open_orders.len()
                )),
                Ok(()) => {}
                Err(err) => {
                    warn!("[exec] {symbol}: stale order cleanup failed: {err}");
                    warnings.push(format!("stale order cleanup failed: {err}"));
                }
            },
        }

        let filters = self.api.symbol_filters(symbol, false).await?;
        let price = match request.entry_price {
            Some(price) => price,
            None => self.api.mark_price(symbol).await?.mark_price,
        };
        let sized = size_order(request.notional_usd, price, &filters)?;
        if sized.raised_to_minimum {
            adjustments.push(format!(
                "order size raised from {} to {} USD to meet exchange minimums",
                request.notional_usd,
                sized.notional.round_dp(2)
            ));
        }

        let account = self.api.account().await?;
        let leverage = resolve_leverage(
            sized.notional,
            account.available_balance,
            request.leverage,
            self.config.max_leverage,
            self.config.allow_leverage_escalation,
        )?;
        if let Some(from) = leverage.escalated_from {
            warn!(
                "[exec] {symbol}: leverage raised {from}x -> {}x (available={})",
                leverage.leverage, account.available_balance
            );
            adjustments.push(format!(
                "leverage raised from {from}x to {}x to fit available margin {}",
                leverage.leverage, account.available_balance
            ));
        }
        self.api.set_leverage(symbol, leverage.leverage).await?;

        let checked = validate_order_params(price, sized.quantity, &filters).into_result()?;
        let side = direction.entry_side();
        let client_id = client_order_id(&format!("{}_open", direction.as_str().to_ascii_lowercase()));
        let entry = match request.entry_price {
            Some(limit) => OrderRequest::limit(symbol, side, checked.adjusted_quantity, limit),
            None => OrderRequest::market(symbol, side, checked.adjusted_quantity),
        }
        .with_client_id(client_id.clone());
        let order = self.api.place_order(&entry).await?;
        info!(
            "[exec] {symbol}: {} entry {} {side} {} @ {price} lev={}x id={}",
            entry.order_type.as_str(),
            direction,
            checked.adjusted_quantity,
            leverage.leverage,
            order.order_id
        );

        self.settle(self.config.settle_delay_ms).await;
        let after = self.position_state(symbol).await?;
        let total = after.quantity();

        let mut report = OpenReport {
            success: true,
            action: format!("OPEN_{direction}"),
            symbol: symbol.to_string(),
            order_id: order.order_id,
            client_order_id: client_id,
            order_type: entry.order_type.as_str().to_string(),
            new_order_quantity: checked.adjusted_quantity,
            total_position_quantity: total,
            entry_price: request.entry_price,
            leverage: leverage.leverage,
            new_order_notional: checked.notional,
            stop_loss_price: after.stop_loss_price(),
            take_profit_price: after.take_profit_price(),
            stop_loss_order_id: after.stop_loss().map(|o| o.order_id),
            take_profit_order_id: after.take_profit().map(|o| o.order_id),
            had_previous_position: previous_direction.is_some(),
            previous_direction,
            adjustments,
            warnings,
        };

        if !after.has_position() {
            report.warnings.push(
                "entry not filled yet; protection will be placed once the position exists".into(),
            );
            return Ok(report);
        }
        if after.direction() != Some(direction) {
            report.warnings.push(format!(
                "position is {:?} after {direction} entry; protection left unchanged",
                after.direction()
            ));
            return Ok(report);
        }

        let changed = previous_direction != Some(direction) || total != previous_quantity;
        if changed {
            self.protect_after_entry(&after, request, &mut report).await;
        } else if request.stop_loss.is_some() || request.take_profit.is_some() {
            // Resting limit entry: the position is as before, only prices may move.
            let outcome = self
                .safe_update(&after, request.stop_loss, request.take_profit)
                .await?;
            if outcome.is_failure() {
                report
                    .warnings
                    .push(format!("protection {:?}: {}", outcome.action, outcome.reason));
            }
            report.stop_loss_price = outcome.stop_loss_price;
            report.take_profit_price = outcome.take_profit_price;
            report.stop_loss_order_id = outcome.stop_loss_order_id;
            report.take_profit_order_id = outcome.take_profit_order_id;
        }
        Ok(report)
    }

    /// Size protection to the whole position after an entry filled.
    async fn protect_after_entry(
        &self,
        after: &PositionState,
        request: &OpenRequest,
        report: &mut OpenReport,
    ) {
        let symbol = after.symbol.as_str();
        let existing_sl = after.stop_loss_price();
        let existing_tp = after.take_profit_price();

        let mut stop_loss = request.stop_loss;
        if let Err(reason) = check_trailing(request.direction, stop_loss, existing_sl) {
            warn!("[exec] {symbol}: {reason}; keeping existing stop-loss");
            report.warnings.push(format!("{reason}; keeping existing stop-loss"));
            stop_loss = None;
        }
        let stop_loss = stop_loss.or(existing_sl);
        let take_profit = request.take_profit.or(existing_tp);

        if stop_loss.is_none() && take_profit.is_none() {
            report
                .warnings
                .push("position opened without stop-loss or take-profit".into());
            return;
        }

        match self
            .replace_protection(after, after.quantity(), stop_loss, take_profit)
            .await
        {
            Ok(placed) => {
                report.stop_loss_price = stop_loss;
                report.take_profit_price = take_profit;
                report.stop_loss_order_id = placed.stop_loss_order_id;
                report.take_profit_order_id = placed.take_profit_order_id;
            }
            Err(err) => {
                warn!("[exec] {symbol}: protection placement failed after entry: {err}");
                report
                    .warnings
                    .push(format!("protection placement failed: {err}"));
            }
        }
    }

    /// Market-close the whole position, verify it is flat, then clear the book.
    async fn flatten(&self, state: &PositionState) -> Result<()> {
        let symbol = state.symbol.as_str();
        let direction = state
            .direction()
            .ok_or_else(|| PerpError::NoPosition(symbol.to_string()))?;
        let quantity = state.quantity();

        let request = OrderRequest::market(symbol, direction.exit_side(), quantity)
            .reduce_only()
            .with_client_id(client_order_id("close"));
        let order = self.api.place_order(&request).await?;
        info!("[exec] {symbol}: closing {direction} {quantity} before flip, id={}", order.order_id);

        let mut flat = false;
        for attempt in 1..=CLOSE_VERIFY_ATTEMPTS {
            self.settle(self.config.close_settle_ms).await;
            let positions = self.api.positions(Some(symbol)).await?;
            if !PositionState::new(symbol, positions, Vec::new()).has_position() {
                flat = true;
                break;
            }
            warn!("[exec] {symbol}: still open after close (check {attempt}/{CLOSE_VERIFY_ATTEMPTS})");
        }
        if !flat {
            return Err(PerpError::Operational(format!(
                "{direction} position on {symbol} not flat after close"
            )));
        }

        self.api.cancel_all_orders(symbol).await?;
        Ok(())
    }

    /// Close `percent` of the position. Below 100 this is a reduction.
    pub async fn close(&self, symbol: &str, percent: Decimal) -> Result<CloseReport> {
        check_percent(percent)?;
        if percent < Decimal::ONE_HUNDRED {
            let reduced = self.reduce(symbol, percent).await?;
            return Ok(CloseReport {
                success: true,
                symbol: symbol.to_string(),
                percent,
                closed_quantity: reduced.reduce_qty,
                order_id: Some(reduced.order_id),
                client_order_id: Some(reduced.client_order_id),
                cancelled_orders: reduced
                    .protection_resync
                    .map(|r| r.cancelled_orders)
                    .unwrap_or_default(),
                message: format!("closed {percent}% of position"),
                warnings: reduced.warnings,
            });
        }

        let state = self.position_state(symbol).await?;
        let Some(direction) = state.direction() else {
            return Ok(CloseReport {
                success: true,
                symbol: symbol.to_string(),
                percent,
                closed_quantity: Decimal::ZERO,
                order_id: None,
                client_order_id: None,
                cancelled_orders: Vec::new(),
                message: "No position to close".into(),
                warnings: Vec::new(),
            });
        };
        let quantity = state.quantity();

        let protective: Vec<u64> = state.protective_orders().map(|o| o.order_id).collect();
        let cancelled = self.cancel_orders_best_effort(symbol, &protective).await;
        let mut warnings = Vec::new();
        if cancelled.len() < protective.len() {
            warnings.push(format!(
                "{} protective order(s) could not be cancelled",
                protective.len() - cancelled.len()
            ));
        }

        let client_id = client_order_id("close");
        let request = OrderRequest::market(symbol, direction.exit_side(), quantity)
            .reduce_only()
            .with_client_id(client_id.clone());
        let order = self.api.place_order(&request).await?;
        info!("[exec] {symbol}: closed {direction} {quantity}, id={}", order.order_id);

        Ok(CloseReport {
            success: true,
            symbol: symbol.to_string(),
            percent,
            closed_quantity: quantity,
            order_id: Some(order.order_id),
            client_order_id: Some(client_id),
            cancelled_orders: cancelled,
            message: format!("closed {direction} position of {quantity}"),
            warnings,
        })
    }

    /// Reduce the position by `percent` and resize protection to what remains.
    ///
    /// Existing protection stays on the book during the reduction; reduce-only
    /// semantics cap it at the smaller position. A failed resync is reported
    /// but not fatal.
    pub async fn reduce(&self, symbol: &str, percent: Decimal) -> Result<ReduceReport> {
        check_percent(percent)?;
        let state = self.position_state(symbol).await?;
        let Some(direction) = state.direction() else {
            return Err(PerpError::NoPosition(symbol.to_string()));
        };
        let old_quantity = state.quantity();

        let filters = self.api.symbol_filters(symbol, false).await?;
        let quantity = if percent == Decimal::ONE_HUNDRED {
            old_quantity
        } else {
            floor_to_step(old_quantity * percent / Decimal::ONE_HUNDRED, filters.step_size)
        };
        if quantity <= Decimal::ZERO || quantity < filters.min_qty {
            return Err(PerpError::validation(format!(
                "reduce quantity {quantity} below minimum {} ({percent}% of {old_quantity})",
                filters.min_qty
            )));
        }

        let client_id = client_order_id("reduce");
        let request = OrderRequest::market(symbol, direction.exit_side(), quantity)
            .reduce_only()
            .with_client_id(client_id.clone());
        let order = self.api.place_order(&request).await?;
        info!("[exec] {symbol}: reduced {direction} by {quantity} ({percent}%), id={}", order.order_id);

        self.settle(self.config.settle_delay_ms).await;
        let mut warnings = Vec::new();
        let (remaining, resync) = match self.position_state(symbol).await {
            Ok(after) => {
                let resync = self.resync_after_reduce(&after, old_quantity).await;
                if let Some(err) = &resync.error {
                    warnings.push(format!("protection resync failed: {err}"));
                }
                (after.quantity(), Some(resync))
            }
            Err(err) => {
                warn!("[exec] {symbol}: could not re-read position after reduce: {err}");
                warnings.push(format!("position re-read failed, protection not resynced: {err}"));
                (old_quantity - quantity, None)
            }
        };

        Ok(ReduceReport {
            success: true,
            symbol: symbol.to_string(),
            reduce_pct: percent,
            reduce_qty: quantity,
            remaining_quantity: remaining,
            order_id: order.order_id,
            client_order_id: client_id,
            protection_resync: resync,
            warnings,
        })
    }

    async fn resync_after_reduce(&self, after: &PositionState, old_quantity: Decimal) -> ResyncOutcome {
        let symbol = after.symbol.as_str();
        let new_quantity = after.quantity();
        let mut outcome = ResyncOutcome {
            old_quantity,
            new_quantity,
            stop_loss: after.stop_loss_price(),
            take_profit: after.take_profit_price(),
            ..ResyncOutcome::default()
        };

        if !after.has_position() {
            let leftovers: Vec<u64> = after.protective_orders().map(|o| o.order_id).collect();
            outcome.cancelled_orders = self.cancel_orders_best_effort(symbol, &leftovers).await;
            outcome.adjusted = !outcome.cancelled_orders.is_empty();
            return outcome;
        }
        if outcome.stop_loss.is_none() && outcome.take_profit.is_none() {
            return outcome;
        }
        if crate::protection::protection_mismatch(&self.policy, after, None, None).is_empty() {
            return outcome;
        }

        match self
            .replace_protection(after, new_quantity, outcome.stop_loss, outcome.take_profit)
            .await
        {
            Ok(placed) => {
                info!("[exec] {symbol}: protection resized {old_quantity} -> {new_quantity}");
                outcome.adjusted = true;
                outcome.cancelled_orders = placed.cancelled_orders;
            }
            Err(err) => {
                warn!("[exec] {symbol}: protection resync failed, larger orders remain: {err}");
                outcome.error = Some(err.to_string());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SYMBOL, SimExchange};
    use perp_core::{OrderType, Side};
    use rust_decimal_macros::dec;

    fn open_request(direction: PositionDirection, notional: Decimal, leverage: u32) -> OpenRequest {
        OpenRequest {
            symbol: SYMBOL.into(),
            direction,
            notional_usd: notional,
            leverage,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    #[tokio::test]
    async fn fresh_long_is_sized_and_protected() {
        let sim = SimExchange::new();
        let stale = sim.seed_order(OrderType::Limit, Side::Sell, dec!(1), dec!(120), false);
        let engine = sim.engine();

        let mut request = open_request(PositionDirection::Long, dec!(1000), 5);
        request.stop_loss = Some(dec!(95));
        request.take_profit = Some(dec!(120));
        let report = engine.open(&request).await.unwrap();

        assert!(report.success);
        assert_eq!(report.action, "OPEN_LONG");
        assert_eq!(report.order_type, "MARKET");
        assert_eq!(report.new_order_quantity, dec!(10));
        assert_eq!(report.total_position_quantity, dec!(10));
        assert_eq!(report.leverage, 5);
        assert!(!report.had_previous_position);
        assert!(report.client_order_id.starts_with("long_open_"));
        assert!(report.stop_loss_order_id.is_some());
        assert!(report.take_profit_order_id.is_some());

        assert!(!sim.open_order_ids().contains(&stale));
        assert_eq!(sim.position_amt(), dec!(10));
        let calls = sim.calls();
        assert!(sim.call_index("cancel_all").unwrap() < sim.call_index("place MARKET BUY").unwrap());
        assert!(calls.contains(&"leverage 5".to_string()));
        let orders = sim.orders();
        assert!(orders.iter().all(|o| o.reduce_only && o.quantity == dec!(10)));
    }

    #[tokio::test]
    async fn below_min_notional_is_raised() {
        let sim = SimExchange::new();
        sim.set_mark(dec!(50000));
        sim.set_min_notional(dec!(100));
        let report = sim
            .engine()
            .open(&open_request(PositionDirection::Long, dec!(50), 10))
            .await
            .unwrap();
        assert_eq!(report.new_order_quantity, dec!(0.002));
        assert_eq!(report.new_order_notional, dec!(100));
        assert!(report.adjustments.iter().any(|a| a.contains("raised")));
    }

    #[tokio::test]
    async fn flip_closes_verifies_and_cleans_before_entry() {
        let sim = SimExchange::new();
        sim.set_position(dec!(-1), dec!(100));
        let old_sl = sim.seed_order(OrderType::StopMarket, Side::Buy, dec!(1), dec!(110), true);
        let engine = sim.engine();

        let report = engine
            .open(&open_request(PositionDirection::Long, dec!(500), 10))
            .await
            .unwrap();

        assert!(report.had_previous_position);
        assert_eq!(report.previous_direction, Some(PositionDirection::Short));
        assert_eq!(sim.position_amt(), dec!(5));
        assert!(!sim.open_order_ids().contains(&old_sl));

        let close = sim.call_index("place MARKET BUY reduce_only").unwrap();
        let cancel_all = sim.call_index("cancel_all").unwrap();
        let calls = sim.calls();
        let entry = calls
            .iter()
            .position(|c| c == "place MARKET BUY")
            .unwrap();
        assert!(close < cancel_all && cancel_all < entry);
    }

    #[tokio::test]
    async fn adding_resyncs_protection_to_total() {
        let sim = SimExchange::new();
        sim.set_position(dec!(2), dec!(100));
        let old_sl = sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(2), dec!(90), true);
        let engine = sim.engine();

        // a looser stop on an add keeps the existing one
        let mut request = open_request(PositionDirection::Long, dec!(300), 10);
        request.stop_loss = Some(dec!(85));
        let report = engine.open(&request).await.unwrap();

        assert_eq!(report.total_position_quantity, dec!(5));
        assert!(report.warnings.iter().any(|w| w.contains("keeping existing stop-loss")));
        assert_eq!(report.stop_loss_price, Some(dec!(90)));
        assert!(!sim.calls().contains(&"cancel_all".to_string()));

        let orders = sim.orders();
        assert_eq!(orders.len(), 1);
        assert_ne!(orders[0].order_id, old_sl);
        assert_eq!(orders[0].quantity, dec!(5));
        assert_eq!(orders[0].stop_price, dec!(90));
    }

    #[tokio::test]
    async fn limit_entry_rests_and_defers_protection() {
        let sim = SimExchange::new();
        let mut request = open_request(PositionDirection::Short, dec!(1000), 5);
        request.entry_price = Some(dec!(105));
        request.stop_loss = Some(dec!(110));
        let report = sim.engine().open(&request).await.unwrap();

        assert_eq!(report.order_type, "LIMIT");
        assert!(report.client_order_id.starts_with("short_open_"));
        assert_eq!(report.total_position_quantity, Decimal::ZERO);
        assert!(report.warnings.iter().any(|w| w.contains("not filled")));
        let orders = sim.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_type, OrderType::Limit);
    }

    #[tokio::test]
    async fn leverage_escalates_when_margin_is_short() {
        let sim = SimExchange::new();
        sim.set_available(dec!(150));
        let report = sim
            .engine()
            .open(&open_request(PositionDirection::Long, dec!(1000), 3))
            .await
            .unwrap();
        assert_eq!(report.leverage, 7);
        assert_eq!(sim.leverage(), 7);
        assert!(report.adjustments.iter().any(|a| a.contains("3x to 7x")));
    }

    #[tokio::test]
    async fn insufficient_balance_places_nothing() {
        let sim = SimExchange::new();
        sim.set_available(dec!(5));
        let err = sim
            .engine()
            .open(&open_request(PositionDirection::Long, dec!(1000), 10))
            .await
            .unwrap_err();
        assert!(matches!(err, PerpError::InsufficientBalance { min_leverage: 200, .. }));
        assert!(!sim.calls().iter().any(|c| c.starts_with("place")));
    }

    #[tokio::test]
    async fn reduce_half_resyncs_protection() {
        let sim = SimExchange::new();
        sim.set_position(dec!(10), dec!(100));
        sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(10), dec!(90), true);
        sim.seed_order(OrderType::TakeProfitMarket, Side::Sell, dec!(10), dec!(120), true);
        let engine = sim.engine();

        let report = engine.reduce(SYMBOL, dec!(50)).await.unwrap();
        assert_eq!(report.reduce_qty, dec!(5));
        assert_eq!(report.remaining_quantity, dec!(5));
        assert!(report.client_order_id.starts_with("reduce_"));
        assert_eq!(sim.position_amt(), dec!(5));

        let resync = report.protection_resync.unwrap();
        assert!(resync.adjusted);
        assert_eq!(resync.old_quantity, dec!(10));
        assert_eq!(resync.new_quantity, dec!(5));
        assert_eq!(resync.cancelled_orders.len(), 2);

        let orders = sim.orders();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.quantity == dec!(5)));

        // the reduction went out while the old orders were still listed
        let reduce = sim.call_index("place MARKET SELL reduce_only").unwrap();
        let first_cancel = sim.call_index("cancel").unwrap();
        assert!(reduce < first_cancel);
    }

    #[tokio::test]
    async fn failed_resync_still_reports_the_reduction() {
        let sim = SimExchange::new();
        sim.set_position(dec!(10), dec!(100));
        let old_sl = sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(10), dec!(90), true);
        sim.set_fail_protective(true);

        let report = sim.engine().reduce(SYMBOL, dec!(50)).await.unwrap();
        assert!(report.success);
        let resync = report.protection_resync.unwrap();
        assert!(!resync.adjusted);
        assert!(resync.error.is_some());
        assert_eq!(sim.open_order_ids(), vec![old_sl]);
        assert!(!report.warnings.is_empty());
    }

    #[tokio::test]
    async fn reduce_requires_position_and_valid_percent() {
        let sim = SimExchange::new();
        let engine = sim.engine();
        assert!(matches!(
            engine.reduce(SYMBOL, dec!(50)).await.unwrap_err(),
            PerpError::NoPosition(_)
        ));
        sim.set_position(dec!(1), dec!(100));
        assert!(engine.reduce(SYMBOL, dec!(0)).await.is_err());
        assert!(engine.reduce(SYMBOL, dec!(150)).await.is_err());
        // 0.05% of 1 floors to zero
        assert!(matches!(
            engine.reduce(SYMBOL, dec!(0.05)).await.unwrap_err(),
            PerpError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn close_cancels_protection_then_exits() {
        let sim = SimExchange::new();
        sim.set_position(dec!(-3), dec!(100));
        let sl = sim.seed_order(OrderType::StopMarket, Side::Buy, dec!(3), dec!(110), true);
        let entry = sim.seed_order(OrderType::Limit, Side::Sell, dec!(1), dec!(105), false);

        let report = sim.engine().close(SYMBOL, dec!(100)).await.unwrap();
        assert_eq!(report.closed_quantity, dec!(3));
        assert_eq!(report.cancelled_orders, vec![sl]);
        assert_eq!(sim.position_amt(), Decimal::ZERO);
        assert_eq!(sim.open_order_ids(), vec![entry]);
        assert!(sim.call_index(&format!("cancel {sl}")).unwrap() < sim.call_index("place MARKET BUY").unwrap());
    }

    #[tokio::test]
    async fn close_when_flat_is_a_no_op() {
        let sim = SimExchange::new();
        let report = sim.engine().close(SYMBOL, dec!(100)).await.unwrap();
        assert!(report.success);
        assert_eq!(report.message, "No position to close");
        assert!(sim.calls().is_empty());
    }

    #[tokio::test]
    async fn partial_close_delegates_to_reduce() {
        let sim = SimExchange::new();
        sim.set_position(dec!(4), dec!(100));
        let report = sim.engine().close(SYMBOL, dec!(25)).await.unwrap();
        assert_eq!(report.closed_quantity, dec!(1));
        assert_eq!(sim.position_amt(), dec!(3));
    }
}
