//! Pre-trade environment preparation.
//!
//! Run before executing a planned action: reconciles protection on a position
//! that is being kept, clears pending entry orders, and clears the whole book
//! when flat. `ready` is false whenever anything needs the caller's attention.

use perp_core::{PlannedAction, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::Engine;
use crate::protection::protection_mismatch;
use crate::report::{PrepareReport, PrepareStatus, ProtectionAction};

impl Engine {
    pub async fn prepare_environment(
        &self,
        symbol: &str,
        action: PlannedAction,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<PrepareReport> {
        let state = self.position_state(symbol).await?;
        let mut actions_taken = Vec::new();
        let mut warnings = Vec::new();

        let current = state.direction();
        let is_reversing = matches!(
            (current, action.direction()),
            (Some(now), Some(next)) if now != next
        );

        if let Some(direction) = current {
            if !is_reversing {
                if !protection_mismatch(&self.policy, &state, stop_loss, take_profit).is_empty() {
                    let outcome = self.safe_update(&state, stop_loss, take_profit).await?;
                    match outcome.action {
                        ProtectionAction::Updated => {
                            actions_taken.push(format!("protection updated: {}", outcome.reason))
                        }
                        ProtectionAction::Skipped => {
                            actions_taken.push(format!("protection left as is: {}", outcome.reason))
                        }
                        ProtectionAction::Rejected | ProtectionAction::Error => warnings.push(
                            format!("protection {:?}: {}", outcome.action, outcome.reason),
                        ),
                    }
                }
                if state.stop_loss_price().is_none() && stop_loss.is_none() {
                    warnings.push(format!("{direction} position has no stop-loss and none was supplied"));
                }
            }

            let entries: Vec<u64> = state.entry_orders().map(|o| o.order_id).collect();
            if !entries.is_empty() {
                let cancelled = self.cancel_orders_best_effort(symbol, &entries).await;
                actions_taken.push(format!("cancelled {} pending entry order(s)", cancelled.len()));
                if cancelled.len() < entries.len() {
                    warnings.push(format!(
                        "{} pending entry order(s) could not be cancelled",
                        entries.len() - cancelled.len()
                    ));
                }
            }
        } else if !state.open_orders.is_empty() {
            match self.api.cancel_all_orders(symbol).await {
                Ok(()) => actions_taken.push(format!(
                    "cancelled {} stale order(s) on flat symbol",
                    state.open_orders.len()
                )),
                Err(err) => {
                    warn!("[exec] {symbol}: stale order cleanup failed: {err}");
                    warnings.push(format!("stale order cleanup failed: {err}"));
                }
            }
        }

        let account_equity = match self.api.account().await {
            Ok(account) => Some(account.equity()),
            Err(err) => {
                warnings.push(format!("account unavailable: {err}"));
                None
            }
        };

        let recommendation = if is_reversing {
            format!(
                "{action:?} will close the existing {} position before entry",
                current.map(|d| d.as_str()).unwrap_or_default()
            )
        } else if warnings.is_empty() {
            format!("environment ready for {action:?}")
        } else {
            format!("review warnings before executing {action:?}")
        };

        let ready = warnings.is_empty();
        info!(
            "[exec] {symbol}: prepared for {action:?} ready={ready} actions={}",
            actions_taken.len()
        );
        Ok(PrepareReport {
            ready,
            symbol: symbol.to_string(),
            status: PrepareStatus {
                has_position: state.has_position(),
                position_side: current,
                position_quantity: state.quantity(),
                account_equity,
                is_reversing,
            },
            actions_taken,
            warnings,
            recommendation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SYMBOL, SimExchange};
    use perp_core::{OrderType, PositionDirection, Side};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn flat_symbol_gets_a_clean_book() {
        let sim = SimExchange::new();
        sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(90), true);
        sim.seed_order(OrderType::Limit, Side::Buy, dec!(1), dec!(95), false);

        let report = sim
            .engine()
            .prepare_environment(SYMBOL, PlannedAction::Long, None, None)
            .await
            .unwrap();
        assert!(report.ready);
        assert!(!report.status.has_position);
        assert_eq!(report.status.account_equity, Some(dec!(10000)));
        assert!(sim.open_order_ids().is_empty());
        assert_eq!(report.actions_taken.len(), 1);
    }

    #[tokio::test]
    async fn reversal_only_clears_entries() {
        let sim = SimExchange::new();
        sim.set_position(dec!(-1), dec!(100));
        let sl = sim.seed_order(OrderType::StopMarket, Side::Buy, dec!(1), dec!(110), true);
        sim.seed_order(OrderType::Limit, Side::Sell, dec!(1), dec!(104), false);

        let report = sim
            .engine()
            .prepare_environment(SYMBOL, PlannedAction::Long, Some(dec!(90)), None)
            .await
            .unwrap();
        assert!(report.status.is_reversing);
        assert_eq!(report.status.position_side, Some(PositionDirection::Short));
        assert_eq!(sim.open_order_ids(), vec![sl]);
    }

    #[tokio::test]
    async fn held_position_without_stop_is_not_ready() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        let report = sim
            .engine()
            .prepare_environment(SYMBOL, PlannedAction::Hold, None, None)
            .await
            .unwrap();
        assert!(!report.ready);
        assert!(report.warnings[0].contains("no stop-loss"));
    }

    #[tokio::test]
    async fn held_position_gets_requested_protection() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        let report = sim
            .engine()
            .prepare_environment(SYMBOL, PlannedAction::Long, Some(dec!(95)), Some(dec!(110)))
            .await
            .unwrap();
        assert!(report.ready, "{:?}", report.warnings);
        assert!(report.actions_taken[0].starts_with("protection updated"));
        assert_eq!(sim.orders().len(), 2);
    }

    #[tokio::test]
    async fn unsafe_stop_is_surfaced_as_warning() {
        let sim = SimExchange::new();
        sim.set_position(dec!(1), dec!(100));
        sim.seed_order(OrderType::StopMarket, Side::Sell, dec!(1), dec!(95), true);
        let report = sim
            .engine()
            .prepare_environment(SYMBOL, PlannedAction::Hold, Some(dec!(90)), None)
            .await
            .unwrap();
        assert!(!report.ready);
        assert!(report.warnings[0].contains("Rejected"));
    }
}
