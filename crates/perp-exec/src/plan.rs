//! Dispatch of an upstream trading plan.
//!
//! A plan names one action and the inputs it needs. Missing inputs abort the
//! cycle with [`PerpError::Upstream`] before any exchange call.

use perp_core::{PerpError, PlannedAction, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Engine;
use crate::report::PlanOutcome;
use crate::transition::OpenRequest;

/// Structured decision handed over by the portfolio layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPlan {
    pub symbol: String,
    pub action: PlannedAction,
    #[serde(default)]
    pub position_size_usd: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub reduce_pct: Option<Decimal>,
}

impl TradingPlan {
    /// Check that every input the action needs is present.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(PerpError::Upstream("plan has no symbol".into()));
        }
        let mut missing = Vec::new();
        match self.action {
            PlannedAction::Long | PlannedAction::Short => {
                if !self.position_size_usd.is_some_and(|s| s > Decimal::ZERO) {
                    missing.push("position_size_usd");
                }
                if !self.leverage.is_some_and(|l| l > 0) {
                    missing.push("leverage");
                }
            }
            PlannedAction::Reduce => {
                if self.reduce_pct.is_none() {
                    missing.push("reduce_pct");
                }
            }
            PlannedAction::Hold | PlannedAction::Exit => {}
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PerpError::Upstream(format!(
                "{:?} plan for {} is missing {}",
                self.action,
                self.symbol,
                missing.join(", ")
            )))
        }
    }
}

impl Engine {
    /// Validate `plan` and run the transition it names.
    ///
    /// HOLD with stop-loss / take-profit prices updates protection on an open
    /// position; otherwise it changes nothing.
    pub async fn execute_plan(&self, plan: &TradingPlan) -> Result<PlanOutcome> {
        plan.validate()?;
        let symbol = plan.symbol.as_str();
        info!("[exec] {symbol}: executing {:?} plan", plan.action);

        match plan.action {
            PlannedAction::Long | PlannedAction::Short => {
                let (Some(direction), Some(notional_usd), Some(leverage)) =
                    (plan.action.direction(), plan.position_size_usd, plan.leverage)
                else {
                    return Err(PerpError::Upstream(format!("incomplete {:?} plan", plan.action)));
                };
                let request = OpenRequest {
                    symbol: plan.symbol.clone(),
                    direction,
                    notional_usd,
                    leverage,
                    entry_price: plan.entry_price,
                    stop_loss: plan.stop_loss,
                    take_profit: plan.take_profit,
                };
                Ok(PlanOutcome::Opened(self.open(&request).await?))
            }
            PlannedAction::Exit => Ok(PlanOutcome::Closed(
                self.close(symbol, Decimal::ONE_HUNDRED).await?,
            )),
            PlannedAction::Reduce => {
                let percent = plan
                    .reduce_pct
                    .ok_or_else(|| PerpError::Upstream("REDUCE plan is missing reduce_pct".into()))?;
                Ok(PlanOutcome::Reduced(self.reduce(symbol, percent).await?))
            }
            PlannedAction::Hold => {
                if plan.stop_loss.is_some() || plan.take_profit.is_some() {
                    let state = self.position_state(symbol).await?;
                    if state.has_position() {
                        let outcome = self
                            .safe_update(&state, plan.stop_loss, plan.take_profit)
                            .await?;
                        return Ok(PlanOutcome::Protection(outcome));
                    }
                }
                Ok(PlanOutcome::Held {
                    success: true,
                    symbol: plan.symbol.clone(),
                    message: "holding, no changes".into(),
                })
            }
        }
    }
}
