//! Structured results returned to the calling agent.
//!
//! Every report serializes to a flat JSON object with a `success` flag plus
//! action-specific fields. Human-readable notes about automatic corrections go
//! into `adjustments`; anything the caller should look at goes into `warnings`.

use perp_core::{
    Account, ErrorKind, MarginType, Order, PerpError, Position, PositionDirection,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::json;

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct OpenReport {
    pub success: bool,
    /// `OPEN_LONG` or `OPEN_SHORT`.
    pub action: String,
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    /// `MARKET` or `LIMIT`.
    pub order_type: String,
    pub new_order_quantity: Decimal,
    pub total_position_quantity: Decimal,
    pub entry_price: Option<Decimal>,
    pub leverage: u32,
    pub new_order_notional: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_order_id: Option<u64>,
    pub take_profit_order_id: Option<u64>,
    pub had_previous_position: bool,
    pub previous_direction: Option<PositionDirection>,
    pub adjustments: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseReport {
    pub success: bool,
    pub symbol: String,
    pub percent: Decimal,
    pub closed_quantity: Decimal,
    pub order_id: Option<u64>,
    pub client_order_id: Option<String>,
    pub cancelled_orders: Vec<u64>,
    pub message: String,
    pub warnings: Vec<String>,
}

/// Outcome of re-sizing protective orders after a reduction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResyncOutcome {
    pub adjusted: bool,
    pub old_quantity: Decimal,
    pub new_quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub cancelled_orders: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReduceReport {
    pub success: bool,
    pub symbol: String,
    pub reduce_pct: Decimal,
    pub reduce_qty: Decimal,
    pub remaining_quantity: Decimal,
    pub order_id: u64,
    pub client_order_id: String,
    pub protection_resync: Option<ResyncOutcome>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Protection
// ---------------------------------------------------------------------------

/// Result tag of a protective-order update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionAction {
    Updated,
    Skipped,
    /// The request would have increased risk.
    Rejected,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtectionOutcome {
    pub success: bool,
    pub symbol: String,
    pub action: ProtectionAction,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_order_id: Option<u64>,
    pub take_profit_order_id: Option<u64>,
    pub cancelled_orders: Vec<u64>,
}

impl ProtectionOutcome {
    pub(crate) fn new(symbol: &str, action: ProtectionAction, reason: impl Into<String>) -> Self {
        Self {
            success: matches!(action, ProtectionAction::Updated | ProtectionAction::Skipped),
            symbol: symbol.to_string(),
            action,
            reason: reason.into(),
            details: Vec::new(),
            stop_loss_price: None,
            take_profit_price: None,
            stop_loss_order_id: None,
            take_profit_order_id: None,
            cancelled_orders: Vec::new(),
        }
    }

    pub(crate) fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Rejected and errored updates both leave the request unapplied.
    pub fn is_failure(&self) -> bool {
        matches!(self.action, ProtectionAction::Rejected | ProtectionAction::Error)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub total_wallet_balance: Decimal,
    pub total_unrealized_profit: Decimal,
    pub total_margin_balance: Decimal,
    pub available_balance: Decimal,
    pub equity: Decimal,
    pub margin_used: Decimal,
    pub margin_ratio_pct: f64,
    pub margin_status: MarginStatus,
}

impl AccountSummary {
    pub fn from_account(account: &Account) -> Self {
        let margin_ratio_pct = (account.margin_ratio() * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0);
        Self {
            total_wallet_balance: account.total_wallet_balance,
            total_unrealized_profit: account.total_unrealized_profit,
            total_margin_balance: account.total_margin_balance,
            available_balance: account.available_balance,
            equity: account.equity(),
            margin_used: account.margin_used(),
            margin_ratio_pct,
            margin_status: crate::state::margin_status(margin_ratio_pct),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub position_exists: bool,
    pub direction: Option<PositionDirection>,
    pub quantity: Decimal,
    pub position_amt: Decimal,
    pub entry_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub unrealized_profit: Option<Decimal>,
    pub notional: Option<Decimal>,
    pub leverage: Option<u32>,
    pub margin_type: Option<MarginType>,
    pub liquidation_price: Option<Decimal>,
    pub pnl_percentage: Option<f64>,
    pub liquidation_distance_pct: Option<f64>,
    pub risk_level: Option<RiskLevel>,
}

impl PositionSummary {
    pub fn flat(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            position_exists: false,
            direction: None,
            quantity: Decimal::ZERO,
            position_amt: Decimal::ZERO,
            entry_price: None,
            mark_price: None,
            unrealized_profit: None,
            notional: None,
            leverage: None,
            margin_type: None,
            liquidation_price: None,
            pnl_percentage: None,
            liquidation_distance_pct: None,
            risk_level: None,
        }
    }

    pub fn from_position(position: &Position) -> Self {
        if position.position_amt.is_zero() {
            return Self::flat(&position.symbol);
        }
        Self {
            symbol: position.symbol.clone(),
            position_exists: true,
            direction: position.direction(),
            quantity: position.quantity(),
            position_amt: position.position_amt,
            entry_price: Some(position.entry_price),
            mark_price: Some(position.mark_price),
            unrealized_profit: Some(position.unrealized_profit),
            notional: Some(position.notional()),
            leverage: Some(position.leverage),
            margin_type: Some(position.margin_type),
            liquidation_price: Some(position.liquidation_price),
            pnl_percentage: Some(position.pnl_percentage()),
            liquidation_distance_pct: Some(position.liquidation_distance_pct()),
            risk_level: Some(crate::state::risk_level(
                position.directional_liquidation_distance_pct(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrdersReport {
    pub success: bool,
    pub symbol: String,
    pub count: usize,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
    pub success: bool,
    pub account: AccountSummary,
    pub positions: Vec<PositionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub success: bool,
    pub symbol: String,
    pub account: AccountSummary,
    pub position: PositionSummary,
    pub orders: OrdersReport,
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PrepareStatus {
    pub has_position: bool,
    pub position_side: Option<PositionDirection>,
    pub position_quantity: Decimal,
    pub account_equity: Option<Decimal>,
    pub is_reversing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareReport {
    pub ready: bool,
    pub symbol: String,
    pub status: PrepareStatus,
    pub actions_taken: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendation: String,
}

// ---------------------------------------------------------------------------
// Account settings / cancellation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LeverageReport {
    pub success: bool,
    pub symbol: String,
    pub leverage: u32,
    pub max_notional_value: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarginModeReport {
    pub success: bool,
    pub symbol: String,
    pub requested_margin_type: MarginType,
    /// Margin type in effect after the call.
    pub margin_type: MarginType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelReport {
    pub success: bool,
    pub symbol: String,
    pub cancelled_orders: Vec<u64>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Plan dispatch
// ---------------------------------------------------------------------------

/// Result of [`Engine::execute_plan`](crate::Engine::execute_plan).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PlanOutcome {
    Opened(OpenReport),
    Closed(CloseReport),
    Reduced(ReduceReport),
    Protection(ProtectionOutcome),
    Held { success: bool, symbol: String, message: String },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure rendered for the calling agent: a stable type tag, the coarse
/// class it should act on, and variant-specific detail.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub success: bool,
    pub error_type: &'static str,
    pub kind: ErrorKind,
    pub message: String,
    pub details: serde_json::Value,
}

impl From<&PerpError> for ErrorReport {
    fn from(err: &PerpError) -> Self {
        let details = match err {
            PerpError::Validation { reasons } => json!({ "reasons": reasons }),
            PerpError::InsufficientBalance {
                required_notional,
                available,
                min_leverage,
            } => json!({
                "required_notional": required_notional,
                "available": available,
                "min_leverage": min_leverage,
            }),
            PerpError::Api {
                endpoint,
                status,
                code,
                msg,
            } => json!({
                "endpoint": endpoint,
                "status": status,
                "code": code,
                "msg": msg,
            }),
            PerpError::RateLimited {
                endpoint,
                retry_after_ms,
            } => json!({ "endpoint": endpoint, "retry_after_ms": retry_after_ms }),
            _ => serde_json::Value::Null,
        };
        Self {
            success: false,
            error_type: err.type_tag(),
            kind: err.kind(),
            message: err.to_string(),
            details,
        }
    }
}
