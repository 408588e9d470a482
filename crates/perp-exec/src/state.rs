//! Position State Reader.
//!
//! [`PositionState`] is a per-symbol snapshot built from one positions read
//! and one open-orders read. It is never cached: every engine operation takes
//! a fresh snapshot, and reads after an order must tolerate the exchange
//! lagging behind.

use perp_core::{Order, Position, PositionDirection, Result};
use rust_decimal::Decimal;

use crate::report::{
    AccountReport, AccountSummary, MarginStatus, OrdersReport, PositionSummary, RiskLevel,
    StatusReport,
};
use crate::Engine;

/// Normalized view of one symbol's position and working orders.
#[derive(Debug, Clone)]
pub struct PositionState {
    pub symbol: String,
    /// `None` when the exchange lists no position (flat).
    pub position: Option<Position>,
    pub open_orders: Vec<Order>,
}

impl PositionState {
    pub fn new(symbol: &str, positions: Vec<Position>, open_orders: Vec<Order>) -> Self {
        let position = positions
            .into_iter()
            .find(|p| p.symbol == symbol && !p.position_amt.is_zero());
        Self {
            symbol: symbol.to_string(),
            position,
            open_orders,
        }
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn direction(&self) -> Option<PositionDirection> {
        self.position.as_ref().and_then(Position::direction)
    }

    /// Absolute position size, zero when flat.
    pub fn quantity(&self) -> Decimal {
        self.position
            .as_ref()
            .map(Position::quantity)
            .unwrap_or_default()
    }

    pub fn entry_price(&self) -> Option<Decimal> {
        self.position.as_ref().map(|p| p.entry_price)
    }

    pub fn mark_price(&self) -> Option<Decimal> {
        self.position.as_ref().map(|p| p.mark_price)
    }

    pub fn unrealized_profit(&self) -> Option<Decimal> {
        self.position.as_ref().map(|p| p.unrealized_profit)
    }

    /// Reduce-only orders: the protective class.
    pub fn protective_orders(&self) -> impl Iterator<Item = &Order> {
        self.open_orders.iter().filter(|o| o.reduce_only)
    }

    /// Non-reduce-only orders: pending entries.
    pub fn entry_orders(&self) -> impl Iterator<Item = &Order> {
        self.open_orders.iter().filter(|o| !o.reduce_only)
    }

    /// The active stop-loss. With several on the book, the last one listed wins.
    pub fn stop_loss(&self) -> Option<&Order> {
        self.open_orders
            .iter()
            .rev()
            .find(|o| o.is_stop_loss() && o.stop_price > Decimal::ZERO)
    }

    /// The active take-profit, same selection rule as [`stop_loss`](Self::stop_loss).
    pub fn take_profit(&self) -> Option<&Order> {
        self.open_orders
            .iter()
            .rev()
            .find(|o| o.is_take_profit() && o.stop_price > Decimal::ZERO)
    }

    pub fn stop_loss_price(&self) -> Option<Decimal> {
        self.stop_loss().map(|o| o.stop_price)
    }

    pub fn take_profit_price(&self) -> Option<Decimal> {
        self.take_profit().map(|o| o.stop_price)
    }
}

/// Margin usage bucket: above 80% is critical, above 60% a warning.
pub fn margin_status(margin_ratio_pct: f64) -> MarginStatus {
    if margin_ratio_pct > 80.0 {
        MarginStatus::Critical
    } else if margin_ratio_pct > 60.0 {
        MarginStatus::Warning
    } else {
        MarginStatus::Healthy
    }
}

/// Risk bucket from the directional distance to liquidation, in percent.
pub fn risk_level(liquidation_distance_pct: f64) -> RiskLevel {
    if liquidation_distance_pct < 5.0 {
        RiskLevel::Critical
    } else if liquidation_distance_pct < 10.0 {
        RiskLevel::High
    } else if liquidation_distance_pct < 20.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

impl Engine {
    /// Fresh snapshot of `symbol`'s position and open orders.
    pub async fn position_state(&self, symbol: &str) -> Result<PositionState> {
        let positions = self.api.positions(Some(symbol)).await?;
        let orders = self.api.open_orders(symbol).await?;
        Ok(PositionState::new(symbol, positions, orders))
    }

    /// Account summary plus every open position, or only `symbol`'s.
    pub async fn get_account_info(&self, symbol: Option<&str>) -> Result<AccountReport> {
        let account = self.api.account().await?;
        let positions = self.api.positions(symbol).await?;
        Ok(AccountReport {
            success: true,
            account: AccountSummary::from_account(&account),
            positions: positions
                .iter()
                .filter(|p| !p.position_amt.is_zero())
                .map(PositionSummary::from_position)
                .collect(),
        })
    }

    pub async fn get_position(&self, symbol: &str) -> Result<PositionSummary> {
        let positions = self.api.positions(Some(symbol)).await?;
        let summary = positions
            .iter()
            .find(|p| p.symbol == symbol && !p.position_amt.is_zero())
            .map(PositionSummary::from_position)
            .unwrap_or_else(|| PositionSummary::flat(symbol));
        Ok(summary)
    }

    pub async fn get_open_orders(&self, symbol: &str) -> Result<OrdersReport> {
        let orders = self.api.open_orders(symbol).await?;
        Ok(orders_report(&PositionState::new(symbol, Vec::new(), orders)))
    }

    /// Account, position and orders for one symbol in a single report.
    pub async fn get_status(&self, symbol: &str) -> Result<StatusReport> {
        let account = self.api.account().await?;
        let state = self.position_state(symbol).await?;
        let position = state
            .position
            .as_ref()
            .map(PositionSummary::from_position)
            .unwrap_or_else(|| PositionSummary::flat(symbol));
        Ok(StatusReport {
            success: true,
            symbol: symbol.to_string(),
            account: AccountSummary::from_account(&account),
            position,
            orders: orders_report(&state),
        })
    }
}

fn orders_report(state: &PositionState) -> OrdersReport {
    OrdersReport {
        success: true,
        symbol: state.symbol.clone(),
        count: state.open_orders.len(),
        stop_loss_price: state.stop_loss_price(),
        take_profit_price: state.take_profit_price(),
        orders: state.open_orders.clone(),
    }
}
