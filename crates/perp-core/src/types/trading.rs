//! Trading-related data structures: orders, positions, account, filters.
//!
//! These are the normalized shapes the exchange client hands to the engine.
//! All prices and quantities are [`Decimal`] so step/tick arithmetic is exact.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::enums::{
    MarginType, OrderStatus, OrderType, PositionDirection, Side, TimeInForce, WorkingType,
};

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A position snapshot from the exchange.
///
/// The exchange omits zero-quantity positions from listings, so a symbol
/// without a `Position` is flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Net position amount (positive = long, negative = short).
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_profit: Decimal,
    pub liquidation_price: Decimal,
    pub leverage: u32,
    pub margin_type: MarginType,
    pub isolated_margin: Decimal,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.position_amt > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.position_amt < Decimal::ZERO
    }

    pub fn direction(&self) -> Option<PositionDirection> {
        if self.is_long() {
            Some(PositionDirection::Long)
        } else if self.is_short() {
            Some(PositionDirection::Short)
        } else {
            None
        }
    }

    /// Absolute position size.
    pub fn quantity(&self) -> Decimal {
        self.position_amt.abs()
    }

    /// Notional at mark price.
    pub fn notional(&self) -> Decimal {
        self.quantity() * self.mark_price
    }

    /// Unrealized PnL as a percentage of entry notional.
    pub fn pnl_percentage(&self) -> f64 {
        let basis = self.quantity() * self.entry_price;
        if basis.is_zero() {
            return 0.0;
        }
        (self.unrealized_profit / basis * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Absolute distance between mark and liquidation price, in percent of mark.
    pub fn liquidation_distance_pct(&self) -> f64 {
        if self.liquidation_price.is_zero() {
            return 100.0;
        }
        if self.mark_price.is_zero() {
            return 0.0;
        }
        ((self.mark_price - self.liquidation_price).abs() / self.mark_price * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Signed distance towards liquidation: positive while the liquidation
    /// price is on the losing side of mark.
    pub fn directional_liquidation_distance_pct(&self) -> f64 {
        if self.liquidation_price.is_zero() || self.mark_price.is_zero() {
            return 100.0;
        }
        let gap = match self.direction() {
            Some(PositionDirection::Long) => self.mark_price - self.liquidation_price,
            Some(PositionDirection::Short) => self.liquidation_price - self.mark_price,
            None => return 100.0,
        };
        (gap / self.mark_price * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// An open or queried order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    /// Trigger price for STOP_MARKET / TAKE_PROFIT_MARKET (zero otherwise).
    pub stop_price: Decimal,
    pub reduce_only: bool,
    pub update_time: u64,
}

impl Order {
    /// Reduce-only STOP_MARKET, a stop-loss leg.
    pub fn is_stop_loss(&self) -> bool {
        self.reduce_only && self.order_type == OrderType::StopMarket
    }

    /// Reduce-only TAKE_PROFIT_MARKET, a take-profit leg.
    pub fn is_take_profit(&self) -> bool {
        self.reduce_only && self.order_type == OrderType::TakeProfitMarket
    }
}

/// An order placement request.
///
/// Prices and quantities are given unrounded; the client quantizes them
/// against the symbol's filters before transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub reduce_only: bool,
    pub time_in_force: Option<TimeInForce>,
    pub working_type: Option<WorkingType>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    fn base(symbol: &str, side: Side, order_type: OrderType, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type,
            quantity: Some(quantity),
            price: None,
            stop_price: None,
            reduce_only: false,
            time_in_force: None,
            working_type: None,
            client_order_id: None,
        }
    }

    pub fn market(symbol: &str, side: Side, quantity: Decimal) -> Self {
        Self::base(symbol, side, OrderType::Market, quantity)
    }

    pub fn limit(symbol: &str, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            price: Some(price),
            time_in_force: Some(TimeInForce::Gtc),
            ..Self::base(symbol, side, OrderType::Limit, quantity)
        }
    }

    /// Reduce-only stop-loss triggered by `working_type`.
    pub fn stop_loss(
        symbol: &str,
        side: Side,
        quantity: Decimal,
        trigger: Decimal,
        working_type: WorkingType,
    ) -> Self {
        Self {
            stop_price: Some(trigger),
            reduce_only: true,
            working_type: Some(working_type),
            ..Self::base(symbol, side, OrderType::StopMarket, quantity)
        }
    }

    /// Reduce-only take-profit triggered by `working_type`.
    pub fn take_profit(
        symbol: &str,
        side: Side,
        quantity: Decimal,
        trigger: Decimal,
        working_type: WorkingType,
    ) -> Self {
        Self {
            stop_price: Some(trigger),
            reduce_only: true,
            working_type: Some(working_type),
            ..Self::base(symbol, side, OrderType::TakeProfitMarket, quantity)
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Futures account metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub total_wallet_balance: Decimal,
    pub total_unrealized_profit: Decimal,
    pub total_margin_balance: Decimal,
    pub total_position_initial_margin: Decimal,
    pub total_open_order_initial_margin: Decimal,
    pub available_balance: Decimal,
    pub max_withdraw_amount: Decimal,
    pub update_time: u64,
}

impl Account {
    pub fn equity(&self) -> Decimal {
        self.total_wallet_balance + self.total_unrealized_profit
    }

    /// Initial margin locked by positions and open orders.
    pub fn margin_used(&self) -> Decimal {
        self.total_position_initial_margin + self.total_open_order_initial_margin
    }

    /// `margin_used / margin_balance`, zero for an empty account.
    pub fn margin_ratio(&self) -> Decimal {
        if self.total_margin_balance.is_zero() {
            return Decimal::ZERO;
        }
        self.margin_used() / self.total_margin_balance
    }
}

// ---------------------------------------------------------------------------
// Exchange metadata
// ---------------------------------------------------------------------------

/// Trading rules for one symbol, fetched from exchange info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub symbol: String,
    pub tick_size: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub min_notional: Decimal,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub max_num_orders: Option<u32>,
    pub multiplier_up: Option<Decimal>,
    pub multiplier_down: Option<Decimal>,
    pub contract_type: String,
    pub contract_status: String,
}

/// One tier of a symbol's leverage bracket table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageBracket {
    pub bracket: u32,
    pub initial_leverage: u32,
    pub notional_cap: Decimal,
    pub notional_floor: Decimal,
    pub maint_margin_ratio: Decimal,
}

/// Exchange acknowledgement of a leverage change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageAck {
    pub symbol: String,
    pub leverage: u32,
    pub max_notional_value: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(amt: Decimal, entry: Decimal, mark: Decimal, liq: Decimal) -> Position {
        Position {
            symbol: "BTCUSDT".into(),
            position_amt: amt,
            entry_price: entry,
            mark_price: mark,
            unrealized_profit: (mark - entry) * amt,
            liquidation_price: liq,
            leverage: 10,
            margin_type: MarginType::Crossed,
            isolated_margin: Decimal::ZERO,
        }
    }

    #[test]
    fn derived_position_metrics() {
        let p = position(dec!(-2), dec!(100), dec!(90), dec!(108));
        assert!(p.is_short());
        assert_eq!(p.quantity(), dec!(2));
        // (90 - 100) * -2 = 20 profit on 200 basis
        assert!((p.pnl_percentage() - 10.0).abs() < 1e-9);
        assert!((p.liquidation_distance_pct() - 20.0).abs() < 1e-9);
        assert!((p.directional_liquidation_distance_pct() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn flat_position_has_no_direction() {
        let p = position(Decimal::ZERO, dec!(100), dec!(100), Decimal::ZERO);
        assert_eq!(p.direction(), None);
        assert_eq!(p.pnl_percentage(), 0.0);
    }

    #[test]
    fn account_margin_ratio() {
        let acct = Account {
            total_wallet_balance: dec!(1000),
            total_unrealized_profit: dec!(-50),
            total_margin_balance: dec!(950),
            total_position_initial_margin: dec!(380),
            total_open_order_initial_margin: dec!(0),
            available_balance: dec!(570),
            max_withdraw_amount: dec!(570),
            update_time: 0,
        };
        assert_eq!(acct.equity(), dec!(950));
        assert_eq!(acct.margin_ratio(), dec!(0.4));
    }

    #[test]
    fn protective_request_builders_are_reduce_only() {
        let sl = OrderRequest::stop_loss("BTCUSDT", Side::Sell, dec!(1), dec!(95), WorkingType::MarkPrice);
        assert!(sl.reduce_only);
        assert_eq!(sl.order_type, OrderType::StopMarket);
        let entry = OrderRequest::limit("BTCUSDT", Side::Buy, dec!(1), dec!(100));
        assert!(!entry.reduce_only);
        assert_eq!(entry.time_in_force, Some(TimeInForce::Gtc));
    }
}
