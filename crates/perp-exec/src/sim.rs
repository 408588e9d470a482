//! In-memory exchange for engine tests.
//!
//! One symbol (`BTCUSDT`), one-way position mode. Market orders fill at mark
//! immediately; reduce-only fills are capped at the open position. Limit and
//! trigger orders rest until cancelled. Every mutating call is appended to a
//! call log so tests can assert ordering.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use perp_core::{
    Account, LeverageAck, MarginType, MarkPrice, Order, OrderRequest, OrderStatus, OrderType,
    PerpError, Position, Result, Side, SymbolFilters,
};
use perp_td::FuturesApi;
use perp_td::precision::floor_to_step;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{Engine, ExecutionConfig, ProtectionPolicy};

pub const SYMBOL: &str = "BTCUSDT";

struct SimState {
    filters: SymbolFilters,
    mark: Decimal,
    position_amt: Decimal,
    entry_price: Decimal,
    leverage: u32,
    wallet: Decimal,
    available: Decimal,
    orders: Vec<Order>,
    next_id: u64,
    fail_protective: bool,
    margin_error_code: Option<i64>,
    calls: Vec<String>,
}

#[derive(Clone)]
pub struct SimExchange {
    state: Arc<Mutex<SimState>>,
}

impl SimExchange {
    pub fn new() -> Self {
        let filters = SymbolFilters {
            symbol: SYMBOL.into(),
            tick_size: dec!(0.1),
            min_price: dec!(0.1),
            max_price: dec!(1000000),
            step_size: dec!(0.001),
            min_qty: dec!(0.001),
            max_qty: dec!(1000),
            min_notional: dec!(5),
            price_precision: 1,
            quantity_precision: 3,
            max_num_orders: Some(200),
            multiplier_up: None,
            multiplier_down: None,
            contract_type: "PERPETUAL".into(),
            contract_status: "TRADING".into(),
        };
        Self {
            state: Arc::new(Mutex::new(SimState {
                filters,
                mark: dec!(100),
                position_amt: Decimal::ZERO,
                entry_price: Decimal::ZERO,
                leverage: 10,
                wallet: dec!(10000),
                available: dec!(10000),
                orders: Vec::new(),
                next_id: 1,
                fail_protective: false,
                margin_error_code: None,
                calls: Vec::new(),
            })),
        }
    }

    /// Engine over this exchange with all settle delays disabled.
    pub fn engine(&self) -> Engine {
        self.engine_with(ExecutionConfig {
            settle_delay_ms: 0,
            close_settle_ms: 0,
            protection_retry_delay_ms: 0,
            ..ExecutionConfig::default()
        })
    }

    pub fn engine_with(&self, config: ExecutionConfig) -> Engine {
        Engine::new(Arc::new(self.clone()), ProtectionPolicy::default(), config)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    // -- setup --

    pub fn set_position(&self, amt: Decimal, entry: Decimal) {
        let mut s = self.lock();
        s.position_amt = amt;
        s.entry_price = entry;
    }

    pub fn set_mark(&self, mark: Decimal) {
        self.lock().mark = mark;
    }

    pub fn set_available(&self, available: Decimal) {
        self.lock().available = available;
    }

    pub fn set_min_notional(&self, min_notional: Decimal) {
        self.lock().filters.min_notional = min_notional;
    }

    pub fn set_fail_protective(&self, fail: bool) {
        self.lock().fail_protective = fail;
    }

    pub fn set_margin_error(&self, code: Option<i64>) {
        self.lock().margin_error_code = code;
    }

    /// Put a resting order on the book and return its ID.
    pub fn seed_order(
        &self,
        order_type: OrderType,
        side: Side,
        quantity: Decimal,
        stop_price: Decimal,
        reduce_only: bool,
    ) -> u64 {
        let mut s = self.lock();
        let id = s.next_id;
        s.next_id += 1;
        let price = if order_type == OrderType::Limit { stop_price } else { Decimal::ZERO };
        let stop = if order_type.is_protective() { stop_price } else { Decimal::ZERO };
        s.orders.push(Order {
            order_id: id,
            client_order_id: format!("seed_{id}"),
            symbol: SYMBOL.into(),
            side,
            order_type,
            status: OrderStatus::New,
            price,
            quantity,
            filled_quantity: Decimal::ZERO,
            stop_price: stop,
            reduce_only,
            update_time: 0,
        });
        id
    }

    // -- inspection --

    pub fn open_order_ids(&self) -> Vec<u64> {
        self.lock().orders.iter().map(|o| o.order_id).collect()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders.clone()
    }

    pub fn position_amt(&self) -> Decimal {
        self.lock().position_amt
    }

    pub fn leverage(&self) -> u32 {
        self.lock().leverage
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Index of the first logged call starting with `prefix`.
    pub fn call_index(&self, prefix: &str) -> Option<usize> {
        self.lock().calls.iter().position(|c| c.starts_with(prefix))
    }
}

fn api_error(endpoint: &str, code: i64, msg: &str) -> PerpError {
    PerpError::Api {
        endpoint: endpoint.into(),
        status: 400,
        code: Some(code),
        msg: msg.into(),
    }
}

#[async_trait]
impl FuturesApi for SimExchange {
    async fn account(&self) -> Result<Account> {
        let s = self.lock();
        let position_margin = s.position_amt.abs() * s.mark / Decimal::from(s.leverage.max(1));
        Ok(Account {
            total_wallet_balance: s.wallet,
            total_unrealized_profit: (s.mark - s.entry_price) * s.position_amt,
            total_margin_balance: s.wallet,
            total_position_initial_margin: position_margin,
            total_open_order_initial_margin: Decimal::ZERO,
            available_balance: s.available,
            max_withdraw_amount: s.available,
            update_time: 0,
        })
    }

    async fn positions(&self, _symbol: Option<&str>) -> Result<Vec<Position>> {
        let s = self.lock();
        if s.position_amt.is_zero() {
            return Ok(Vec::new());
        }
        Ok(vec![Position {
            symbol: SYMBOL.into(),
            position_amt: s.position_amt,
            entry_price: s.entry_price,
            mark_price: s.mark,
            unrealized_profit: (s.mark - s.entry_price) * s.position_amt,
            liquidation_price: Decimal::ZERO,
            leverage: s.leverage,
            margin_type: MarginType::Crossed,
            isolated_margin: Decimal::ZERO,
        }])
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<Order>> {
        Ok(self.lock().orders.clone())
    }

    async fn get_order(&self, _symbol: &str, order_id: u64) -> Result<Order> {
        self.lock()
            .orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
            .ok_or_else(|| api_error("/fapi/v1/order", -2013, "Order does not exist."))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let mut s = self.lock();
        s.calls.push(format!(
            "place {} {}{}",
            request.order_type.as_str(),
            request.side,
            if request.reduce_only { " reduce_only" } else { "" }
        ));

        let quantity = floor_to_step(request.quantity.unwrap_or_default(), s.filters.step_size);
        if quantity <= Decimal::ZERO {
            return Err(api_error("/fapi/v1/order", -4003, "Quantity less than or equal to zero."));
        }
        if request.order_type.is_protective() && s.fail_protective {
            return Err(api_error("/fapi/v1/order", -2021, "Order would immediately trigger."));
        }

        let id = s.next_id;
        s.next_id += 1;
        let mut order = Order {
            order_id: id,
            client_order_id: request.client_order_id.clone().unwrap_or_default(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status: OrderStatus::New,
            price: request.price.unwrap_or_default(),
            quantity,
            filled_quantity: Decimal::ZERO,
            stop_price: request.stop_price.unwrap_or_default(),
            reduce_only: request.reduce_only,
            update_time: 0,
        };

        if request.order_type != OrderType::Market {
            s.orders.push(order.clone());
            return Ok(order);
        }

        let signed = |q: Decimal| if request.side == Side::Buy { q } else { -q };
        let fill = if request.reduce_only {
            let closes = match request.side {
                Side::Buy => s.position_amt < Decimal::ZERO,
                Side::Sell => s.position_amt > Decimal::ZERO,
            };
            if !closes {
                return Err(api_error("/fapi/v1/order", -2022, "ReduceOnly Order is rejected."));
            }
            quantity.min(s.position_amt.abs())
        } else {
            quantity
        };

        let before = s.position_amt;
        let after = before + signed(fill);
        s.entry_price = if after.is_zero() {
            Decimal::ZERO
        } else if before.is_zero() || before.is_sign_positive() != after.is_sign_positive() {
            s.mark
        } else if after.abs() > before.abs() {
            (before.abs() * s.entry_price + fill * s.mark) / after.abs()
        } else {
            s.entry_price
        };
        s.position_amt = after;

        order.status = OrderStatus::Filled;
        order.filled_quantity = fill;
        order.price = s.mark;
        Ok(order)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<Order> {
        let mut s = self.lock();
        s.calls.push(format!("cancel {order_id}"));
        let idx = s
            .orders
            .iter()
            .position(|o| o.order_id == order_id)
            .ok_or_else(|| api_error("/fapi/v1/order", -2011, "Unknown order sent."))?;
        let mut order = s.orders.remove(idx);
        order.status = OrderStatus::Canceled;
        Ok(order)
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> Result<()> {
        let mut s = self.lock();
        s.calls.push("cancel_all".into());
        s.orders.clear();
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<LeverageAck> {
        let mut s = self.lock();
        s.calls.push(format!("leverage {leverage}"));
        s.leverage = leverage;
        Ok(LeverageAck {
            symbol: symbol.to_string(),
            leverage,
            max_notional_value: Some(dec!(1000000)),
        })
    }

    async fn set_margin_type(&self, _symbol: &str, margin_type: MarginType) -> Result<()> {
        let mut s = self.lock();
        s.calls.push(format!("margin {}", margin_type.as_str()));
        match s.margin_error_code {
            Some(code) => Err(api_error("/fapi/v1/marginType", code, "margin type change rejected")),
            None => Ok(()),
        }
    }

    async fn symbol_filters(&self, symbol: &str, _force_refresh: bool) -> Result<SymbolFilters> {
        let s = self.lock();
        if symbol != SYMBOL {
            return Err(PerpError::SymbolNotFound(symbol.to_string()));
        }
        Ok(s.filters.clone())
    }

    async fn mark_price(&self, symbol: &str) -> Result<MarkPrice> {
        let s = self.lock();
        Ok(MarkPrice {
            symbol: symbol.to_string(),
            mark_price: s.mark,
            index_price: s.mark,
            funding_rate: dec!(0.0001),
            next_funding_time: 0,
        })
    }
}
