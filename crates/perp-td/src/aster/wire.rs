//! Raw REST response shapes and their conversion into `perp_core` types.
//!
//! Numeric fields arrive as JSON strings (`"0.001"`) or numbers depending on
//! the endpoint; `Decimal`'s deserializer accepts both.

use perp_core::{
    Account, Depth, FundingRate, Kline, LeverageAck, LeverageBracket, Level, MarginType,
    MarkPrice, OpenInterest, Order, OrderStatus, OrderType, PerpError, Position, Result, Side,
    SymbolFilters, Ticker24hr,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Errors and time
// ---------------------------------------------------------------------------

/// Error body: `{"code": -2019, "msg": "Margin is insufficient."}`.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}

// ---------------------------------------------------------------------------
// Account / positions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    total_wallet_balance: Decimal,
    total_unrealized_profit: Decimal,
    total_margin_balance: Decimal,
    total_position_initial_margin: Decimal,
    total_open_order_initial_margin: Decimal,
    available_balance: Decimal,
    max_withdraw_amount: Decimal,
    #[serde(default)]
    update_time: u64,
}

impl From<RawAccount> for Account {
    fn from(raw: RawAccount) -> Self {
        Self {
            total_wallet_balance: raw.total_wallet_balance,
            total_unrealized_profit: raw.total_unrealized_profit,
            total_margin_balance: raw.total_margin_balance,
            total_position_initial_margin: raw.total_position_initial_margin,
            total_open_order_initial_margin: raw.total_open_order_initial_margin,
            available_balance: raw.available_balance,
            max_withdraw_amount: raw.max_withdraw_amount,
            update_time: raw.update_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    symbol: String,
    position_amt: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
    #[serde(rename = "unRealizedProfit")]
    unrealized_profit: Decimal,
    liquidation_price: Decimal,
    leverage: Decimal,
    margin_type: String,
    #[serde(default)]
    isolated_margin: Decimal,
}

impl RawPosition {
    pub fn is_flat(&self) -> bool {
        self.position_amt.is_zero()
    }
}

impl TryFrom<RawPosition> for Position {
    type Error = PerpError;

    fn try_from(raw: RawPosition) -> Result<Self> {
        let margin_type = MarginType::parse(&raw.margin_type).ok_or_else(|| {
            PerpError::Parse(format!("unknown marginType {:?} for {}", raw.margin_type, raw.symbol))
        })?;
        let leverage = raw.leverage.to_u32().ok_or_else(|| {
            PerpError::Parse(format!("leverage {} out of range for {}", raw.leverage, raw.symbol))
        })?;
        Ok(Self {
            symbol: raw.symbol,
            position_amt: raw.position_amt,
            entry_price: raw.entry_price,
            mark_price: raw.mark_price,
            unrealized_profit: raw.unrealized_profit,
            liquidation_price: raw.liquidation_price,
            leverage,
            margin_type,
            isolated_margin: raw.isolated_margin,
        })
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    order_id: u64,
    #[serde(default)]
    client_order_id: String,
    symbol: String,
    side: Side,
    #[serde(rename = "type")]
    order_type: OrderType,
    status: OrderStatus,
    #[serde(default)]
    price: Decimal,
    #[serde(default)]
    orig_qty: Decimal,
    #[serde(default)]
    executed_qty: Decimal,
    #[serde(default)]
    stop_price: Decimal,
    #[serde(default)]
    reduce_only: bool,
    #[serde(default, alias = "time")]
    update_time: u64,
}

impl From<RawOrder> for Order {
    fn from(raw: RawOrder) -> Self {
        Self {
            order_id: raw.order_id,
            client_order_id: raw.client_order_id,
            symbol: raw.symbol,
            side: raw.side,
            order_type: raw.order_type,
            status: raw.status,
            price: raw.price,
            quantity: raw.orig_qty,
            filled_quantity: raw.executed_qty,
            stop_price: raw.stop_price,
            reduce_only: raw.reduce_only,
            update_time: raw.update_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLeverageAck {
    symbol: String,
    leverage: u32,
    #[serde(default)]
    max_notional_value: Option<String>,
}

impl From<RawLeverageAck> for LeverageAck {
    fn from(raw: RawLeverageAck) -> Self {
        Self {
            symbol: raw.symbol,
            leverage: raw.leverage,
            // "INF" and other non-numeric caps mean "no cap".
            max_notional_value: raw.max_notional_value.and_then(|v| v.parse().ok()),
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange info
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RawExchangeInfo {
    #[serde(default)]
    pub symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSymbol {
    pub symbol: String,
    #[serde(default)]
    price_precision: u32,
    #[serde(default)]
    quantity_precision: u32,
    #[serde(default)]
    contract_type: String,
    #[serde(default, alias = "status")]
    contract_status: String,
    #[serde(default)]
    filters: Vec<RawFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
enum RawFilter {
    #[serde(rename_all = "camelCase")]
    PriceFilter {
        tick_size: Decimal,
        #[serde(default)]
        min_price: Decimal,
        #[serde(default)]
        max_price: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    LotSize {
        step_size: Decimal,
        #[serde(default)]
        min_qty: Decimal,
        #[serde(default)]
        max_qty: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    Notional {
        min_notional: Option<Decimal>,
        notional: Option<Decimal>,
    },
    #[serde(rename_all = "camelCase")]
    MinNotional {
        notional: Option<Decimal>,
        min_notional: Option<Decimal>,
    },
    #[serde(rename_all = "camelCase")]
    MaxNumOrders {
        #[serde(alias = "maxNumOrders")]
        limit: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    PercentPrice {
        multiplier_up: Option<Decimal>,
        multiplier_down: Option<Decimal>,
    },
    #[serde(other)]
    Unknown,
}

impl RawSymbol {
    /// Flatten the filter list. `NOTIONAL` wins over `MIN_NOTIONAL` whatever
    /// order they appear in.
    pub fn into_filters(self) -> SymbolFilters {
        let mut out = SymbolFilters {
            symbol: self.symbol,
            tick_size: Decimal::ZERO,
            min_price: Decimal::ZERO,
            max_price: Decimal::ZERO,
            step_size: Decimal::ZERO,
            min_qty: Decimal::ZERO,
            max_qty: Decimal::ZERO,
            min_notional: Decimal::ZERO,
            price_precision: self.price_precision,
            quantity_precision: self.quantity_precision,
            max_num_orders: None,
            multiplier_up: None,
            multiplier_down: None,
            contract_type: self.contract_type,
            contract_status: self.contract_status,
        };

        let mut notional = None;
        let mut min_notional_fallback = None;

        for filter in self.filters {
            match filter {
                RawFilter::PriceFilter { tick_size, min_price, max_price } => {
                    out.tick_size = tick_size;
                    out.min_price = min_price;
                    out.max_price = max_price;
                }
                RawFilter::LotSize { step_size, min_qty, max_qty } => {
                    out.step_size = step_size;
                    out.min_qty = min_qty;
                    out.max_qty = max_qty;
                }
                RawFilter::Notional { min_notional, notional: alt } => {
                    notional = min_notional.or(alt);
                    if notional.is_none() {
                        warn!("[aster] NOTIONAL filter for {} has no minimum", out.symbol);
                    }
                }
                RawFilter::MinNotional { notional: value, min_notional } => {
                    min_notional_fallback = value.or(min_notional);
                }
                RawFilter::MaxNumOrders { limit } => out.max_num_orders = limit,
                RawFilter::PercentPrice { multiplier_up, multiplier_down } => {
                    out.multiplier_up = multiplier_up;
                    out.multiplier_down = multiplier_down;
                }
                RawFilter::Unknown => debug!("[aster] ignoring filter on {}", out.symbol),
            }
        }

        out.min_notional = notional.or(min_notional_fallback).unwrap_or_default();
        out
    }
}

// ---------------------------------------------------------------------------
// Leverage brackets
// ---------------------------------------------------------------------------

/// `/leverageBracket` returns an object for a single symbol and an array
/// otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawBracketResponse {
    Many(Vec<RawSymbolBrackets>),
    One(RawSymbolBrackets),
}

impl RawBracketResponse {
    pub fn into_vec(self) -> Vec<RawSymbolBrackets> {
        match self {
            Self::Many(v) => v,
            Self::One(one) => vec![one],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSymbolBrackets {
    pub symbol: String,
    #[serde(default)]
    pub brackets: Vec<RawBracket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBracket {
    bracket: u32,
    initial_leverage: u32,
    notional_cap: Decimal,
    notional_floor: Decimal,
    maint_margin_ratio: Decimal,
}

impl From<RawBracket> for LeverageBracket {
    fn from(raw: RawBracket) -> Self {
        Self {
            bracket: raw.bracket,
            initial_leverage: raw.initial_leverage,
            notional_cap: raw.notional_cap,
            notional_floor: raw.notional_floor,
            maint_margin_ratio: raw.maint_margin_ratio,
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
/// trades, takerBuyBase, takerBuyQuote, ignore]`
#[derive(Debug, Deserialize)]
pub struct RawKline(
    u64,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    u64,
    Decimal,
    u64,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
);

impl From<RawKline> for Kline {
    fn from(k: RawKline) -> Self {
        Self {
            open_time: k.0,
            open: k.1,
            high: k.2,
            low: k.3,
            close: k.4,
            volume: k.5,
            close_time: k.6,
            quote_volume: k.7,
            trades: k.8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPremiumIndex {
    symbol: String,
    mark_price: Decimal,
    #[serde(default)]
    index_price: Decimal,
    #[serde(default)]
    last_funding_rate: Decimal,
    #[serde(default)]
    next_funding_time: u64,
}

impl From<RawPremiumIndex> for MarkPrice {
    fn from(raw: RawPremiumIndex) -> Self {
        Self {
            symbol: raw.symbol,
            mark_price: raw.mark_price,
            index_price: raw.index_price,
            funding_rate: raw.last_funding_rate,
            next_funding_time: raw.next_funding_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFundingRate {
    symbol: String,
    funding_rate: Decimal,
    funding_time: u64,
}

impl From<RawFundingRate> for FundingRate {
    fn from(raw: RawFundingRate) -> Self {
        Self {
            symbol: raw.symbol,
            funding_rate: raw.funding_rate,
            funding_time: raw.funding_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOpenInterest {
    symbol: String,
    open_interest: Decimal,
    #[serde(default)]
    time: u64,
}

impl From<RawOpenInterest> for OpenInterest {
    fn from(raw: RawOpenInterest) -> Self {
        Self {
            symbol: raw.symbol,
            open_interest: raw.open_interest,
            time: raw.time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDepth {
    last_update_id: u64,
    bids: Vec<Level>,
    asks: Vec<Level>,
}

impl From<RawDepth> for Depth {
    fn from(raw: RawDepth) -> Self {
        Self {
            last_update_id: raw.last_update_id,
            bids: raw.bids,
            asks: raw.asks,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker24hr {
    symbol: String,
    price_change: Decimal,
    price_change_percent: Decimal,
    last_price: Decimal,
    high_price: Decimal,
    low_price: Decimal,
    volume: Decimal,
    quote_volume: Decimal,
    open_time: u64,
    close_time: u64,
    #[serde(default)]
    count: u64,
}

impl From<RawTicker24hr> for Ticker24hr {
    fn from(raw: RawTicker24hr) -> Self {
        Self {
            symbol: raw.symbol,
            price_change: raw.price_change,
            price_change_percent: raw.price_change_percent,
            last_price: raw.last_price,
            high_price: raw.high_price,
            low_price: raw.low_price,
            volume: raw.volume,
            quote_volume: raw.quote_volume,
            open_time: raw.open_time,
            close_time: raw.close_time,
            count: raw.count,
        }
    }
}
