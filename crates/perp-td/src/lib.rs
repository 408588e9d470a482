//! # perp-td
//!
//! Trading (order execution) client for perpetual-futures exchanges.
//!
//! The engine talks to the exchange exclusively through the [`FuturesApi`]
//! trait, so one client instance is owned per account/symbol worker and tests
//! can substitute an in-memory exchange.
//!
//! ## Supported exchanges
//!
//! | Exchange | Module  | Signing                         |
//! |----------|---------|---------------------------------|
//! | Aster    | `aster` | HMAC-SHA256, insertion-ordered  |

pub mod aster;
pub mod precision;
pub mod retry;

use async_trait::async_trait;
use perp_core::{
    Account, LeverageAck, MarginType, MarkPrice, Order, OrderRequest, Position, Result,
    SymbolFilters,
};

/// Exchange operations the execution engine depends on.
///
/// All methods take `&self`; implementations keep any mutable state (clock
/// offset, metadata caches) behind interior mutability.
#[async_trait]
pub trait FuturesApi: Send + Sync {
    /// Account balances and margin totals.
    async fn account(&self) -> Result<Account>;

    /// Non-zero positions, optionally filtered by symbol. An empty list means flat.
    async fn positions(&self, symbol: Option<&str>) -> Result<Vec<Position>>;

    /// Open (working) orders for a symbol.
    async fn open_orders(&self, symbol: &str) -> Result<Vec<Order>>;

    /// Query a single order by exchange ID.
    async fn get_order(&self, symbol: &str, order_id: u64) -> Result<Order>;

    /// Submit a new order. Prices/quantities are quantized by the implementation.
    async fn place_order(&self, request: &OrderRequest) -> Result<Order>;

    /// Cancel one order.
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Order>;

    /// Cancel every open order on a symbol.
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;

    /// Set the symbol's leverage.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<LeverageAck>;

    /// Set the symbol's margin mode.
    async fn set_margin_type(&self, symbol: &str, margin_type: MarginType) -> Result<()>;

    /// Trading filters, cached for the process lifetime unless `force_refresh`.
    async fn symbol_filters(&self, symbol: &str, force_refresh: bool) -> Result<SymbolFilters>;

    /// Current mark price and funding snapshot.
    async fn mark_price(&self, symbol: &str) -> Result<MarkPrice>;
}
