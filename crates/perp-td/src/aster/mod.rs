//! Aster futures REST client.
//!
//! Implements [`FuturesApi`](crate::FuturesApi) against the Binance-compatible
//! `/fapi` surface of Aster. All parameters travel in the query string for
//! every method, signed requests append `timestamp`, `recvWindow` and
//! `signature` in that order, and the API key is sent as `X-MBX-APIKEY`.
//!
//! # REST endpoints
//!
//! | Operation          | Method | Path                       | Signed |
//! |--------------------|--------|----------------------------|--------|
//! | Server time        | GET    | `/fapi/v1/time`            |        |
//! | Account            | GET    | `/fapi/v2/account`         | yes    |
//! | Positions          | GET    | `/fapi/v2/positionRisk`    | yes    |
//! | Open orders        | GET    | `/fapi/v1/openOrders`      | yes    |
//! | Query order        | GET    | `/fapi/v1/order`           | yes    |
//! | Place order        | POST   | `/fapi/v1/order`           | yes    |
//! | Cancel order       | DELETE | `/fapi/v1/order`           | yes    |
//! | Cancel all orders  | DELETE | `/fapi/v1/allOpenOrders`   | yes    |
//! | Set leverage       | POST   | `/fapi/v1/leverage`        | yes    |
//! | Set margin type    | POST   | `/fapi/v1/marginType`      | yes    |
//! | Exchange info      | GET    | `/fapi/v1/exchangeInfo`    |        |
//! | Leverage brackets  | GET    | `/fapi/v1/leverageBracket` |        |
//! | Mark price         | GET    | `/fapi/v1/premiumIndex`    |        |
//! | Klines             | GET    | `/fapi/v1/klines`          |        |
//! | Funding history    | GET    | `/fapi/v1/fundingRate`     |        |
//! | Open interest      | GET    | `/fapi/v1/openInterest`    |        |
//! | Order book         | GET    | `/fapi/v1/depth`           |        |
//! | 24h ticker         | GET    | `/fapi/v1/ticker/24hr`     |        |
//!
//! HTTP 429 is retried with exponential backoff (honouring `Retry-After`);
//! every other failure is returned on the first attempt.

pub mod auth;
pub mod clock;
pub mod config;
mod wire;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use perp_core::{
    Account, Depth, FundingRate, Kline, LeverageAck, LeverageBracket, MarginType, MarkPrice,
    OpenInterest, Order, OrderRequest, OrderType, PerpError, Position, PositionDirection, Result,
    SymbolFilters, Ticker24hr,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use self::clock::ServerClock;
use self::config::AsterTdConfig;
use self::wire::{
    ApiErrorBody, RawAccount, RawBracketResponse, RawDepth, RawExchangeInfo, RawFundingRate,
    RawKline, RawLeverageAck, RawOpenInterest, RawOrder, RawPosition, RawPremiumIndex,
    RawTicker24hr, ServerTime,
};
use crate::FuturesApi;
use crate::precision::{self, Rounding};
use crate::retry::{RetryPolicy, Verdict};

/// Maintenance margin rate used by [`estimate_liquidation_price`] when the
/// caller has no bracket data (0.5%).
pub const DEFAULT_MAINTENANCE_MARGIN_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Highest leverage the exchange accepts on any symbol.
pub const MAX_LEVERAGE: u32 = 125;

type Params = Vec<(String, String)>;

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

// ---------------------------------------------------------------------------
// AsterClient
// ---------------------------------------------------------------------------

/// Aster futures account client.
///
/// Cheap to share behind an `Arc`; the clock offset and metadata caches use
/// interior mutability.
pub struct AsterClient {
    /// Shared HTTP client (per-request timeout applied).
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    /// REST base URL (e.g. `https://fapi.asterdex.com`).
    base_url: String,
    recv_window: u64,
    /// Applied to HTTP 429 only.
    retry: RetryPolicy,
    clock: ServerClock,
    /// Symbol filters, kept for the process lifetime.
    filters: Mutex<HashMap<String, SymbolFilters>>,
    /// Leverage brackets by symbol.
    brackets: Mutex<HashMap<String, Vec<LeverageBracket>>>,
}

impl AsterClient {
    /// Build a client. No network traffic happens until the first call.
    pub fn new(config: &AsterTdConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(PerpError::Config("api_key is required".into()));
        }
        if config.secret_key.is_empty() {
            return Err(PerpError::Config("secret_key is required".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PerpError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            recv_window: config.recv_window,
            retry: RetryPolicy::exponential(
                config.max_retries,
                Duration::from_millis(config.retry_delay_ms),
            ),
            clock: ServerClock::new(Duration::from_secs(config.clock_resync_secs)),
            filters: Mutex::new(HashMap::new()),
            brackets: Mutex::new(HashMap::new()),
        })
    }

    // -----------------------------------------------------------------------
    // Request core
    // -----------------------------------------------------------------------

    /// Measure the server clock offset. Failures fall back to local time.
    pub async fn sync_clock(&self) {
        let local_before = clock::local_time_ms() as i64;
        match self.fetch_server_time().await {
            Ok(t) => {
                let local_after = clock::local_time_ms() as i64;
                let offset = t.server_time - (local_before + local_after) / 2;
                self.clock.record(offset);
                debug!("[aster] clock offset {offset}ms");
            }
            Err(e) => {
                warn!("[aster] clock sync failed, using local time: {e}");
                self.clock.record_failure();
            }
        }
    }

    /// Single unsigned attempt against `/fapi/v1/time`.
    async fn fetch_server_time(&self) -> Result<ServerTime> {
        let path = "/fapi/v1/time";
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PerpError::Api {
                endpoint: path.to_string(),
                status: status.as_u16(),
                code: None,
                msg: status.to_string(),
            });
        }
        resp.json()
            .await
            .map_err(|e| PerpError::Parse(format!("{path}: {e}")))
    }

    async fn timestamp(&self) -> u64 {
        if self.clock.needs_sync() {
            self.sync_clock().await;
        }
        self.clock.now_ms()
    }

    /// Send a request, retrying on HTTP 429. Signed requests are re-timestamped
    /// and re-signed on every attempt.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Params,
        signed: bool,
    ) -> Result<T> {
        let label = format!("{method} {path}");
        let params = &params;
        self.retry
            .run(
                &label,
                |_| {
                    let method = method.clone();
                    async move { self.send_once(method, path, params, signed).await }
                },
                |err: &PerpError| match err {
                    PerpError::RateLimited { retry_after_ms: Some(ms), .. } => {
                        Verdict::RetryAfter(Duration::from_millis(*ms))
                    }
                    PerpError::RateLimited { .. } => Verdict::Retry,
                    _ => Verdict::Fatal,
                },
            )
            .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        signed: bool,
    ) -> Result<T> {
        let query = if signed {
            let mut full = params.to_vec();
            full.push(param("timestamp", self.timestamp().await));
            full.push(param("recvWindow", self.recv_window));
            auth::signed_query(&full, &self.secret_key)?
        } else {
            auth::encode_query(params)
        };
        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };

        let resp = self
            .http
            .request(method.clone(), &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| (secs * 1000.0) as u64);
            return Err(PerpError::RateLimited {
                endpoint: path.to_string(),
                retry_after_ms,
            });
        }

        let body = resp.text().await.map_err(|e| transport_error(path, e))?;
        if !status.is_success() {
            let (code, msg) = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(b) => (b.code, b.msg),
                Err(_) => (None, body),
            };
            error!("[aster] {method} {path} failed: status={status} code={code:?} msg={msg}");
            return Err(PerpError::Api {
                endpoint: path.to_string(),
                status: status.as_u16(),
                code,
                msg,
            });
        }

        serde_json::from_str(&body).map_err(|e| PerpError::Parse(format!("{path}: {e}")))
    }

    // -----------------------------------------------------------------------
    // Exchange metadata
    // -----------------------------------------------------------------------

    /// Server time in Unix milliseconds.
    pub async fn server_time(&self) -> Result<i64> {
        let t: ServerTime = self.request(Method::GET, "/fapi/v1/time", vec![], false).await?;
        Ok(t.server_time)
    }

    /// Filters for every listed symbol.
    pub async fn exchange_info(&self) -> Result<Vec<SymbolFilters>> {
        let info: RawExchangeInfo =
            self.request(Method::GET, "/fapi/v1/exchangeInfo", vec![], false).await?;
        Ok(info.symbols.into_iter().map(|s| s.into_filters()).collect())
    }

    /// Leverage tiers for `symbol`, cached unless `force_refresh`.
    ///
    /// Returns an empty list when the endpoint is unavailable; only rate
    /// limiting is surfaced as an error.
    pub async fn leverage_brackets(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<Vec<LeverageBracket>> {
        if !force_refresh {
            if let Some(cached) = self.brackets.lock().await.get(symbol) {
                return Ok(cached.clone());
            }
        }

        let resp: Result<RawBracketResponse> = self
            .request(
                Method::GET,
                "/fapi/v1/leverageBracket",
                vec![param("symbol", symbol)],
                false,
            )
            .await;
        let resp = match resp {
            Ok(resp) => resp,
            Err(e @ PerpError::RateLimited { .. }) => return Err(e),
            Err(e) => {
                debug!("[aster] leverage brackets unavailable for {symbol}: {e}");
                return Ok(Vec::new());
            }
        };

        let brackets: Vec<LeverageBracket> = resp
            .into_vec()
            .into_iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.brackets.into_iter().map(LeverageBracket::from).collect())
            .unwrap_or_default();
        self.brackets
            .lock()
            .await
            .insert(symbol.to_string(), brackets.clone());
        Ok(brackets)
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    pub async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let raw: Vec<RawKline> = self
            .request(
                Method::GET,
                "/fapi/v1/klines",
                vec![
                    param("symbol", symbol),
                    param("interval", interval),
                    param("limit", limit),
                ],
                false,
            )
            .await?;
        Ok(raw.into_iter().map(Kline::from).collect())
    }

    pub async fn funding_rate_history(&self, symbol: &str, limit: u32) -> Result<Vec<FundingRate>> {
        let raw: Vec<RawFundingRate> = self
            .request(
                Method::GET,
                "/fapi/v1/fundingRate",
                vec![param("symbol", symbol), param("limit", limit)],
                false,
            )
            .await?;
        Ok(raw.into_iter().map(FundingRate::from).collect())
    }

    pub async fn open_interest(&self, symbol: &str) -> Result<OpenInterest> {
        let raw: RawOpenInterest = self
            .request(
                Method::GET,
                "/fapi/v1/openInterest",
                vec![param("symbol", symbol)],
                false,
            )
            .await?;
        Ok(raw.into())
    }

    /// Order book snapshot. Valid limits: 5, 10, 20, 50, 100, 500, 1000.
    pub async fn depth(&self, symbol: &str, limit: u32) -> Result<Depth> {
        let raw: RawDepth = self
            .request(
                Method::GET,
                "/fapi/v1/depth",
                vec![param("symbol", symbol), param("limit", limit)],
                false,
            )
            .await?;
        Ok(raw.into())
    }

    pub async fn ticker_24hr(&self, symbol: &str) -> Result<Ticker24hr> {
        let raw: RawTicker24hr = self
            .request(
                Method::GET,
                "/fapi/v1/ticker/24hr",
                vec![param("symbol", symbol)],
                false,
            )
            .await?;
        Ok(raw.into())
    }
}

#[async_trait]
impl FuturesApi for AsterClient {
    async fn account(&self) -> Result<Account> {
        let raw: RawAccount = self.request(Method::GET, "/fapi/v2/account", vec![], true).await?;
        Ok(raw.into())
    }

    async fn positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        let params = symbol.map(|s| vec![param("symbol", s)]).unwrap_or_default();
        let raw: Vec<RawPosition> = self
            .request(Method::GET, "/fapi/v2/positionRisk", params, true)
            .await?;
        raw.into_iter()
            .filter(|p| !p.is_flat())
            .map(Position::try_from)
            .collect()
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        let raw: Vec<RawOrder> = self
            .request(
                Method::GET,
                "/fapi/v1/openOrders",
                vec![param("symbol", symbol)],
                true,
            )
            .await?;
        Ok(raw.into_iter().map(Order::from).collect())
    }

    async fn get_order(&self, symbol: &str, order_id: u64) -> Result<Order> {
        let raw: RawOrder = self
            .request(
                Method::GET,
                "/fapi/v1/order",
                vec![param("symbol", symbol), param("orderId", order_id)],
                true,
            )
            .await?;
        Ok(raw.into())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let needs_filters =
            request.quantity.is_some() || request.price.is_some() || request.stop_price.is_some();
        let filters = if needs_filters {
            Some(self.symbol_filters(&request.symbol, false).await?)
        } else {
            None
        };

        let mut params = vec![
            param("symbol", &request.symbol),
            param("side", request.side.as_str()),
            param("type", request.order_type.as_str()),
        ];
        if let Some(f) = &filters {
            if let Some(qty) = request.quantity {
                params.push(param("quantity", precision::format_quantity(qty, f)));
            }
            if let Some(price) = request.price {
                params.push(param("price", precision::format_price(price, f)));
            }
            if let Some(stop) = request.stop_price {
                params.push(param("stopPrice", precision::format_price(stop, f)));
            }
        }
        if request.reduce_only {
            params.push(param("reduceOnly", "true"));
        }
        if request.order_type == OrderType::Limit {
            if let Some(tif) = request.time_in_force {
                params.push(param("timeInForce", tif.as_str()));
            }
        }
        if let Some(cid) = &request.client_order_id {
            params.push(param("newClientOrderId", cid));
        }
        if let Some(wt) = request.working_type {
            params.push(param("workingType", wt.as_str()));
        }

        let raw: RawOrder = self.request(Method::POST, "/fapi/v1/order", params, true).await?;
        let order = Order::from(raw);
        info!(
            "[aster] order placed: {} {} {} qty={} id={}",
            order.symbol,
            order.side,
            order.order_type.as_str(),
            order.quantity,
            order.order_id
        );
        Ok(order)
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Order> {
        let raw: RawOrder = self
            .request(
                Method::DELETE,
                "/fapi/v1/order",
                vec![param("symbol", symbol), param("orderId", order_id)],
                true,
            )
            .await?;
        info!("[aster] order cancelled: {symbol} id={order_id}");
        Ok(raw.into())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                "/fapi/v1/allOpenOrders",
                vec![param("symbol", symbol)],
                true,
            )
            .await?;
        info!("[aster] all open orders cancelled: {symbol}");
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<LeverageAck> {
        if !(1..=MAX_LEVERAGE).contains(&leverage) {
            return Err(PerpError::validation(format!(
                "leverage {leverage} outside 1..={MAX_LEVERAGE}"
            )));
        }
        let raw: RawLeverageAck = self
            .request(
                Method::POST,
                "/fapi/v1/leverage",
                vec![param("symbol", symbol), param("leverage", leverage)],
                true,
            )
            .await?;
        info!("[aster] leverage set: {symbol} {leverage}x");
        Ok(raw.into())
    }

    async fn set_margin_type(&self, symbol: &str, margin_type: MarginType) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::POST,
                "/fapi/v1/marginType",
                vec![param("symbol", symbol), param("marginType", margin_type.as_str())],
                true,
            )
            .await?;
        info!("[aster] margin type set: {symbol} {}", margin_type.as_str());
        Ok(())
    }

    async fn symbol_filters(&self, symbol: &str, force_refresh: bool) -> Result<SymbolFilters> {
        if !force_refresh {
            if let Some(cached) = self.filters.lock().await.get(symbol) {
                return Ok(cached.clone());
            }
        }

        let info: RawExchangeInfo =
            self.request(Method::GET, "/fapi/v1/exchangeInfo", vec![], false).await?;
        let filters = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.into_filters())
            .ok_or_else(|| PerpError::SymbolNotFound(symbol.to_string()))?;

        debug!(
            "[aster] filters for {symbol}: tick={} step={} min_notional={}",
            filters.tick_size, filters.step_size, filters.min_notional
        );
        self.filters
            .lock()
            .await
            .insert(symbol.to_string(), filters.clone());
        Ok(filters)
    }

    async fn mark_price(&self, symbol: &str) -> Result<MarkPrice> {
        let raw: RawPremiumIndex = self
            .request(
                Method::GET,
                "/fapi/v1/premiumIndex",
                vec![param("symbol", symbol)],
                false,
            )
            .await?;
        Ok(raw.into())
    }
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> PerpError {
    if err.is_timeout() {
        PerpError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else {
        PerpError::Connection {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

/// Rough isolated-margin liquidation price, ignoring fees and funding.
///
/// LONG: `entry × (1 − 1/leverage + mmr)`; SHORT: `entry × (1 + 1/leverage − mmr)`.
pub fn estimate_liquidation_price(
    entry_price: Decimal,
    leverage: u32,
    direction: PositionDirection,
    maintenance_margin_rate: Decimal,
) -> Decimal {
    if leverage == 0 {
        return Decimal::ZERO;
    }
    let inv = Decimal::ONE / Decimal::from(leverage);
    let factor = match direction {
        PositionDirection::Long => Decimal::ONE - inv + maintenance_margin_rate,
        PositionDirection::Short => Decimal::ONE + inv - maintenance_margin_rate,
    };
    precision::quantize(entry_price * factor, Decimal::ZERO, Some(8), Rounding::HalfUp)
}
