//! Account settings and order cancellation.

use perp_core::error::{CODE_MULTI_ASSETS_MODE, CODE_NO_NEED_TO_CHANGE_MARGIN};
use perp_core::{MarginType, Result};
use tracing::{info, warn};

use crate::Engine;
use crate::report::{CancelReport, LeverageReport, MarginModeReport};

impl Engine {
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<LeverageReport> {
        let ack = self.api.set_leverage(symbol, leverage).await?;
        info!("[exec] {symbol}: leverage set to {}x", ack.leverage);
        Ok(LeverageReport {
            success: true,
            symbol: ack.symbol,
            leverage: ack.leverage,
            max_notional_value: ack.max_notional_value,
        })
    }

    /// Switch margin mode. An account in multi-assets mode cannot use
    /// ISOLATED; that rejection resolves to success in CROSSED.
    pub async fn set_margin_mode(
        &self,
        symbol: &str,
        margin_type: MarginType,
    ) -> Result<MarginModeReport> {
        let report = |effective: MarginType, error_code: Option<i64>, message: String| MarginModeReport {
            success: true,
            symbol: symbol.to_string(),
            requested_margin_type: margin_type,
            margin_type: effective,
            error_code,
            message,
        };

        match self.api.set_margin_type(symbol, margin_type).await {
            Ok(()) => {
                info!("[exec] {symbol}: margin type set to {}", margin_type.as_str());
                Ok(report(
                    margin_type,
                    None,
                    format!("margin type set to {}", margin_type.as_str()),
                ))
            }
            Err(err) if err.api_code() == Some(CODE_MULTI_ASSETS_MODE) => {
                warn!(
                    "[exec] {symbol}: multi-assets mode rejects {}, continuing in CROSSED",
                    margin_type.as_str()
                );
                Ok(report(
                    MarginType::Crossed,
                    Some(CODE_MULTI_ASSETS_MODE),
                    "account is in multi-assets mode; continuing with CROSSED margin".into(),
                ))
            }
            Err(err) if err.api_code() == Some(CODE_NO_NEED_TO_CHANGE_MARGIN) => Ok(report(
                margin_type,
                Some(CODE_NO_NEED_TO_CHANGE_MARGIN),
                format!("margin type already {}", margin_type.as_str()),
            )),
            Err(err) => Err(err),
        }
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<CancelReport> {
        let order = self.api.cancel_order(symbol, order_id).await?;
        info!("[exec] {symbol}: cancelled order {order_id}");
        Ok(CancelReport {
            success: true,
            symbol: symbol.to_string(),
            cancelled_orders: vec![order.order_id],
            message: format!("cancelled order {order_id}"),
        })
    }

    /// Cancel everything on the book for `symbol`, reporting what was listed.
    pub async fn cancel_all_orders(&self, symbol: &str) -> Result<CancelReport> {
        let listed: Vec<u64> = self
            .api
            .open_orders(symbol)
            .await?
            .iter()
            .map(|o| o.order_id)
            .collect();
        self.api.cancel_all_orders(symbol).await?;
        info!("[exec] {symbol}: cancelled all orders ({})", listed.len());
        Ok(CancelReport {
            success: true,
            symbol: symbol.to_string(),
            message: format!("cancelled {} order(s)", listed.len()),
            cancelled_orders: listed,
        })
    }
}
