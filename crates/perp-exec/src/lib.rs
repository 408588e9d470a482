//! # perp-exec
//!
//! Order-execution and position-protection engine.
//!
//! The [`Engine`] turns a structured trading decision into a sequence of
//! exchange calls made through [`perp_td::FuturesApi`]:
//!
//! - **State** (`state`): normalized position/order snapshot per symbol
//! - **Sizing** (`sizing`): USD notional → filter-compliant quantity, leverage resolution
//! - **Protection** (`protection`): stop-loss / take-profit placement and atomic replacement
//! - **Transitions** (`transition`): open (with flip), close, reduce
//! - **Preparation** (`prepare`): pre-trade cleanup for a planned action
//! - **Plans** (`plan`): dispatch of an upstream `TradingPlan`
//!
//! Every operation is sequential for its symbol: the order of cancel, place
//! and verify steps is what keeps the position protected. One engine owns one
//! client; the engine itself holds no state between calls.

pub mod account;
pub mod config;
pub mod plan;
pub mod prepare;
pub mod protection;
pub mod report;
pub mod sizing;
pub mod state;
pub mod transition;

#[cfg(test)]
mod sim;

use std::sync::Arc;
use std::time::Duration;

use perp_td::FuturesApi;

pub use config::{ExecutionConfig, ProtectionPolicy};
pub use plan::TradingPlan;
pub use report::*;
pub use state::PositionState;
pub use transition::OpenRequest;

/// The execution engine for one account.
pub struct Engine {
    api: Arc<dyn FuturesApi>,
    policy: ProtectionPolicy,
    config: ExecutionConfig,
}

impl Engine {
    pub fn new(api: Arc<dyn FuturesApi>, policy: ProtectionPolicy, config: ExecutionConfig) -> Self {
        Self { api, policy, config }
    }

    /// The exchange client this engine drives.
    pub fn api(&self) -> &Arc<dyn FuturesApi> {
        &self.api
    }

    pub fn policy(&self) -> &ProtectionPolicy {
        &self.policy
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Give the exchange time to reflect the last order in position/order reads.
    async fn settle(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// Client order ID of the form `<prefix>_<8 hex>`.
pub(crate) fn client_order_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_order_ids_are_prefixed_and_short() {
        let id = client_order_id("reduce");
        let (prefix, suffix) = id.split_once('_').unwrap();
        assert_eq!(prefix, "reduce");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, client_order_id("reduce"));
    }
}
