//! Engine configuration: protection thresholds and execution timing.
//!
//! Both blocks deserialize from the runner's JSON config and fall back to
//! field-level defaults, so `{}` is a valid value for either.

use perp_core::WorkingType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Thresholds used by the protective order manager. Fractions, not
/// percentages: `0.005` means 0.5%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionPolicy {
    /// Skip updates while mark price is within this distance of the stop-loss.
    #[serde(default = "default_sl_danger_pct")]
    pub sl_danger_pct: Decimal,

    /// Skip updates while mark price is within this distance of the take-profit.
    #[serde(default = "default_tp_danger_pct")]
    pub tp_danger_pct: Decimal,

    /// Requested and existing trigger prices closer than this are "the same".
    #[serde(default = "default_price_match_pct")]
    pub price_match_pct: Decimal,

    /// Allowed relative gap between a protective order's size and the position.
    #[serde(default = "default_quantity_tolerance_pct")]
    pub quantity_tolerance_pct: Decimal,
}

impl Default for ProtectionPolicy {
    fn default() -> Self {
        Self {
            sl_danger_pct: default_sl_danger_pct(),
            tp_danger_pct: default_tp_danger_pct(),
            price_match_pct: default_price_match_pct(),
            quantity_tolerance_pct: default_quantity_tolerance_pct(),
        }
    }
}

/// Timing and limits for position transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Wait after an entry/reduce order before re-reading the position.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Wait after closing the opposite side before verifying it is flat.
    #[serde(default = "default_close_settle_ms")]
    pub close_settle_ms: u64,

    /// Attempts per protective leg.
    #[serde(default = "default_protection_retries")]
    pub protection_retries: u32,

    #[serde(default = "default_protection_retry_delay_ms")]
    pub protection_retry_delay_ms: u64,

    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,

    /// Raise the requested leverage when margin would not cover the order.
    /// When false, the shortfall is a validation failure instead.
    #[serde(default = "default_allow_leverage_escalation")]
    pub allow_leverage_escalation: bool,

    /// Trigger source for stop-loss / take-profit orders.
    #[serde(default)]
    pub working_type: WorkingType,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            close_settle_ms: default_close_settle_ms(),
            protection_retries: default_protection_retries(),
            protection_retry_delay_ms: default_protection_retry_delay_ms(),
            max_leverage: default_max_leverage(),
            allow_leverage_escalation: default_allow_leverage_escalation(),
            working_type: WorkingType::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_sl_danger_pct() -> Decimal {
    Decimal::new(5, 3)
}

fn default_tp_danger_pct() -> Decimal {
    Decimal::new(2, 3)
}

fn default_price_match_pct() -> Decimal {
    Decimal::new(1, 3)
}

fn default_quantity_tolerance_pct() -> Decimal {
    Decimal::new(1, 2)
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_close_settle_ms() -> u64 {
    1000
}

fn default_protection_retries() -> u32 {
    3
}

fn default_protection_retry_delay_ms() -> u64 {
    1000
}

fn default_max_leverage() -> u32 {
    125
}

fn default_allow_leverage_escalation() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_objects_take_defaults() {
        let policy: ProtectionPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.sl_danger_pct, dec!(0.005));
        assert_eq!(policy.tp_danger_pct, dec!(0.002));
        assert_eq!(policy.price_match_pct, dec!(0.001));
        assert_eq!(policy.quantity_tolerance_pct, dec!(0.01));

        let exec: ExecutionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(exec, ExecutionConfig::default());
        assert_eq!(exec.working_type, WorkingType::MarkPrice);
    }

    #[test]
    fn thresholds_accept_numbers_or_strings() {
        let policy: ProtectionPolicy =
            serde_json::from_str(r#"{"sl_danger_pct": 0.01, "tp_danger_pct": "0.003"}"#).unwrap();
        assert_eq!(policy.sl_danger_pct, dec!(0.01));
        assert_eq!(policy.tp_danger_pct, dec!(0.003));
    }
}
