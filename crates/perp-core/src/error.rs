//! Typed error definitions for the execution system.
//!
//! [`PerpError`] covers every failure the exchange client and the engine can
//! surface. Callers that only need to decide "retry the cycle, skip, or alert"
//! should match on [`PerpError::kind`] rather than on individual variants.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PerpError>;

/// Exchange error code returned when an account in multi-assets mode is asked
/// to switch a symbol to isolated margin.
pub const CODE_MULTI_ASSETS_MODE: i64 = -4168;

/// Exchange error code returned when the requested margin type is already set.
pub const CODE_NO_NEED_TO_CHANGE_MARGIN: i64 = -4046;

/// Coarse error classes the calling agent can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate limited; the whole cycle may be retried later.
    Transient,
    /// Parameters outside exchange bounds.
    Validation,
    /// The request would have increased risk and was refused.
    SafetyRejection,
    /// Network, exchange or order-placement failure.
    Operational,
    /// A required upstream input was missing; the cycle was aborted.
    Upstream,
    /// Invalid local configuration.
    Config,
}

/// Domain-specific errors for the execution system.
#[derive(Debug, Error)]
pub enum PerpError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP 429 from the exchange (retries exhausted when surfaced to callers).
    #[error("rate limited on {endpoint}")]
    RateLimited {
        endpoint: String,
        /// Server-supplied `Retry-After`, in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// Non-429 HTTP error from the exchange.
    #[error("exchange error on {endpoint}: status={status} code={code:?} msg={msg}")]
    Api {
        endpoint: String,
        status: u16,
        code: Option<i64>,
        msg: String,
    },

    /// Request exceeded the client's per-request timeout.
    #[error("request timeout on {endpoint}")]
    Timeout { endpoint: String },

    /// Connection-level failure (DNS, TLS, refused, reset).
    #[error("connection failed on {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// Response body could not be decoded into the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The symbol is not listed in exchange info.
    #[error("symbol {0} not found")]
    SymbolNotFound(String),

    /// Order parameters violate exchange filters.
    #[error("validation failed: {}", reasons.join("; "))]
    Validation { reasons: Vec<String> },

    /// Not enough margin even at the maximum allowed leverage.
    #[error(
        "insufficient balance: notional {required_notional} needs {min_leverage}x against available {available}"
    )]
    InsufficientBalance {
        required_notional: Decimal,
        available: Decimal,
        min_leverage: u32,
    },

    /// A request that would increase risk (e.g. widening a stop-loss).
    #[error("safety rejection: {0}")]
    SafetyRejection(String),

    /// The operation needs an open position and the symbol is flat.
    #[error("no position for {0}")]
    NoPosition(String),

    /// Any other operational failure (placement, state verification, ...).
    #[error("operation failed: {0}")]
    Operational(String),

    /// A required upstream input was missing.
    #[error("upstream input missing: {0}")]
    Upstream(String),
}

impl PerpError {
    /// Shorthand for a single-reason validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reasons: vec![reason.into()],
        }
    }

    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::Transient,
            Self::Validation { .. } | Self::InsufficientBalance { .. } => ErrorKind::Validation,
            Self::SafetyRejection(_) => ErrorKind::SafetyRejection,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Config(_) => ErrorKind::Config,
            Self::Api { .. }
            | Self::Timeout { .. }
            | Self::Connection { .. }
            | Self::Parse(_)
            | Self::SymbolNotFound(_)
            | Self::NoPosition(_)
            | Self::Operational(_) => ErrorKind::Operational,
        }
    }

    /// Only rate limiting is retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// The exchange error code, if the exchange returned one.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => *code,
            _ => None,
        }
    }

    /// Stable snake_case tag for structured reports.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::RateLimited { .. } => "rate_limited",
            Self::Api { .. } => "exchange_error",
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::Parse(_) => "parse",
            Self::SymbolNotFound(_) => "symbol_not_found",
            Self::Validation { .. } => "validation",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::SafetyRejection(_) => "safety_rejection",
            Self::NoPosition(_) => "no_position",
            Self::Operational(_) => "operational",
            Self::Upstream(_) => "upstream",
        }
    }
}
