//! Aster trading client configuration.
//!
//! Only `api_key` and `secret_key` are required; every other field has a
//! production default.

use serde::Deserialize;

/// Configuration for the Aster futures client.
#[derive(Debug, Clone, Deserialize)]
pub struct AsterTdConfig {
    /// Aster API key (sent as `X-MBX-APIKEY`).
    pub api_key: String,

    /// Aster API secret (HMAC-SHA256 signing).
    pub secret_key: String,

    /// REST base URL.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    // -- Timing --
    /// `recvWindow` for signed requests, in milliseconds.
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,

    /// Per-request timeout, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Clock offset older than this is refreshed before the next signed call.
    #[serde(default = "default_clock_resync_secs")]
    pub clock_resync_secs: u64,

    // -- Rate-limit retries --
    /// Retries after an HTTP 429 (total attempts = `max_retries + 1`).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for AsterTdConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            rest_url: default_rest_url(),
            recv_window: default_recv_window(),
            timeout_ms: default_timeout_ms(),
            clock_resync_secs: default_clock_resync_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_rest_url() -> String {
    "https://fapi.asterdex.com".into()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_clock_resync_secs() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}
