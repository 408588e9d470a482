//! Request signing for the Aster futures API.
//!
//! The signature is HMAC-SHA256 over the URL-encoded query string **in
//! parameter insertion order**. Aster rejects signatures computed over
//! sorted parameters, so callers must push parameters in the order they
//! will be sent and must not re-order them afterwards.

use hmac::{Hmac, Mac};
use perp_core::{PerpError, Result};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PerpError::Config(format!("invalid HMAC key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Join `(key, value)` pairs into a URL-encoded query string, keeping order.
pub fn encode_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the signed query: `<params>&signature=<hex>`.
///
/// `params` must already contain `timestamp` and `recvWindow`.
pub fn signed_query(params: &[(String, String)], secret: &str) -> Result<String> {
    let query = encode_query(params);
    let signature = hmac_sha256_hex(secret, &query)?;
    Ok(if query.is_empty() {
        format!("signature={signature}")
    } else {
        format!("{query}&signature={signature}")
    })
}
