//! Binance request signing.
//!
//! Signed endpoints take an HMAC-SHA256 (hex) over the URL-encoded query
//! string, appended as a final `signature` parameter, plus the API key in
//! the `X-MBX-APIKEY` header. The `timestamp` parameter must be within
//! `recvWindow` of server time, which is why the client applies a clock
//! offset learned from `/fapi/v1/time`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Join `(key, value)` pairs into a URL-encoded query string, in order.
pub fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build a URL-encoded, HMAC-SHA256–signed query string.
///
/// `params` must already include `timestamp`. The signature covers the
/// query exactly as it is sent.
pub fn build_signed_query(params: &[(&str, String)], secret: &str) -> String {
    let query = encode_query(params);
    let signature = hmac_sha256_sign(secret, &query);
    if query.is_empty() {
        format!("signature={signature}")
    } else {
        format!("{query}&signature={signature}")
    }
}
