//! Gate APIv4 request signing.
//!
//! Every private request carries `KEY`, `SIGN` and `Timestamp` headers. The
//! signature is HMAC-SHA512 (hex) over five newline-joined fields:
//!
//! ```text
//! METHOD
//! /api/v4/futures/usdt<path>
//! <canonical query>          (GET/DELETE only; empty for POST)
//! hex(SHA512(body))          (SHA512 of "" for GET/DELETE)
//! <unix seconds>
//! ```
//!
//! Read-style requests hash the empty string rather than leaving the field
//! empty; the exchange rejects anything else.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha512};

use pm_core::time_util;

type HmacSha512 = Hmac<Sha512>;

/// Fixed prefix of every USDT-settled futures path.
pub const PATH_PREFIX: &str = "/api/v4/futures/usdt";

/// Whether the method carries its parameters in the query string.
pub fn is_read_method(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("DELETE")
}

/// Sorted, percent-encoded `k=v&k=v` query string.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex SHA-512 of `body`.
pub fn sha512_hex(body: &str) -> String {
    hex::encode(Sha512::digest(body.as_bytes()))
}

/// Holds credentials and produces signed header sets.
#[derive(Clone)]
pub struct Signer {
    api_key: String,
    secret_key: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("api_key", &self.api_key).finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Sign with the current wall-clock second.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        params: &BTreeMap<String, String>,
        body: &str,
    ) -> Vec<(&'static str, String)> {
        self.sign_at(method, path, params, body, time_util::now_secs())
    }

    /// Sign with an explicit timestamp (seconds).
    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        params: &BTreeMap<String, String>,
        body: &str,
        timestamp: u64,
    ) -> Vec<(&'static str, String)> {
        let method = method.to_ascii_uppercase();
        let read = is_read_method(&method);
        let query = if read { canonical_query(params) } else { String::new() };
        let body_hash = sha512_hex(if read { "" } else { body });

        let sign_string = format!("{method}\n{PATH_PREFIX}{path}\n{query}\n{body_hash}\n{timestamp}");
        let signature = self.hmac_hex(&sign_string);

        vec![
            ("KEY", self.api_key.clone()),
            ("SIGN", signature),
            ("Timestamp", timestamp.to_string()),
            ("Content-Type", "application/json".to_string()),
        ]
    }

    fn hmac_hex(&self, message: &str) -> String {
        let mut mac =
            HmacSha512::new_from_slice(self.secret_key.as_bytes()).expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA512: &str = "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
                                47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e";

    fn header<'a>(headers: &'a [(&'static str, String)], name: &str) -> &'a str {
        headers.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str()).unwrap()
    }

    #[test]
    fn empty_body_hash_is_sha512_of_empty_string() {
        assert_eq!(sha512_hex(""), EMPTY_SHA512);
    }

    #[test]
    fn get_without_params() {
        let signer = Signer::new("key", "test_secret");
        let h = signer.sign_at("GET", "/positions", &BTreeMap::new(), "", 1_700_000_000);
        assert_eq!(
            header(&h, "SIGN"),
            "8418d89c10a190b920f88bdb353bdd3a0b4bb0d359c8bb44a622c54c949d7f40\
             174a13be9e3c2cfacefae3901c46d58a1265924bb30c9bb2c66848db03f7bdd4"
        );
        assert_eq!(header(&h, "KEY"), "key");
        assert_eq!(header(&h, "Timestamp"), "1700000000");
    }

    #[test]
    fn get_query_is_sorted() {
        let signer = Signer::new("key", "test_secret");
        let mut params = BTreeMap::new();
        params.insert("limit".to_string(), "10".to_string());
        params.insert("contract".to_string(), "BTC_USDT".to_string());
        assert_eq!(canonical_query(&params), "contract=BTC_USDT&limit=10");

        let h = signer.sign_at("GET", "/my_trades", &params, "ignored", 1_700_000_000);
        assert_eq!(
            header(&h, "SIGN"),
            "f4e66b5dc2fb273b2ff8b09e365bbe7bd086084a4d3cc78c7eb96ae11d8b391e\
             40cf43c760458e0dd016aaa581874078d07ec50c265390360a25ea930fe002b7"
        );
    }

    #[test]
    fn post_hashes_body_and_drops_query() {
        let signer = Signer::new("key", "test_secret");
        let mut params = BTreeMap::new();
        params.insert("contract".to_string(), "BTC_USDT".to_string());
        let body = r#"{"contract":"BTC_USDT","size":10}"#;
        let h = signer.sign_at("post", "/orders", &params, body, 1_700_000_000);
        assert_eq!(
            header(&h, "SIGN"),
            "f95a733b124f7e876d6c053f17e437ad48357de660ed919fc31fdfbee1cd1e82\
             405311aadddd6764fd3db47e2fe30c334365b87074e339ce5e031943a9e97c7e"
        );
        assert_eq!(header(&h, "Content-Type"), "application/json");
    }
}
