//! Binance trading module configuration.
//!
//! Holds API credentials, the USDT-margined futures endpoint and timing
//! knobs. Everything except `api_key` and `secret_key` has a production
//! default.

use pm_core::config::TraderConfig;
use pm_core::error::TradeError;
use serde::Deserialize;

/// Configuration for the Binance futures trading module.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceTdConfig {
    /// Account name used in logs and notifications.
    #[serde(default = "default_name")]
    pub name: String,

    /// Binance API key.
    pub api_key: String,

    /// Binance API secret (HMAC-SHA256 signing).
    pub secret_key: String,

    /// USDT-margined futures REST base URL.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// `recvWindow` for signed requests (milliseconds).
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Balance/position cache TTL.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Pause after a successful leverage change.
    #[serde(default = "default_leverage_cooldown_secs")]
    pub leverage_cooldown_secs: u64,

    /// SL/TP polling interval.
    #[serde(default = "default_sltp_poll_secs")]
    pub sltp_poll_secs: u64,

    /// Failed triggered closes before a condition is retired.
    #[serde(default = "default_max_close_retries")]
    pub max_close_retries: u32,

    /// Minimum order notional in USDT; overrides the exchange filter.
    #[serde(default)]
    pub min_notional: Option<f64>,

    /// Broker tag embedded in client order IDs after `x-`.
    #[serde(default = "default_broker_tag")]
    pub broker_tag: String,

    /// Switch the account to dual-side positions on login.
    #[serde(default = "default_hedge_mode")]
    pub hedge_mode: bool,
}

impl Default for BinanceTdConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            api_key: String::new(),
            secret_key: String::new(),
            rest_url: default_rest_url(),
            recv_window: default_recv_window(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            leverage_cooldown_secs: default_leverage_cooldown_secs(),
            sltp_poll_secs: default_sltp_poll_secs(),
            max_close_retries: default_max_close_retries(),
            min_notional: None,
            broker_tag: default_broker_tag(),
            hedge_mode: default_hedge_mode(),
        }
    }
}

impl BinanceTdConfig {
    /// Build from a generic trader entry.
    pub fn from_trader_config(cfg: &TraderConfig) -> Result<Self, TradeError> {
        cfg.validate()?;
        Ok(Self {
            name: cfg.name.clone(),
            api_key: cfg.api_key.clone(),
            secret_key: cfg.secret_key.clone(),
            rest_url: cfg.rest_url.clone().unwrap_or_else(default_rest_url),
            recv_window: default_recv_window(),
            request_timeout_secs: cfg.effective_request_timeout_secs(),
            cache_ttl_secs: cfg.effective_cache_ttl_secs(),
            leverage_cooldown_secs: cfg.effective_leverage_cooldown_secs(),
            sltp_poll_secs: cfg.effective_sltp_poll_secs(),
            max_close_retries: cfg.effective_max_close_retries(),
            min_notional: cfg.min_notional,
            broker_tag: cfg.broker_tag.clone().unwrap_or_else(default_broker_tag),
            hedge_mode: cfg.effective_hedge_mode(),
        })
    }

    /// Configured minimum notional, else the exchange filter, else 10 USDT.
    pub fn effective_min_notional(&self, exchange_filter: Option<f64>) -> f64 {
        self.min_notional.or(exchange_filter).unwrap_or(10.0)
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_name() -> String {
    "binance".into()
}

fn default_rest_url() -> String {
    "https://fapi.binance.com".into()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    5
}

fn default_leverage_cooldown_secs() -> u64 {
    5
}

fn default_sltp_poll_secs() -> u64 {
    2
}

fn default_max_close_retries() -> u32 {
    3
}

fn default_broker_tag() -> String {
    "KzrpZaP9".into()
}

fn default_hedge_mode() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_defaults() {
        let cfg: BinanceTdConfig = serde_json::from_str(r#"{"api_key":"k","secret_key":"s"}"#).unwrap();
        assert_eq!(cfg.rest_url, "https://fapi.binance.com");
        assert_eq!(cfg.cache_ttl_secs, 5);
        assert!(cfg.hedge_mode);
        assert_eq!(cfg.effective_min_notional(None), 10.0);
        assert_eq!(cfg.effective_min_notional(Some(100.0)), 100.0);
    }
}
