//! Gate trading module configuration.
//!
//! Only `api_key` and `secret_key` are required; the REST URL and timings
//! default to production values.

use pm_core::config::TraderConfig;
use pm_core::error::TradeError;
use serde::Deserialize;

/// Configuration for the Gate trading module.
#[derive(Debug, Clone, Deserialize)]
pub struct GateTdConfig {
    /// Account name used in logs.
    #[serde(default = "default_name")]
    pub name: String,

    pub api_key: String,
    pub secret_key: String,

    /// Host only; the `/api/v4/futures/usdt` prefix is appended per request.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause after a successful leverage change.
    #[serde(default = "default_leverage_cooldown_secs")]
    pub leverage_cooldown_secs: u64,

    /// Tag placed after the mandatory `t-` in order `text`.
    #[serde(default = "default_order_tag")]
    pub order_tag: String,

    /// Minimum order notional in USDT. One contract is one USDT here.
    #[serde(default)]
    pub min_notional: Option<f64>,
}

impl Default for GateTdConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            api_key: String::new(),
            secret_key: String::new(),
            rest_url: default_rest_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            leverage_cooldown_secs: default_leverage_cooldown_secs(),
            order_tag: default_order_tag(),
            min_notional: None,
        }
    }
}

impl GateTdConfig {
    /// Build from a generic trader entry.
    pub fn from_trader_config(cfg: &TraderConfig) -> Result<Self, TradeError> {
        cfg.validate()?;
        Ok(Self {
            name: cfg.name.clone(),
            api_key: cfg.api_key.clone(),
            secret_key: cfg.secret_key.clone(),
            rest_url: cfg.rest_url.clone().unwrap_or_else(default_rest_url),
            cache_ttl_secs: cfg.effective_cache_ttl_secs(),
            request_timeout_secs: cfg.effective_request_timeout_secs(),
            leverage_cooldown_secs: cfg.effective_leverage_cooldown_secs(),
            order_tag: cfg.broker_tag.clone().unwrap_or_else(default_order_tag),
            min_notional: cfg.min_notional,
        })
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_name() -> String {
    "gate".into()
}

fn default_rest_url() -> String {
    "https://api.gateio.ws".into()
}

fn default_cache_ttl_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_leverage_cooldown_secs() -> u64 {
    5
}

fn default_order_tag() -> String {
    "pm".into()
}
