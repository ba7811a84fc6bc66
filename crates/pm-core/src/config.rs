//! Configuration parsing for the position manager.
//!
//! Every binary reads its settings from a single JSON config file. The
//! top-level structure contains logging metadata, an optional Telegram block
//! and a `traders` array where each entry describes one exchange account.
//!
//! # Example config
//!
//! ```json
//! {
//!   "app": { "module_name": "pm", "log_path": "/tmp/log" },
//!   "telegram": { "bot_token": "...", "chat_id": "...", "enabled": true },
//!   "traders": [{
//!     "name": "gate-main",
//!     "exchange": "gate",
//!     "api_key": "...",
//!     "secret_key": "...",
//!     "symbols": ["BTCUSDT", "ETHUSDT"]
//!   }]
//! }
//! ```
//!
//! Numeric tunables are optional; the `effective_*` accessors apply defaults.

use serde::Deserialize;

use crate::error::TradeError;
use crate::types::Exchange;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub app: Option<ModuleMeta>,

    /// Telegram notification settings.
    pub telegram: Option<TelegramConfig>,

    /// One entry per exchange account.
    #[serde(default)]
    pub traders: Vec<TraderConfig>,
}

impl AppConfig {
    pub fn module_name(&self) -> String {
        self.app
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "pm".to_string())
    }

    pub fn log_path(&self) -> Option<String> {
        self.app.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Look up a trader by its configured name.
    pub fn trader(&self, name: &str) -> Option<&TraderConfig> {
        self.traders.iter().find(|t| t.name == name)
    }

    /// Validate every trader entry.
    pub fn validate(&self) -> Result<(), TradeError> {
        if self.traders.is_empty() {
            return Err(TradeError::Config("no traders configured".into()));
        }
        for t in &self.traders {
            t.validate()?;
        }
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub enabled: Option<bool>,
}

impl TelegramConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false) && !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

/// A single exchange account.
#[derive(Debug, Clone, Deserialize)]
pub struct TraderConfig {
    /// Unique name used by the CLI to select this account.
    pub name: String,

    pub exchange: Exchange,

    pub api_key: String,
    pub secret_key: String,

    /// REST base URL override (testnet, mock server).
    pub rest_url: Option<String>,

    /// Balance/position cache TTL in seconds (default: 5).
    pub cache_ttl_secs: Option<u64>,

    /// SL/TP polling interval in seconds (default: 2).
    pub sltp_poll_secs: Option<u64>,

    /// Pause after a successful leverage change in seconds (default: 5).
    pub leverage_cooldown_secs: Option<u64>,

    /// Per-request HTTP timeout in seconds (default: 10).
    pub request_timeout_secs: Option<u64>,

    /// Minimum order notional in USDT. Exchange default when absent.
    pub min_notional: Option<f64>,

    /// Tag prefixed to generated client order IDs.
    pub broker_tag: Option<String>,

    /// Failed triggered closes before a condition is retired (default: 3).
    pub max_close_retries: Option<u32>,

    /// Enable dual-side positions on login (default: true).
    pub hedge_mode: Option<bool>,

    /// Starting balance used for P&L in status output.
    pub initial_balance: Option<f64>,

    /// Symbols shown by status output.
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl TraderConfig {
    pub fn effective_cache_ttl_secs(&self) -> u64 {
        self.cache_ttl_secs.unwrap_or(5)
    }

    pub fn effective_sltp_poll_secs(&self) -> u64 {
        self.sltp_poll_secs.unwrap_or(2).max(1)
    }

    pub fn effective_leverage_cooldown_secs(&self) -> u64 {
        self.leverage_cooldown_secs.unwrap_or(5)
    }

    pub fn effective_request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(10)
    }

    pub fn effective_max_close_retries(&self) -> u32 {
        self.max_close_retries.unwrap_or(3).max(1)
    }

    pub fn effective_hedge_mode(&self) -> bool {
        self.hedge_mode.unwrap_or(true)
    }

    /// Credentials must be present; nothing is defaulted.
    pub fn validate(&self) -> Result<(), TradeError> {
        if self.api_key.trim().is_empty() {
            return Err(TradeError::Config(format!("trader '{}': api_key is empty", self.name)));
        }
        if self.secret_key.trim().is_empty() {
            return Err(TradeError::Config(format!(
                "trader '{}': secret_key is empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "app": { "module_name": "pm_test" },
        "traders": [
            { "name": "g", "exchange": "gate", "api_key": "k", "secret_key": "s",
              "cache_ttl_secs": 1, "symbols": ["BTCUSDT"] },
            { "name": "b", "exchange": "binance", "api_key": "k", "secret_key": "" }
        ]
    }"#;

    #[test]
    fn parses_and_applies_defaults() {
        let cfg: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.module_name(), "pm_test");
        assert!(cfg.telegram.is_none());

        let g = cfg.trader("g").unwrap();
        assert_eq!(g.exchange, Exchange::Gate);
        assert_eq!(g.effective_cache_ttl_secs(), 1);
        assert_eq!(g.effective_sltp_poll_secs(), 2);
        assert_eq!(g.effective_leverage_cooldown_secs(), 5);
        assert!(g.effective_hedge_mode());
        assert!(g.validate().is_ok());
    }

    #[test]
    fn empty_secret_is_config_error() {
        let cfg: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TradeError::Config(msg) if msg.contains("secret_key")));
    }

    #[test]
    fn telegram_requires_enabled_flag() {
        let t = TelegramConfig {
            bot_token: "t".into(),
            chat_id: "1".into(),
            enabled: None,
        };
        assert!(!t.is_enabled());
    }
}
