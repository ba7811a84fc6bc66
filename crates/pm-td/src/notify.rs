//! Notification sinks.
//!
//! [`Notifier::notify`] is fire-and-forget: it must return immediately and a
//! delivery failure never reaches the trading path.

use std::time::Duration;

use tracing::{info, warn};

use pm_core::config::TelegramConfig;
use pm_core::{Exchange, PositionSide};

/// A message sink invoked after close operations.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Text sent after a position close.
pub fn close_message(
    exchange: Exchange,
    account: &str,
    symbol: &str,
    side: PositionSide,
    quantity: f64,
    price: Option<f64>,
) -> String {
    let price = price.map_or_else(|| "n/a".to_string(), |p| p.to_string());
    format!("[{exchange}/{account}] closed {side} {symbol} qty={quantity} price={price}")
}

/// Writes notifications to the log. Used when Telegram is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("[notify] {message}");
    }
}

/// Posts notifications to the Telegram Bot API from a detached task.
pub struct TelegramNotifier {
    http: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(cfg: &TelegramConfig) -> Self {
        Self::with_api_base(cfg, "https://api.telegram.org")
    }

    /// Point at a different API host (tests).
    pub fn with_api_base(cfg: &TelegramConfig, api_base: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), cfg.bot_token),
            chat_id: cfg.chat_id.clone(),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, message: &str) {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!("[notify] no runtime, dropping telegram message");
            return;
        };
        let http = self.http.clone();
        let url = self.url.clone();
        let body = serde_json::json!({ "chat_id": self.chat_id, "text": message });
        rt.spawn(async move {
            match http.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!("[notify] telegram returned {}", resp.status()),
                Err(e) => warn!("[notify] telegram send failed: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_message_format() {
        let msg = close_message(Exchange::Gate, "main", "BTCUSDT", PositionSide::Short, 12.0, Some(45000.5));
        assert_eq!(msg, "[gate/main] closed SHORT BTCUSDT qty=12 price=45000.5");
        let msg = close_message(Exchange::Binance, "b", "ETHUSDT", PositionSide::Long, 0.5, None);
        assert!(msg.ends_with("price=n/a"));
    }

    #[tokio::test]
    async fn telegram_posts_to_send_message() {
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottok/sendMessage"))
            .and(body_json(serde_json::json!({ "chat_id": "42", "text": "hello" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = TelegramConfig {
            bot_token: "tok".into(),
            chat_id: "42".into(),
            enabled: Some(true),
        };
        TelegramNotifier::with_api_base(&cfg, &server.uri()).notify("hello");

        for _ in 0..100 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        server.verify().await;
    }
}
