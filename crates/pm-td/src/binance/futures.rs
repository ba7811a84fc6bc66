//! Binance USDT-margined futures REST client.
//!
//! # REST endpoints
//!
//! | Operation          | Method | Path                          | Signed |
//! |--------------------|--------|-------------------------------|--------|
//! | Server time        | GET    | `/fapi/v1/time`               | no     |
//! | Exchange info      | GET    | `/fapi/v1/exchangeInfo`       | no     |
//! | Ticker price       | GET    | `/fapi/v1/ticker/price`       | no     |
//! | Position mode      | POST   | `/fapi/v1/positionSide/dual`  | yes    |
//! | Account info       | GET    | `/fapi/v2/account`            | yes    |
//! | Positions          | GET    | `/fapi/v2/positionRisk`       | yes    |
//! | Leverage           | POST   | `/fapi/v1/leverage`           | yes    |
//! | Margin type        | POST   | `/fapi/v1/marginType`         | yes    |
//! | Place order        | POST   | `/fapi/v1/order`              | yes    |
//! | Cancel all orders  | DELETE | `/fapi/v1/allOpenOrders`      | yes    |
//! | Fills              | GET    | `/fapi/v1/userTrades`         | yes    |
//!
//! Signed parameters travel in the query string for every method. Error
//! bodies (`{"code": -4046, "msg": "..."}`) become [`TradeError::Rejected`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::Result;
use pm_core::error::TradeError;
use pm_core::{PositionSide, time_util};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use super::auth::{self, API_KEY_HEADER};
use crate::normalize::num;

/// Parameters of a market order.
#[derive(Debug, Clone)]
pub struct MarketOrder<'a> {
    pub symbol: &'a str,
    /// `BUY` / `SELL`.
    pub side: &'a str,
    /// `None` in one-way mode (`positionSide=BOTH`).
    pub position_side: Option<PositionSide>,
    /// Already formatted at the symbol's precision.
    pub quantity: &'a str,
    pub client_order_id: &'a str,
    /// Only sent in one-way mode; hedge mode rejects the flag.
    pub reduce_only: bool,
}

/// Binance USDT-margined futures client.
pub struct FuturesClient {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    /// REST base URL (e.g. `https://fapi.binance.com`).
    base_url: String,
    recv_window: u64,
    /// Server time minus local time, in milliseconds.
    time_offset_ms: AtomicI64,
}

impl FuturesClient {
    pub fn new(api_key: &str, secret_key: &str, base_url: &str, recv_window: u64, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TradeError::Transport(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            recv_window,
            time_offset_ms: AtomicI64::new(0),
        })
    }

    pub fn time_offset_ms(&self) -> i64 {
        self.time_offset_ms.load(Ordering::Relaxed)
    }

    /// Learn the server clock offset used for signed timestamps.
    pub async fn sync_time(&self) -> Result<i64> {
        let before = time_util::now_ms();
        let v = self.public(Method::GET, "/fapi/v1/time", &[]).await?;
        let after = time_util::now_ms();
        let server = num(&v, "serverTime") as i64;
        if server <= 0 {
            return Err(TradeError::Parse("serverTime missing from /fapi/v1/time".into()).into());
        }
        let local = ((before + after) / 2) as i64;
        let offset = server - local;
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        info!("[binance-td] server time offset {offset}ms");
        Ok(offset)
    }

    // -----------------------------------------------------------------------
    // Account configuration
    // -----------------------------------------------------------------------

    pub async fn set_dual_side_position(&self, dual: bool) -> Result<Value> {
        self.signed(Method::POST, "/fapi/v1/positionSide/dual", &[("dualSidePosition", dual.to_string())])
            .await
    }

    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<Value> {
        self.signed(
            Method::POST,
            "/fapi/v1/leverage",
            &[("symbol", symbol.to_string()), ("leverage", leverage.to_string())],
        )
        .await
    }

    pub async fn set_margin_type(&self, symbol: &str, is_cross: bool) -> Result<Value> {
        let margin_type = if is_cross { "CROSSED" } else { "ISOLATED" };
        self.signed(
            Method::POST,
            "/fapi/v1/marginType",
            &[("symbol", symbol.to_string()), ("marginType", margin_type.to_string())],
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_account_info(&self) -> Result<Value> {
        self.signed(Method::GET, "/fapi/v2/account", &[]).await
    }

    /// Position risk entries, optionally for a single symbol.
    pub async fn get_positions(&self, symbol: Option<&str>) -> Result<Value> {
        let params: Vec<(&str, String)> = symbol.map(|s| ("symbol", s.to_string())).into_iter().collect();
        self.signed(Method::GET, "/fapi/v2/positionRisk", &params).await
    }

    pub async fn get_exchange_info(&self) -> Result<Value> {
        self.public(Method::GET, "/fapi/v1/exchangeInfo", &[]).await
    }

    pub async fn get_ticker_price(&self, symbol: &str) -> Result<Value> {
        self.public(Method::GET, "/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await
    }

    pub async fn get_user_trades(&self, symbol: &str, limit: usize) -> Result<Value> {
        self.signed(
            Method::GET,
            "/fapi/v1/userTrades",
            &[("symbol", symbol.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Submit a market order and wait for the fill result.
    pub async fn place_market_order(&self, order: &MarketOrder<'_>) -> Result<Value> {
        let position_side = order.position_side.map_or("BOTH", PositionSide::as_str);
        let mut params = vec![
            ("symbol", order.symbol.to_string()),
            ("side", order.side.to_string()),
            ("positionSide", position_side.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", order.quantity.to_string()),
            ("newClientOrderId", order.client_order_id.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if order.reduce_only && order.position_side.is_none() {
            params.push(("reduceOnly", "true".to_string()));
        }
        self.signed(Method::POST, "/fapi/v1/order", &params).await
    }

    pub async fn cancel_all_orders(&self, symbol: &str) -> Result<Value> {
        self.signed(Method::DELETE, "/fapi/v1/allOpenOrders", &[("symbol", symbol.to_string())])
            .await
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    async fn signed(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let timestamp = time_util::offset_ms(time_util::now_ms(), self.time_offset_ms());
        let mut all: Vec<(&str, String)> = params.to_vec();
        all.push(("recvWindow", self.recv_window.to_string()));
        all.push(("timestamp", timestamp.to_string()));

        let query = auth::build_signed_query(&all, &self.secret_key);
        let url = format!("{}{path}?{query}", self.base_url);
        debug!("[binance-td] {method} {path} {params:?}");

        let resp = self
            .http
            .request(method.clone(), &url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| TradeError::Transport(format!("{method} {path}: {e}")))?;
        read_body(resp, method.as_str(), path).await
    }

    async fn public(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let query = auth::encode_query(params);
        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };
        let resp = self
            .http
            .request(method.clone(), &url)
            .send()
            .await
            .map_err(|e| TradeError::Transport(format!("{method} {path}: {e}")))?;
        read_body(resp, method.as_str(), path).await
    }
}

async fn read_body(resp: reqwest::Response, method: &str, path: &str) -> Result<Value> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| TradeError::Transport(format!("{method} {path}: read body: {e}")))?;

    if !status.is_success() {
        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let code = match parsed.get("code") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        let message = parsed
            .get("msg")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| text.clone());
        return Err(TradeError::Rejected {
            status: status.as_u16(),
            code,
            message,
        }
        .into());
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| TradeError::Parse(format!("{method} {path}: {e}")).into())
}
