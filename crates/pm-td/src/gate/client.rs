//! Signed HTTP transport for the Gate futures API.
//!
//! | Operation           | Method | Path                              |
//! |---------------------|--------|-----------------------------------|
//! | Account             | GET    | `/accounts`                       |
//! | Positions           | GET    | `/positions`                      |
//! | Single position     | GET    | `/positions/{contract}`           |
//! | Leverage            | POST   | `/positions/{contract}/leverage`  |
//! | Place order         | POST   | `/orders`                         |
//! | Cancel open orders  | DELETE | `/orders`                         |
//! | Ticker              | GET    | `/tickers`                        |
//! | Trigger orders      | POST / DELETE | `/price_orders`            |
//! | Fills               | GET    | `/my_trades`                      |
//!
//! Non-2xx answers with a `{label, message}` body become
//! [`TradeError::Rejected`]; network failures become [`TradeError::Transport`].

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use pm_core::error::TradeError;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::auth::{PATH_PREFIX, Signer, canonical_query, is_read_method};

/// Gate futures REST client.
pub struct GateClient {
    http: reqwest::Client,
    signer: Signer,
    /// Host, e.g. `https://api.gateio.ws`.
    base_url: String,
}

impl GateClient {
    pub fn new(api_key: &str, secret_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TradeError::Transport(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            signer: Signer::new(api_key, secret_key),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        self.send(Method::GET, path, params, None).await
    }

    pub async fn delete(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        self.send(Method::DELETE, path, params, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    /// Unsigned public GET.
    pub async fn get_public(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{PATH_PREFIX}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| TradeError::Transport(format!("GET {path}: {e}")))?;
        read_body(resp, "GET", path).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let params: BTreeMap<String, String> =
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let body_text = match body {
            Some(v) => serde_json::to_string(v).map_err(TradeError::from)?,
            None => String::new(),
        };

        let headers = self.signer.sign(method.as_str(), path, &params, &body_text);
        let url = format!("{}{PATH_PREFIX}{path}", self.base_url);

        // The query on the wire must be byte-identical to the signed one.
        let read = is_read_method(method.as_str());
        let url = if read && !params.is_empty() {
            format!("{url}?{}", canonical_query(&params))
        } else {
            url
        };
        let mut req = self.http.request(method.clone(), &url);
        if !read {
            req = req.body(body_text);
        }
        for (name, value) in headers {
            req = req.header(name, value);
        }

        debug!("[gate-td] {method} {path} {params:?}");
        let resp = req
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
        let code = parsed.get("label").and_then(Value::as_str).unwrap_or("").to_string();
        let message = parsed
            .get("message")
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
