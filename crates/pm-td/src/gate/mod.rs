//! Gate trading module.
//!
//! Implements the [`Trader`](crate::Trader) trait for Gate USDT-settled
//! perpetual futures over raw signed HTTP.
//!
//! # Architecture
//!
//! ```text
//! GateTrader
//! ├── GateClient        (signed REST, HMAC-SHA512)
//! ├── TtlCache<Balance>
//! ├── TtlCache<Vec<Position>>
//! └── trigger ids       (native price_orders per symbol/side/kind)
//! ```
//!
//! Sizes on the wire are signed whole contracts (positive buys, negative
//! sells); closes are sent `reduce_only`. Stop-loss and take-profit are
//! exchange-side `price_orders`, so this adapter needs no polling monitor.

pub mod auth;
pub mod client;
pub mod config;
pub mod symbol;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use pm_core::error::TradeError;
use pm_core::{Exchange, PositionSide, TriggerKind, trading::*};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use self::client::GateClient;
use self::config::GateTdConfig;
use self::symbol::{to_contract, to_unified};
use crate::cache::TtlCache;
use crate::event::{TdEvent, TdEventSender};
use crate::normalize::{millis, num, text};
use crate::notify::{Notifier, close_message};
use crate::price::{PriceSource, best_fill_price};
use crate::{Trader, order_id, quirks};

type TriggerKey = (String, PositionSide, TriggerKind);

/// `my_trades` page size when the caller passes 0.
const DEFAULT_TRADE_LIMIT: usize = 100;
/// `my_trades` hard limit.
const MAX_TRADE_LIMIT: usize = 1000;

/// Gate futures trader.
pub struct GateTrader {
    config: GateTdConfig,
    client: GateClient,
    balance_cache: TtlCache<Balance>,
    positions_cache: TtlCache<Vec<Position>>,
    /// Last native trigger order id per `(contract, side, kind)`.
    triggers: Mutex<HashMap<TriggerKey, String>>,
    notifier: Arc<dyn Notifier>,
    price_source: Option<Arc<dyn PriceSource>>,
    events: Option<TdEventSender>,
}

impl GateTrader {
    pub fn new(config: GateTdConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        if config.api_key.is_empty() || config.secret_key.is_empty() {
            return Err(TradeError::Config(format!("gate trader '{}': missing credentials", config.name)).into());
        }
        let client = GateClient::new(
            &config.api_key,
            &config.secret_key,
            &config.rest_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Ok(Self {
            client,
            balance_cache: TtlCache::new(ttl),
            positions_cache: TtlCache::new(ttl),
            triggers: Mutex::new(HashMap::new()),
            notifier,
            price_source: None,
            events: None,
            config,
        })
    }

    pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.price_source = Some(source);
        self
    }

    pub fn with_events(mut self, events: TdEventSender) -> Self {
        self.events = Some(events);
        self
    }

    async fn invalidate(&self) {
        self.positions_cache.invalidate().await;
        self.balance_cache.invalidate().await;
    }

    /// Raw position entry for one contract, including zero-size ones.
    async fn raw_position(&self, contract: &str) -> Result<Value> {
        self.client.get(&format!("/positions/{contract}"), &[]).await
    }

    async fn post_leverage(&self, contract: &str, body: Value) -> Result<()> {
        self.client
            .post(&format!("/positions/{contract}/leverage"), &body)
            .await
            .map(|_| ())
    }

    /// Submit a market IOC order with a signed contract size.
    async fn place_order(&self, contract: &str, size: i64, reduce_only: bool) -> Result<(Value, String)> {
        let text_id = order_id::generate("t-", &self.config.order_tag, order_id::GATE_MAX_LEN);
        let body = json!({
            "contract": contract,
            "size": size,
            "price": "0",
            "tif": "ioc",
            "text": text_id,
            "reduce_only": reduce_only,
        });
        let resp = self
            .client
            .post("/orders", &body)
            .await
            .with_context(|| format!("place order {contract} size={size}"))?;
        Ok((resp, text_id))
    }

    async fn order_result(&self, symbol: &str, resp: &Value, client_order_id: String, quantity: f64) -> OrderResult {
        let reported = Some(num(resp, "fill_price"));
        let ticker = if reported.is_some_and(|p| p > 0.0) {
            None
        } else {
            self.get_market_price(symbol).await.ok()
        };
        OrderResult {
            order_id: text(resp, "id"),
            client_order_id,
            symbol: symbol.to_string(),
            status: text(resp, "status"),
            quantity,
            price: best_fill_price(reported, self.price_source.as_deref(), symbol, ticker),
        }
    }

    async fn open(&self, symbol: &str, side: PositionSide, quantity: f64, leverage: u32) -> Result<OrderResult> {
        let contract = to_contract(symbol);

        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!("[gate-td] {contract} cancel stale orders failed: {e:#}");
        }
        if let Err(e) = self.cancel_stop_orders(symbol).await {
            warn!("[gate-td] {contract} cancel stale triggers failed: {e:#}");
        }
        let result = self.set_leverage(symbol, leverage).await;
        quirks::tolerate(result, &format!("set leverage {leverage}x on {contract}"))?;

        let contracts = quantity.trunc() as i64;
        if contracts < 1 {
            return Err(TradeError::OrderTooSmall(format!("{contract}: {quantity} rounds to 0 contracts")).into());
        }
        if let Some(min) = self.config.min_notional.filter(|min| (contracts as f64) < *min) {
            return Err(
                TradeError::OrderTooSmall(format!("{contract}: notional {contracts} below minimum {min}")).into(),
            );
        }
        let size = match side {
            PositionSide::Long => contracts,
            PositionSide::Short => -contracts,
        };

        let (resp, cid) = self.place_order(&contract, size, false).await?;
        self.invalidate().await;
        let result = self.order_result(symbol, &resp, cid, contracts as f64).await;
        info!(
            "[gate-td] opened {side} {contract} contracts={contracts} lev={leverage}x id={} price={:?}",
            result.order_id, result.price
        );
        Ok(result)
    }

    async fn close(&self, symbol: &str, side: PositionSide, quantity: f64) -> Result<OrderResult> {
        let contract = to_contract(symbol);
        let unified = to_unified(&contract);

        self.positions_cache.invalidate().await;
        let positions = self.get_positions().await?;
        let Some(pos) = positions.iter().find(|p| p.symbol == unified && p.side == side) else {
            return Err(TradeError::no_position(&unified, side).into());
        };

        let size = pos.size();
        let amount = if quantity > 0.0 { quantity.min(size) } else { size };
        let contracts = amount.trunc() as i64;
        if contracts < 1 {
            return Err(TradeError::OrderTooSmall(format!("{contract}: close {amount} rounds to 0 contracts")).into());
        }

        if let Err(e) = self.cancel_triggers(&contract, Some(side), None).await {
            warn!("[gate-td] {contract} cancel {side} triggers failed: {e:#}");
        }

        let wire_size = match side {
            PositionSide::Long => -contracts,
            PositionSide::Short => contracts,
        };
        let (resp, cid) = self.place_order(&contract, wire_size, true).await?;

        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!("[gate-td] {contract} cancel remaining orders failed: {e:#}");
        }
        self.invalidate().await;

        let result = self.order_result(&unified, &resp, cid, contracts as f64).await;
        info!(
            "[gate-td] closed {side} {contract} contracts={contracts} id={} price={:?}",
            result.order_id, result.price
        );
        self.notifier.notify(&close_message(
            Exchange::Gate,
            &self.config.name,
            &unified,
            side,
            result.quantity,
            result.price,
        ));
        if let Some(tx) = &self.events {
            let _ = tx.send(TdEvent::PositionClosed {
                exchange: Exchange::Gate,
                symbol: unified,
                side,
                quantity: result.quantity,
                price: result.price,
            });
        }
        Ok(result)
    }

    /// Place or replace the native trigger for `(symbol, side, kind)`.
    async fn place_trigger(
        &self,
        symbol: &str,
        side: PositionSide,
        kind: TriggerKind,
        quantity: f64,
        price: f64,
    ) -> Result<()> {
        if !(price.is_finite() && price > 0.0) {
            return Err(anyhow!("{kind} price must be positive, got {price}"));
        }
        let contract = to_contract(symbol);
        let key = (contract.clone(), side, kind);

        let previous = self.triggers.lock().await.remove(&key);
        if let Some(id) = previous {
            if let Err(e) = self.client.delete(&format!("/price_orders/{id}"), &[]).await {
                debug!("[gate-td] replacing {kind} {id} on {contract}: cancel failed: {e:#}");
            }
        }

        // rule 1: price >= trigger, rule 2: price <= trigger
        let rule = match (side, kind) {
            (PositionSide::Long, TriggerKind::StopLoss) | (PositionSide::Short, TriggerKind::TakeProfit) => 2,
            (PositionSide::Long, TriggerKind::TakeProfit) | (PositionSide::Short, TriggerKind::StopLoss) => 1,
        };
        let contracts = quantity.trunc() as i64;
        let mut initial = json!({
            "contract": contract,
            "price": "0",
            "tif": "ioc",
            "reduce_only": true,
            "text": order_id::generate("t-", &self.config.order_tag, order_id::GATE_MAX_LEN),
        });
        if contracts >= 1 {
            initial["size"] = json!(match side {
                PositionSide::Long => -contracts,
                PositionSide::Short => contracts,
            });
        } else {
            initial["size"] = json!(0);
            initial["close"] = json!(true);
        }
        let body = json!({
            "initial": initial,
            "trigger": {
                "strategy_type": 0,
                "price_type": 0,
                "price": price.to_string(),
                "rule": rule,
                "expiration": 0,
            },
        });

        let resp = self
            .client
            .post("/price_orders", &body)
            .await
            .with_context(|| format!("place {kind} trigger on {contract}"))?;
        let id = text(&resp, "id");
        info!("[gate-td] {kind} for {side} {contract} at {price} (id={id})");
        if !id.is_empty() {
            self.triggers.lock().await.insert(key, id);
        }
        Ok(())
    }

    /// Cancel recorded triggers matching the filters. Missing orders count as cancelled.
    async fn cancel_triggers(
        &self,
        contract: &str,
        side: Option<PositionSide>,
        kind: Option<TriggerKind>,
    ) -> Result<usize> {
        let ids: Vec<String> = {
            let mut map = self.triggers.lock().await;
            let keys: Vec<TriggerKey> = map
                .keys()
                .filter(|(c, s, k)| {
                    c == contract && side.is_none_or(|want| want == *s) && kind.is_none_or(|want| want == *k)
                })
                .cloned()
                .collect();
            keys.iter().filter_map(|k| map.remove(k)).collect()
        };

        for id in &ids {
            if let Err(e) = self.client.delete(&format!("/price_orders/{id}"), &[]).await {
                debug!("[gate-td] cancel trigger {id} on {contract}: {e:#}");
            }
        }
        Ok(ids.len())
    }
}

#[async_trait]
impl Trader for GateTrader {
    fn exchange(&self) -> Exchange {
        Exchange::Gate
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn login(&self, timeout: Duration) -> Result<()> {
        let balance = tokio::time::timeout(timeout, self.get_balance())
            .await
            .map_err(|_| anyhow!("[gate-td] login timed out after {timeout:?}"))??;
        info!(
            "[gate-td] {} login complete, wallet={} available={}",
            self.config.name, balance.total_wallet_balance, balance.available_balance
        );
        Ok(())
    }

    async fn get_balance(&self) -> Result<Balance> {
        self.balance_cache
            .get_or_fetch(|| async {
                let v = self.client.get("/accounts", &[]).await.context("gate balance")?;
                Ok::<_, anyhow::Error>(parse_balance(&v))
            })
            .await
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        self.positions_cache
            .get_or_fetch(|| async {
                let v = self.client.get("/positions", &[]).await.context("gate positions")?;
                Ok::<_, anyhow::Error>(parse_positions(&v))
            })
            .await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let contract = to_contract(symbol);
        match self.raw_position(&contract).await {
            Ok(pos) if (num(&pos, "leverage") - f64::from(leverage)).abs() < f64::EPSILON => {
                debug!("[gate-td] {contract} leverage already {leverage}x");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => debug!("[gate-td] {contract} current leverage unknown: {e:#}"),
        }

        let result = self
            .post_leverage(&contract, json!({ "leverage": leverage.to_string() }))
            .await;
        match result {
            Ok(()) => {
                info!("[gate-td] {contract} leverage set to {leverage}x");
                self.positions_cache.invalidate().await;
                tokio::time::sleep(Duration::from_secs(self.config.leverage_cooldown_secs)).await;
                Ok(())
            }
            Err(e) if quirks::classify(&e) == quirks::Quirk::Benign => {
                debug!("[gate-td] {contract} leverage unchanged: {e:#}");
                Ok(())
            }
            Err(e) if quirks::classify(&e) == quirks::Quirk::Permission => {
                Err(TradeError::PermissionDenied(format!("set leverage on {contract}: {e:#}")).into())
            }
            Err(e) => Err(e.context(format!("set leverage {leverage}x on {contract}"))),
        }
    }

    /// Gate encodes cross margin as leverage `0` plus a `cross_leverage_limit`.
    async fn set_margin_mode(&self, symbol: &str, is_cross: bool) -> Result<()> {
        let contract = to_contract(symbol);
        let what = format!("set {} margin on {contract}", if is_cross { "cross" } else { "isolated" });

        let pos = match self.raw_position(&contract).await {
            Ok(p) => p,
            Err(e) => return quirks::tolerate(Err(e), &what),
        };
        let leverage = num(&pos, "leverage");
        let cross_limit = num(&pos, "cross_leverage_limit");
        let currently_cross = leverage == 0.0;
        if currently_cross == is_cross {
            debug!("[gate-td] {contract} margin mode unchanged");
            return Ok(());
        }

        let body = if is_cross {
            json!({ "leverage": "0", "cross_leverage_limit": (leverage.max(1.0) as u32).to_string() })
        } else {
            json!({ "leverage": (cross_limit.max(1.0) as u32).to_string() })
        };
        let result = self.post_leverage(&contract, body).await;
        if result.is_ok() {
            info!("[gate-td] {what}");
            self.positions_cache.invalidate().await;
        }
        quirks::tolerate(result, &what)
    }

    async fn open_long(&self, symbol: &str, quantity: f64, leverage: u32) -> Result<OrderResult> {
        self.open(symbol, PositionSide::Long, quantity, leverage).await
    }

    async fn open_short(&self, symbol: &str, quantity: f64, leverage: u32) -> Result<OrderResult> {
        self.open(symbol, PositionSide::Short, quantity, leverage).await
    }

    async fn close_long(&self, symbol: &str, quantity: f64) -> Result<OrderResult> {
        self.close(symbol, PositionSide::Long, quantity).await
    }

    async fn close_short(&self, symbol: &str, quantity: f64) -> Result<OrderResult> {
        self.close(symbol, PositionSide::Short, quantity).await
    }

    async fn set_stop_loss(&self, symbol: &str, side: PositionSide, quantity: f64, price: f64) -> Result<()> {
        self.place_trigger(symbol, side, TriggerKind::StopLoss, quantity, price).await
    }

    async fn set_take_profit(&self, symbol: &str, side: PositionSide, quantity: f64, price: f64) -> Result<()> {
        self.place_trigger(symbol, side, TriggerKind::TakeProfit, quantity, price).await
    }

    async fn cancel_stop_loss_orders(&self, symbol: &str) -> Result<()> {
        let n = self.cancel_triggers(&to_contract(symbol), None, Some(TriggerKind::StopLoss)).await?;
        debug!("[gate-td] {symbol} cancelled {n} stop-loss triggers");
        Ok(())
    }

    async fn cancel_take_profit_orders(&self, symbol: &str) -> Result<()> {
        let n = self.cancel_triggers(&to_contract(symbol), None, Some(TriggerKind::TakeProfit)).await?;
        debug!("[gate-td] {symbol} cancelled {n} take-profit triggers");
        Ok(())
    }

    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        let contract = to_contract(symbol);
        self.triggers.lock().await.retain(|(c, _, _), _| *c != contract);
        self.client
            .delete("/price_orders", &[("contract", contract.clone())])
            .await
            .with_context(|| format!("cancel triggers on {contract}"))?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let contract = to_contract(symbol);
        self.client
            .delete("/orders", &[("contract", contract.clone())])
            .await
            .with_context(|| format!("cancel orders on {contract}"))?;
        Ok(())
    }

    async fn get_market_price(&self, symbol: &str) -> Result<f64> {
        let contract = to_contract(symbol);
        let v = self.client.get_public("/tickers", &[("contract", contract.clone())]).await?;
        let ticker = v
            .as_array()
            .and_then(|a| a.iter().find(|t| text(t, "contract") == contract).or_else(|| a.first()))
            .ok_or_else(|| TradeError::Parse(format!("no ticker for {contract}")))?;
        let last = num(ticker, "last");
        let price = if last > 0.0 { last } else { num(ticker, "mark_price") };
        if price <= 0.0 {
            return Err(TradeError::Parse(format!("no usable price for {contract}")).into());
        }
        Ok(price)
    }

    async fn format_quantity(&self, _symbol: &str, quantity: f64) -> Result<String> {
        Ok(format!("{quantity:.0}"))
    }

    async fn get_trade_history(&self, symbol: &str, limit: usize) -> Result<Vec<TradeRecord>> {
        let contract = to_contract(symbol);
        let limit = if limit == 0 { DEFAULT_TRADE_LIMIT } else { limit.min(MAX_TRADE_LIMIT) };
        let v = self
            .client
            .get("/my_trades", &[("contract", contract.clone()), ("limit", limit.to_string())])
            .await
            .with_context(|| format!("trade history for {contract}"))?;
        Ok(parse_trades(&v))
    }

    async fn shutdown(&self) -> Result<()> {
        info!("[gate-td] {} stopped", self.config.name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON → typed helpers
// ---------------------------------------------------------------------------

/// `/accounts` → [`Balance`].
pub fn parse_balance(v: &Value) -> Balance {
    let wallet = if v.get("cross_margin_balance").is_some() {
        num(v, "cross_margin_balance")
    } else {
        num(v, "total")
    };
    let unrealized = if v.get("cross_unrealised_pnl").is_some() {
        num(v, "cross_unrealised_pnl")
    } else {
        num(v, "unrealised_pnl")
    };
    Balance {
        total_wallet_balance: wallet,
        available_balance: num(v, "available"),
        total_unrealized_profit: unrealized,
    }
}

/// `/positions` → non-zero [`Position`]s with unified symbols.
pub fn parse_positions(v: &Value) -> Vec<Position> {
    let Some(arr) = v.as_array() else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|p| {
            let size = num(p, "size");
            if size == 0.0 {
                return None;
            }
            Some(Position {
                symbol: to_unified(&text(p, "contract")),
                position_amt: size,
                entry_price: num(p, "entry_price"),
                mark_price: num(p, "mark_price"),
                unrealized_pnl: num(p, "unrealised_pnl"),
                leverage: num(p, "leverage"),
                liquidation_price: num(p, "liq_price"),
                side: PositionSide::from_signed(size),
            })
        })
        .collect()
}

/// `/my_trades` → [`TradeRecord`]s.
pub fn parse_trades(v: &Value) -> Vec<TradeRecord> {
    let Some(arr) = v.as_array() else {
        return Vec::new();
    };
    arr.iter()
        .map(|t| {
            let size = num(t, "size");
            TradeRecord {
                symbol: to_unified(&text(t, "contract")),
                order_id: text(t, "order_id"),
                side: if size >= 0.0 { "BUY" } else { "SELL" }.to_string(),
                price: num(t, "price"),
                quantity: size.abs(),
                realized_pnl: num(t, "pnl"),
                commission: num(t, "fee"),
                time_ms: millis(t, "create_time", true),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn balance_from_string_fields() {
        let b = parse_balance(&json!({
            "cross_margin_balance": "10.51",
            "available": "8.2",
            "cross_unrealised_pnl": "-0.3",
            "total": "999"
        }));
        assert_eq!(b.total_wallet_balance, 10.51);
        assert_eq!(b.available_balance, 8.2);
        assert_eq!(b.total_unrealized_profit, -0.3);
    }

    #[test]
    fn positions_skip_zero_and_unify_symbol() {
        let ps = parse_positions(&json!([
            { "contract": "BTC_USDT", "size": -12, "entry_price": "45000", "mark_price": "44900",
              "unrealised_pnl": "0.12", "leverage": "20", "liq_price": "60000" },
            { "contract": "ETH_USDT", "size": 0, "leverage": "10" }
        ]));
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].symbol, "BTCUSDT");
        assert_eq!(ps[0].side, PositionSide::Short);
        assert_eq!(ps[0].position_amt, -12.0);
        assert_eq!(ps[0].leverage, 20.0);
    }

    #[test]
    fn trades_normalised() {
        let ts = parse_trades(&json!([
            { "contract": "BTC_USDT", "order_id": "77", "size": -3, "price": "45000.5",
              "fee": "0.01", "create_time": 1700000000.25 }
        ]));
        assert_eq!(ts[0].side, "SELL");
        assert_eq!(ts[0].quantity, 3.0);
        assert_eq!(ts[0].time_ms, 1_700_000_000_250);
    }
}
