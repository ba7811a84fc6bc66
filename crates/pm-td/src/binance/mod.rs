//! Binance trading module.
//!
//! Implements the [`Trader`](crate::Trader) trait for Binance USDT-margined
//! perpetual futures (`https://fapi.binance.com`).
//!
//! # Architecture
//!
//! ```text
//! BinanceTrader
//! ├── FuturesClient          (signed REST, HMAC-SHA256, server-time offset)
//! ├── TtlCache<Balance>
//! ├── TtlCache<Vec<Position>>
//! ├── PrecisionTable         (LOT_SIZE / MIN_NOTIONAL from exchangeInfo)
//! └── SlTpBook               (polled by an SlTpMonitor owned by the handle)
//! ```
//!
//! Binance trigger orders are not used: stop-loss and take-profit are kept in
//! the local [`SlTpBook`] and enforced by the polling monitor. Quantities are
//! in the base asset and quantised down to the symbol's step size.

pub mod auth;
pub mod config;
pub mod futures;
pub mod precision;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use pm_core::error::TradeError;
use pm_core::{Exchange, PositionSide, trading::*};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use self::config::BinanceTdConfig;
use self::futures::{FuturesClient, MarketOrder};
use self::precision::{PrecisionTable, SymbolRules};
use crate::cache::TtlCache;
use crate::event::{TdEvent, TdEventSender};
use crate::normalize::{millis, num, text};
use crate::notify::{Notifier, close_message};
use crate::price::{PriceSource, best_fill_price};
use crate::sltp::SlTpBook;
use crate::{Trader, order_id, quirks};

/// Default `userTrades` page size.
const DEFAULT_TRADE_LIMIT: usize = 500;
/// `userTrades` hard limit.
const MAX_TRADE_LIMIT: usize = 1000;

/// Binance futures trader.
pub struct BinanceTrader {
    config: BinanceTdConfig,
    client: FuturesClient,
    balance_cache: TtlCache<Balance>,
    positions_cache: TtlCache<Vec<Position>>,
    precision: RwLock<PrecisionTable>,
    book: SlTpBook,
    notifier: Arc<dyn Notifier>,
    price_source: Option<Arc<dyn PriceSource>>,
    events: Option<TdEventSender>,
}

impl BinanceTrader {
    pub fn new(config: BinanceTdConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        if config.api_key.is_empty() || config.secret_key.is_empty() {
            return Err(TradeError::Config(format!("binance trader '{}': missing credentials", config.name)).into());
        }
        let client = FuturesClient::new(
            &config.api_key,
            &config.secret_key,
            &config.rest_url,
            config.recv_window,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Ok(Self {
            client,
            balance_cache: TtlCache::new(ttl),
            positions_cache: TtlCache::new(ttl),
            precision: RwLock::new(PrecisionTable::new()),
            book: SlTpBook::new(),
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

    pub fn config(&self) -> &BinanceTdConfig {
        &self.config
    }

    async fn invalidate(&self) {
        self.positions_cache.invalidate().await;
        self.balance_cache.invalidate().await;
    }

    /// Position side sent on the wire; `None` in one-way mode.
    fn wire_side(&self, side: PositionSide) -> Option<PositionSide> {
        self.config.hedge_mode.then_some(side)
    }

    /// Trading rules for a symbol, loading `exchangeInfo` on first use.
    async fn rules_for(&self, symbol: &str) -> SymbolRules {
        if let Some(rules) = self.precision.read().await.get(symbol) {
            return rules;
        }

        let info = self.client.get_exchange_info().await;
        let mut table = self.precision.write().await;
        match info {
            Ok(info) => {
                table.load_from_exchange_info(&info);
                debug!("[binance-td] loaded rules for {} symbols", table.len());
            }
            Err(e) => warn!("[binance-td] exchangeInfo failed, using default precision for {symbol}: {e:#}"),
        }
        if let Some(rules) = table.get(symbol) {
            return rules;
        }
        let rules = SymbolRules::default();
        table.insert(symbol, rules);
        rules
    }

    async fn submit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: &str,
        closing: bool,
    ) -> Result<(Value, String)> {
        let direction = if closing { side.close_direction() } else { side.open_direction() };
        let cid = order_id::generate("x-", &self.config.broker_tag, order_id::BINANCE_MAX_LEN);
        let order = MarketOrder {
            symbol,
            side: direction.as_str(),
            position_side: self.wire_side(side),
            quantity,
            client_order_id: &cid,
            reduce_only: closing,
        };
        let resp = self
            .client
            .place_market_order(&order)
            .await
            .with_context(|| format!("{} {symbol} {side} qty={quantity}", direction.as_str()))?;
        Ok((resp, cid))
    }

    async fn order_result(
        &self,
        symbol: &str,
        resp: &Value,
        client_order_id: String,
        quantity: f64,
        ticker: Option<f64>,
    ) -> OrderResult {
        let reported = Some(num(resp, "avgPrice"));
        let ticker = match ticker {
            Some(p) => Some(p),
            None if reported.is_some_and(|p| p > 0.0) => None,
            None => self.get_market_price(symbol).await.ok(),
        };
        let executed = num(resp, "executedQty");
        OrderResult {
            order_id: text(resp, "orderId"),
            client_order_id,
            symbol: symbol.to_string(),
            status: text(resp, "status"),
            quantity: if executed > 0.0 { executed } else { quantity },
            price: best_fill_price(reported, self.price_source.as_deref(), symbol, ticker),
        }
    }

    async fn open(&self, symbol: &str, side: PositionSide, quantity: f64, leverage: u32) -> Result<OrderResult> {
        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!("[binance-td] {symbol} cancel stale orders failed: {e:#}");
        }
        self.cancel_stop_orders(symbol).await?;
        let result = self.set_leverage(symbol, leverage).await;
        quirks::tolerate(result, &format!("set leverage {leverage}x on {symbol}"))?;

        let rules = self.rules_for(symbol).await;
        let qty = precision::quantize(quantity, rules.quantity_precision);
        if qty <= 0.0 {
            return Err(TradeError::OrderTooSmall(format!(
                "{symbol}: {quantity} rounds to 0 at precision {}",
                rules.quantity_precision
            ))
            .into());
        }

        let price = self.get_market_price(symbol).await?;
        let min_notional = self.config.effective_min_notional(rules.min_notional);
        let notional = qty * price;
        if notional < min_notional {
            return Err(TradeError::OrderTooSmall(format!(
                "{symbol}: notional {notional:.4} below minimum {min_notional}"
            ))
            .into());
        }

        let qty_str = precision::format_quantity(qty, rules.quantity_precision);
        let (resp, cid) = self.submit(symbol, side, &qty_str, false).await?;
        self.invalidate().await;

        let result = self.order_result(symbol, &resp, cid, qty, Some(price)).await;
        info!(
            "[binance-td] opened {side} {symbol} qty={qty_str} lev={leverage}x id={} price={:?}",
            result.order_id, result.price
        );
        Ok(result)
    }

    async fn close(&self, symbol: &str, side: PositionSide, quantity: f64) -> Result<OrderResult> {
        self.positions_cache.invalidate().await;
        let positions = self.get_positions().await?;
        let Some(pos) = positions.iter().find(|p| p.symbol == symbol && p.side == side) else {
            return Err(TradeError::no_position(symbol, side).into());
        };

        let size = pos.size();
        let amount = if quantity > 0.0 { quantity.min(size) } else { size };
        let rules = self.rules_for(symbol).await;
        let qty = precision::quantize(amount, rules.quantity_precision);
        if qty <= 0.0 {
            return Err(TradeError::OrderTooSmall(format!("{symbol}: close {amount} rounds to 0")).into());
        }

        // Only this side's conditions; the opposite hedge leg stays protected.
        let cancelled = self.book.cancel_side(symbol, side).await;
        debug!("[binance-td] {symbol} {side} cleared {cancelled} SL/TP conditions");

        let qty_str = precision::format_quantity(qty, rules.quantity_precision);
        let (resp, cid) = self.submit(symbol, side, &qty_str, true).await?;

        if let Err(e) = self.cancel_all_orders(symbol).await {
            warn!("[binance-td] {symbol} cancel remaining orders failed: {e:#}");
        }
        self.invalidate().await;

        let result = self.order_result(symbol, &resp, cid, qty, None).await;
        info!(
            "[binance-td] closed {side} {symbol} qty={qty_str} id={} price={:?}",
            result.order_id, result.price
        );
        self.notifier.notify(&close_message(
            Exchange::Binance,
            &self.config.name,
            symbol,
            side,
            result.quantity,
            result.price,
        ));
        if let Some(tx) = &self.events {
            let _ = tx.send(TdEvent::PositionClosed {
                exchange: Exchange::Binance,
                symbol: symbol.to_string(),
                side,
                quantity: result.quantity,
                price: result.price,
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl Trader for BinanceTrader {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn login(&self, timeout: Duration) -> Result<()> {
        let prepare = async {
            if let Err(e) = self.client.sync_time().await {
                warn!("[binance-td] server time sync failed, using local clock: {e:#}");
            }
            if self.config.hedge_mode {
                let result = self.client.set_dual_side_position(true).await.map(|_| ());
                if result.is_ok() {
                    info!("[binance-td] {} switched to hedge mode", self.config.name);
                }
                quirks::tolerate(result, "enable hedge mode")?;
            }
            self.get_balance().await
        };
        let balance = tokio::time::timeout(timeout, prepare)
            .await
            .map_err(|_| anyhow!("[binance-td] login timed out after {timeout:?}"))??;
        info!(
            "[binance-td] {} login complete, wallet={} available={}",
            self.config.name, balance.total_wallet_balance, balance.available_balance
        );
        Ok(())
    }

    async fn get_balance(&self) -> Result<Balance> {
        self.balance_cache
            .get_or_fetch(|| async {
                let v = self.client.get_account_info().await.context("binance balance")?;
                Ok::<_, anyhow::Error>(parse_balance(&v))
            })
            .await
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        self.positions_cache
            .get_or_fetch(|| async {
                let v = self.client.get_positions(None).await.context("binance positions")?;
                Ok::<_, anyhow::Error>(parse_positions(&v))
            })
            .await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        match self.client.get_positions(Some(symbol)).await {
            Ok(v) => {
                let current = v
                    .as_array()
                    .and_then(|a| a.iter().find(|p| text(p, "symbol") == symbol))
                    .map(|p| num(p, "leverage"));
                if current.is_some_and(|l| (l - f64::from(leverage)).abs() < f64::EPSILON) {
                    debug!("[binance-td] {symbol} leverage already {leverage}x");
                    return Ok(());
                }
            }
            Err(e) => debug!("[binance-td] {symbol} current leverage unknown: {e:#}"),
        }

        let result = self.client.set_leverage(symbol, leverage).await.map(|_| ());
        match result {
            Ok(()) => {
                info!("[binance-td] {symbol} leverage set to {leverage}x");
                self.positions_cache.invalidate().await;
                tokio::time::sleep(Duration::from_secs(self.config.leverage_cooldown_secs)).await;
                Ok(())
            }
            Err(e) if quirks::classify(&e) == quirks::Quirk::Benign => {
                debug!("[binance-td] {symbol} leverage unchanged: {e:#}");
                Ok(())
            }
            Err(e) if quirks::classify(&e) == quirks::Quirk::Permission => {
                Err(TradeError::PermissionDenied(format!("set leverage on {symbol}: {e:#}")).into())
            }
            Err(e) => Err(e.context(format!("set leverage {leverage}x on {symbol}"))),
        }
    }

    async fn set_margin_mode(&self, symbol: &str, is_cross: bool) -> Result<()> {
        let what = format!("set {} margin on {symbol}", if is_cross { "cross" } else { "isolated" });
        let result = self.client.set_margin_type(symbol, is_cross).await.map(|_| ());
        if result.is_ok() {
            info!("[binance-td] {what}");
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
        if !(price.is_finite() && price > 0.0) {
            return Err(anyhow!("stop-loss price must be positive, got {price}"));
        }
        self.book.upsert_stop_loss(symbol, side, quantity, price).await;
        info!("[binance-td] stop-loss for {side} {symbol} at {price} qty={quantity}");
        Ok(())
    }

    async fn set_take_profit(&self, symbol: &str, side: PositionSide, quantity: f64, price: f64) -> Result<()> {
        if !(price.is_finite() && price > 0.0) {
            return Err(anyhow!("take-profit price must be positive, got {price}"));
        }
        self.book.upsert_take_profit(symbol, side, quantity, price).await;
        info!("[binance-td] take-profit for {side} {symbol} at {price} qty={quantity}");
        Ok(())
    }

    async fn cancel_stop_loss_orders(&self, symbol: &str) -> Result<()> {
        let n = self.book.cancel_stop_loss(symbol).await;
        debug!("[binance-td] {symbol} cleared stop-loss on {n} conditions");
        Ok(())
    }

    async fn cancel_take_profit_orders(&self, symbol: &str) -> Result<()> {
        let n = self.book.cancel_take_profit(symbol).await;
        debug!("[binance-td] {symbol} cleared take-profit on {n} conditions");
        Ok(())
    }

    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        let n = self.book.cancel_symbol(symbol).await;
        debug!("[binance-td] {symbol} cleared {n} SL/TP conditions");
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        self.client
            .cancel_all_orders(symbol)
            .await
            .with_context(|| format!("cancel orders on {symbol}"))?;
        Ok(())
    }

    async fn get_market_price(&self, symbol: &str) -> Result<f64> {
        let v = self.client.get_ticker_price(symbol).await?;
        let price = num(&v, "price");
        if price <= 0.0 {
            return Err(TradeError::Parse(format!("no usable price for {symbol}")).into());
        }
        Ok(price)
    }

    async fn format_quantity(&self, symbol: &str, quantity: f64) -> Result<String> {
        let rules = self.rules_for(symbol).await;
        Ok(precision::format_quantity(quantity, rules.quantity_precision))
    }

    async fn get_trade_history(&self, symbol: &str, limit: usize) -> Result<Vec<TradeRecord>> {
        let limit = if limit == 0 { DEFAULT_TRADE_LIMIT } else { limit.min(MAX_TRADE_LIMIT) };
        let v = self
            .client
            .get_user_trades(symbol, limit)
            .await
            .with_context(|| format!("trade history for {symbol}"))?;
        Ok(parse_trades(&v))
    }

    /// USD-notional contracts divided by the current price.
    async fn quantity_for_contracts(&self, symbol: &str, contracts: i64) -> Result<f64> {
        let price = self.get_market_price(symbol).await?;
        Ok(finite_or_zero(contracts as f64 / price))
    }

    fn sltp_book(&self) -> Option<&SlTpBook> {
        Some(&self.book)
    }

    async fn shutdown(&self) -> Result<()> {
        info!("[binance-td] {} stopped", self.config.name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON → typed helpers
// ---------------------------------------------------------------------------

/// `/fapi/v2/account` → [`Balance`].
pub fn parse_balance(v: &Value) -> Balance {
    Balance {
        total_wallet_balance: num(v, "totalWalletBalance"),
        available_balance: num(v, "availableBalance"),
        total_unrealized_profit: num(v, "totalUnrealizedProfit"),
    }
}

/// `/fapi/v2/positionRisk` → non-zero [`Position`]s.
///
/// The side comes from `positionSide` in hedge mode and from the sign of
/// `positionAmt` for one-way (`BOTH`) entries.
pub fn parse_positions(v: &Value) -> Vec<Position> {
    let Some(arr) = v.as_array() else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|p| {
            let amt = num(p, "positionAmt");
            if amt == 0.0 {
                return None;
            }
            let side = text(p, "positionSide")
                .parse::<PositionSide>()
                .unwrap_or_else(|_| PositionSide::from_signed(amt));
            Some(Position {
                symbol: text(p, "symbol"),
                position_amt: amt,
                entry_price: num(p, "entryPrice"),
                mark_price: num(p, "markPrice"),
                unrealized_pnl: num(p, "unRealizedProfit"),
                leverage: num(p, "leverage"),
                liquidation_price: num(p, "liquidationPrice"),
                side,
            })
        })
        .collect()
}

/// `/fapi/v1/userTrades` → [`TradeRecord`]s.
pub fn parse_trades(v: &Value) -> Vec<TradeRecord> {
    let Some(arr) = v.as_array() else {
        return Vec::new();
    };
    arr.iter()
        .map(|t| TradeRecord {
            symbol: text(t, "symbol"),
            order_id: text(t, "orderId"),
            side: text(t, "side"),
            price: num(t, "price"),
            quantity: num(t, "qty"),
            realized_pnl: num(t, "realizedPnl"),
            commission: num(t, "commission"),
            time_ms: millis(t, "time", false),
        })
        .collect()
}
