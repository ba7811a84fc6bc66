//! Scripted in-memory trader shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use pm_core::error::TradeError;
use pm_core::{Balance, Exchange, OrderResult, Position, PositionSide, TradeRecord};
use pm_td::Trader;
use pm_td::sltp::SlTpBook;

/// Records every call as a short string and answers from scripted state.
#[derive(Default)]
pub struct MockTrader {
    pub calls: Mutex<Vec<String>>,
    pub positions: Mutex<Vec<Position>>,
    pub price: Mutex<f64>,
    /// Native units per USD contract; `None` keeps the identity mapping.
    pub units_per_contract: Option<f64>,
    /// Errors returned by the next close calls, in order.
    pub close_errors: Mutex<VecDeque<anyhow::Error>>,
    pub leverage_error: Mutex<Option<anyhow::Error>>,
    pub stop_loss_error: bool,
    pub book: Option<SlTpBook>,
}

impl MockTrader {
    pub fn new() -> Self {
        Self {
            price: Mutex::new(100.0),
            ..Default::default()
        }
    }

    pub fn with_book(mut self) -> Self {
        self.book = Some(SlTpBook::new());
        self
    }

    pub fn with_position(self, position: Position) -> Self {
        self.positions.lock().unwrap().push(position);
        self
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }

    pub fn fail_next_close(&self, message: &str) {
        self.close_errors.lock().unwrap().push_back(anyhow!(message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fill(&self, symbol: &str, quantity: f64) -> OrderResult {
        OrderResult {
            order_id: format!("{}", self.calls.lock().unwrap().len()),
            client_order_id: "mock".into(),
            symbol: symbol.to_string(),
            status: "FILLED".into(),
            quantity,
            price: Some(*self.price.lock().unwrap()),
        }
    }

    fn close(&self, symbol: &str, side: PositionSide, quantity: f64) -> Result<OrderResult> {
        self.record(format!("close_{}:{symbol}:{quantity}", side.as_str().to_lowercase()));
        if let Some(err) = self.close_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut positions = self.positions.lock().unwrap();
        let Some(idx) = positions.iter().position(|p| p.symbol == symbol && p.side == side) else {
            return Err(TradeError::no_position(symbol, side).into());
        };
        let size = positions[idx].size();
        let amount = if quantity > 0.0 { quantity.min(size) } else { size };
        if amount >= size {
            positions.remove(idx);
        } else {
            let sign = positions[idx].position_amt.signum();
            positions[idx].position_amt = sign * (size - amount);
        }
        drop(positions);
        Ok(self.fill(symbol, amount))
    }
}

pub fn position(symbol: &str, amt: f64, mark: f64, leverage: f64, pnl: f64) -> Position {
    Position {
        symbol: symbol.to_string(),
        position_amt: amt,
        entry_price: mark,
        mark_price: mark,
        unrealized_pnl: pnl,
        leverage,
        liquidation_price: 0.0,
        side: PositionSide::from_signed(amt),
    }
}

#[async_trait]
impl Trader for MockTrader {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn login(&self, _timeout: Duration) -> Result<()> {
        self.record("login".into());
        Ok(())
    }

    async fn get_balance(&self) -> Result<Balance> {
        Ok(Balance::default())
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        self.record("get_positions".into());
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.record(format!("set_leverage:{symbol}:{leverage}"));
        match self.leverage_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn set_margin_mode(&self, symbol: &str, is_cross: bool) -> Result<()> {
        self.record(format!("set_margin_mode:{symbol}:{is_cross}"));
        Ok(())
    }

    async fn open_long(&self, symbol: &str, quantity: f64, leverage: u32) -> Result<OrderResult> {
        self.record(format!("open_long:{symbol}:{quantity}:{leverage}"));
        Ok(self.fill(symbol, quantity))
    }

    async fn open_short(&self, symbol: &str, quantity: f64, leverage: u32) -> Result<OrderResult> {
        self.record(format!("open_short:{symbol}:{quantity}:{leverage}"));
        Ok(self.fill(symbol, quantity))
    }

    async fn close_long(&self, symbol: &str, quantity: f64) -> Result<OrderResult> {
        self.close(symbol, PositionSide::Long, quantity)
    }

    async fn close_short(&self, symbol: &str, quantity: f64) -> Result<OrderResult> {
        self.close(symbol, PositionSide::Short, quantity)
    }

    async fn set_stop_loss(&self, symbol: &str, side: PositionSide, quantity: f64, price: f64) -> Result<()> {
        self.record(format!("set_stop_loss:{symbol}:{side}:{quantity}:{price}"));
        if self.stop_loss_error {
            return Err(anyhow!("stop-loss rejected"));
        }
        if let Some(book) = &self.book {
            book.upsert_stop_loss(symbol, side, quantity, price).await;
        }
        Ok(())
    }

    async fn set_take_profit(&self, symbol: &str, side: PositionSide, quantity: f64, price: f64) -> Result<()> {
        self.record(format!("set_take_profit:{symbol}:{side}:{quantity}:{price}"));
        if let Some(book) = &self.book {
            book.upsert_take_profit(symbol, side, quantity, price).await;
        }
        Ok(())
    }

    async fn cancel_stop_loss_orders(&self, symbol: &str) -> Result<()> {
        self.record(format!("cancel_stop_loss_orders:{symbol}"));
        Ok(())
    }

    async fn cancel_take_profit_orders(&self, symbol: &str) -> Result<()> {
        self.record(format!("cancel_take_profit_orders:{symbol}"));
        Ok(())
    }

    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        self.record(format!("cancel_stop_orders:{symbol}"));
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        self.record(format!("cancel_all_orders:{symbol}"));
        Ok(())
    }

    async fn get_market_price(&self, symbol: &str) -> Result<f64> {
        self.record(format!("get_market_price:{symbol}"));
        Ok(*self.price.lock().unwrap())
    }

    async fn format_quantity(&self, _symbol: &str, quantity: f64) -> Result<String> {
        Ok(format!("{quantity}"))
    }

    async fn get_trade_history(&self, _symbol: &str, _limit: usize) -> Result<Vec<TradeRecord>> {
        Ok(Vec::new())
    }

    async fn quantity_for_contracts(&self, _symbol: &str, contracts: i64) -> Result<f64> {
        Ok(match self.units_per_contract {
            Some(u) => contracts as f64 * u,
            None => contracts as f64,
        })
    }

    fn sltp_book(&self) -> Option<&SlTpBook> {
        self.book.as_ref()
    }
}

/// Keeps every notification for later inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl pm_td::notify::Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
