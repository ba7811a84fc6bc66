//! # pm-td
//!
//! Trading modules for USDT-margined perpetual futures.
//!
//! Each exchange implements the [`Trader`] trait, which provides a uniform
//! capability set: balance and position queries, leverage and margin mode,
//! market open/close in hedge mode, stop-loss/take-profit management, price
//! lookups and quantity formatting. The lifecycle is:
//! `new(config)` → [`login`](Trader::login) → operations → [`shutdown`](Trader::shutdown).
//!
//! On top of the trait sit the exchange-agnostic pieces: the order
//! [`dispatcher`], the [`sizing`] rules, and the SL/TP [`monitor`] that polls
//! conditions kept in an [`SlTpBook`](sltp::SlTpBook).
//!
//! ## Supported exchanges
//!
//! | Exchange | Module    | Signing                          | SL/TP                    |
//! |----------|-----------|----------------------------------|--------------------------|
//! | Binance  | `binance` | HMAC-SHA256 over the query       | local book + monitor     |
//! | Gate     | `gate`    | HMAC-SHA512 over canonical string| native `price_orders`    |

pub mod binance;
pub mod cache;
pub mod dispatcher;
pub mod event;
pub mod gate;
pub mod monitor;
pub mod normalize;
pub mod notify;
pub mod order_id;
pub mod price;
pub mod quirks;
pub mod registry;
pub mod sizing;
pub mod sltp;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use pm_core::{Exchange, PositionSide, trading::*};

pub use registry::{TraderHandle, create_trader};

/// Capability set implemented by every exchange adapter.
///
/// # Lifecycle
///
/// 1. Construct via the exchange-specific `new(config, ..)`.
/// 2. Call [`login`](Trader::login) to sync clocks and account modes.
/// 3. Trade through the remaining methods, typically via
///    [`dispatcher::place_futures_order`].
/// 4. Call [`shutdown`](Trader::shutdown) once at exit.
///
/// All methods take `&self` so a trader can be shared behind an `Arc` and
/// called from many tasks at once; adapters keep mutable state behind their
/// own locks and never hold a lock across a request.
///
/// Quantities are in the exchange's native unit (base asset for Binance,
/// contracts for Gate). Symbols are unified (`BTCUSDT`) on both sides of the
/// trait.
#[async_trait]
pub trait Trader: Send + Sync {
    /// Exchange served by this adapter.
    fn exchange(&self) -> Exchange;

    /// Configured account name.
    fn name(&self) -> &str;

    /// Prepare the account (clock sync, hedge mode). Must finish within `timeout`.
    async fn login(&self, timeout: Duration) -> Result<()>;

    /// Wallet, available and unrealised P&L, served from a short TTL cache.
    async fn get_balance(&self) -> Result<Balance>;

    /// Non-zero positions, served from a short TTL cache.
    async fn get_positions(&self) -> Result<Vec<Position>>;

    /// Set leverage. No-op when already at `leverage`; benign provider
    /// answers are swallowed; a real change is followed by a cool-down.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Best-effort margin mode switch. Only a permission-tier mismatch fails.
    async fn set_margin_mode(&self, symbol: &str, is_cross: bool) -> Result<()>;

    async fn open_long(&self, symbol: &str, quantity: f64, leverage: u32) -> Result<OrderResult>;

    async fn open_short(&self, symbol: &str, quantity: f64, leverage: u32) -> Result<OrderResult>;

    /// Close a long. `quantity == 0.0` closes the whole position.
    async fn close_long(&self, symbol: &str, quantity: f64) -> Result<OrderResult>;

    /// Close a short. `quantity == 0.0` closes the whole position.
    async fn close_short(&self, symbol: &str, quantity: f64) -> Result<OrderResult>;

    /// Register or update the stop-loss for `(symbol, side)`.
    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<()>;

    /// Register or update the take-profit for `(symbol, side)`.
    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<()>;

    async fn cancel_stop_loss_orders(&self, symbol: &str) -> Result<()>;

    async fn cancel_take_profit_orders(&self, symbol: &str) -> Result<()>;

    /// Cancel both stop-loss and take-profit for a symbol.
    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()>;

    /// Cancel every open order for a symbol. Nothing to cancel is success.
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;

    /// Last traded price.
    async fn get_market_price(&self, symbol: &str) -> Result<f64>;

    /// Render a quantity at the exchange's required precision.
    async fn format_quantity(&self, symbol: &str, quantity: f64) -> Result<String>;

    /// Recent fills for a symbol, newest last.
    async fn get_trade_history(&self, symbol: &str, limit: usize) -> Result<Vec<TradeRecord>>;

    /// Convert a USD-notional contract count (1 contract = 1 USD) into this
    /// exchange's native order quantity.
    async fn quantity_for_contracts(&self, _symbol: &str, contracts: i64) -> Result<f64> {
        Ok(contracts as f64)
    }

    /// Locally tracked SL/TP conditions, for adapters that poll them.
    fn sltp_book(&self) -> Option<&sltp::SlTpBook> {
        None
    }

    /// Release resources. Called once at exit.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
