//! Unified order dispatch.
//!
//! Turns an exchange-agnostic [`OrderIntent`] into [`Trader`] calls:
//!
//! | Action          | Size                                        | Calls                                   |
//! |-----------------|---------------------------------------------|-----------------------------------------|
//! | `open_long`     | `calc_contracts(position_size_usd)`         | `set_leverage` → `open_long`            |
//! | `open_short`    | `calc_contracts(position_size_usd)`         | `set_leverage` → `open_short`           |
//! | `close_long`    | caller's current position (0 = close all)   | `close_long`                            |
//! | `close_short`   | caller's current position (0 = close all)   | `close_short`                           |
//! | `partial_close` | `calc_partial_contracts(current, pct)`      | close on the side of the current sign   |
//!
//! After an open or a partial close that leaves a position, a positive
//! `stop_loss` / `take_profit` is registered. Failing to register either is
//! logged and never unwinds the order. Full closes register nothing.

use anyhow::{Context, Result};
use pm_core::{FuturesAction, OrderIntent, OrderResult, PositionSide, error::TradeError};
use tracing::{info, warn};

use crate::Trader;
use crate::quirks;
use crate::sizing::{calc_contracts, calc_partial_contracts};

/// Execute one intent.
///
/// `current_position_contracts` is the caller's signed position in
/// USD-notional contracts (positive long, negative short). It sizes closes
/// and picks the side of a partial close.
pub async fn place_futures_order(
    trader: &dyn Trader,
    intent: &OrderIntent,
    current_position_contracts: i64,
) -> Result<OrderResult> {
    let symbol = intent.symbol.as_str();
    info!(
        "[dispatch] {} {} {symbol}: usd={} pct={} lev={} current={current_position_contracts}",
        trader.name(),
        intent.action,
        intent.position_size_usd,
        intent.close_percentage,
        intent.leverage,
    );

    let (result, side, flattened) = match intent.action {
        FuturesAction::OpenLong | FuturesAction::OpenShort => {
            let side = if intent.action == FuturesAction::OpenLong {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let contracts = calc_contracts(intent.position_size_usd)?;
            let signed = match side {
                PositionSide::Long => contracts,
                PositionSide::Short => -contracts,
            };
            info!("[dispatch] {symbol} sized {signed} contracts");

            apply_leverage(trader, symbol, intent.leverage).await?;

            let quantity = trader
                .quantity_for_contracts(symbol, contracts)
                .await
                .with_context(|| format!("convert {contracts} contracts for {symbol}"))?;
            let result = match side {
                PositionSide::Long => trader.open_long(symbol, quantity, intent.leverage).await,
                PositionSide::Short => trader.open_short(symbol, quantity, intent.leverage).await,
            }
            .with_context(|| format!("{} {symbol} failed", intent.action))?;
            (result, side, false)
        }

        FuturesAction::CloseLong | FuturesAction::CloseShort => {
            let side = if intent.action == FuturesAction::CloseLong {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let quantity = close_quantity(trader, symbol, current_position_contracts.abs()).await?;
            (close(trader, symbol, side, quantity).await?, side, true)
        }

        FuturesAction::PartialClose => {
            let total = current_position_contracts.abs();
            let contracts = calc_partial_contracts(total, intent.close_percentage).map_err(|e| match e {
                TradeError::NoPosition { .. } => TradeError::no_position(symbol, "open"),
                other => other,
            })?;
            let side = PositionSide::from_signed(current_position_contracts as f64);
            info!(
                "[dispatch] {symbol} partial close {contracts}/{total} contracts of {side} ({}%)",
                intent.close_percentage
            );
            let quantity = close_quantity(trader, symbol, contracts).await?;
            (close(trader, symbol, side, quantity).await?, side, contracts == total)
        }
    };

    if flattened {
        if intent.stop_loss > 0.0 || intent.take_profit > 0.0 {
            info!("[dispatch] {symbol} {side} fully closed, stop-loss/take-profit ignored");
        }
    } else {
        attach_protection(trader, intent, side, &result).await;
    }
    Ok(result)
}

/// Set leverage, surfacing only permission-tier failures.
async fn apply_leverage(trader: &dyn Trader, symbol: &str, leverage: u32) -> Result<()> {
    let result = trader.set_leverage(symbol, leverage).await;
    quirks::tolerate(result, &format!("set leverage {leverage}x on {symbol}"))
}

/// Native quantity for a close; `0` contracts means the whole position.
async fn close_quantity(trader: &dyn Trader, symbol: &str, contracts: i64) -> Result<f64> {
    if contracts == 0 {
        return Ok(0.0);
    }
    trader
        .quantity_for_contracts(symbol, contracts)
        .await
        .with_context(|| format!("convert {contracts} contracts for {symbol}"))
}

async fn close(trader: &dyn Trader, symbol: &str, side: PositionSide, quantity: f64) -> Result<OrderResult> {
    let closed = match side {
        PositionSide::Long => trader.close_long(symbol, quantity).await,
        PositionSide::Short => trader.close_short(symbol, quantity).await,
    };
    closed.with_context(|| format!("close {side} {symbol} failed"))
}

async fn attach_protection(trader: &dyn Trader, intent: &OrderIntent, side: PositionSide, result: &OrderResult) {
    let symbol = intent.symbol.as_str();
    if intent.stop_loss > 0.0 {
        match trader.set_stop_loss(symbol, side, result.quantity, intent.stop_loss).await {
            Ok(()) => info!("[dispatch] {symbol} {side} stop-loss set at {}", intent.stop_loss),
            Err(e) => warn!("[dispatch] {symbol} {side} stop-loss not set: {e:#}"),
        }
    }
    if intent.take_profit > 0.0 {
        match trader.set_take_profit(symbol, side, result.quantity, intent.take_profit).await {
            Ok(()) => info!("[dispatch] {symbol} {side} take-profit set at {}", intent.take_profit),
            Err(e) => warn!("[dispatch] {symbol} {side} take-profit not set: {e:#}"),
        }
    }
}
