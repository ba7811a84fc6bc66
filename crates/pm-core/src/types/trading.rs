//! Trading-related records: balances, positions, order results, intents and
//! SL/TP conditions.
//!
//! Every numeric field is a plain `f64` that has already been normalised by
//! the exchange adapter, so these structs serialise to well-formed JSON.

use serde::{Deserialize, Serialize};

use super::enums::{FuturesAction, PositionSide};

/// Replace NaN / infinity with `0.0`.
#[inline]
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

// ---------------------------------------------------------------------------
// Balance / position snapshots
// ---------------------------------------------------------------------------

/// Unified futures wallet balance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Wallet balance (margin balance for cross accounts).
    pub total_wallet_balance: f64,
    /// Balance available for new orders.
    pub available_balance: f64,
    /// Sum of unrealised P&L across positions.
    pub total_unrealized_profit: f64,
}

/// A non-zero position snapshot from the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unified symbol (e.g. `"BTCUSDT"`).
    pub symbol: String,
    /// Signed amount in the exchange's native unit (positive = long).
    pub position_amt: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
    pub leverage: f64,
    pub liquidation_price: f64,
    /// Derived side.
    pub side: PositionSide,
}

impl Position {
    /// Absolute position size.
    pub fn size(&self) -> f64 {
        self.position_amt.abs()
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Result of a market order submitted through a trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Exchange-assigned order ID (stringified; Gate and Binance differ in type).
    pub order_id: String,
    /// Client order ID we generated for the submission.
    pub client_order_id: String,
    pub symbol: String,
    /// Exchange status label (`"FILLED"`, `"finished"`, ...).
    pub status: String,
    /// Quantity actually sent on the wire.
    pub quantity: f64,
    /// Best-known fill price; falls back to the current market price.
    pub price: Option<f64>,
}

/// A normalised trade (fill) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub order_id: String,
    pub side: String,
    pub price: f64,
    pub quantity: f64,
    pub realized_pnl: f64,
    pub commission: f64,
    /// Trade time in milliseconds since epoch.
    pub time_ms: u64,
}

/// A symbol-agnostic trading intent consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub action: FuturesAction,
    /// Only used when opening.
    #[serde(default)]
    pub position_size_usd: f64,
    /// Only used by `partial_close`.
    #[serde(default)]
    pub close_percentage: f64,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default)]
    pub stop_loss: f64,
    #[serde(default)]
    pub take_profit: f64,
}

fn default_leverage() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// SL/TP condition
// ---------------------------------------------------------------------------

/// A locally tracked stop-loss / take-profit condition.
///
/// Keyed by `(symbol, position_side)`. A price of `0.0` means "not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlTpCondition {
    pub symbol: String,
    pub position_side: PositionSide,
    pub quantity: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub active: bool,
    /// Consecutive failed close attempts since the last arm.
    #[serde(default)]
    pub close_failures: u32,
}

impl SlTpCondition {
    pub fn new(symbol: &str, position_side: PositionSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            position_side,
            quantity,
            stop_loss_price: 0.0,
            take_profit_price: 0.0,
            active: true,
            close_failures: 0,
        }
    }

    pub fn has_stop_loss(&self) -> bool {
        self.stop_loss_price > 0.0
    }

    pub fn has_take_profit(&self) -> bool {
        self.take_profit_price > 0.0
    }
}

// ---------------------------------------------------------------------------
// Account summary
// ---------------------------------------------------------------------------

/// Derived account view used for status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub total_equity: f64,
    pub wallet_balance: f64,
    pub unrealized_profit: f64,
    pub available_balance: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub initial_balance: f64,
    pub position_count: usize,
    pub margin_used: f64,
    pub margin_used_pct: f64,
}

impl AccountSummary {
    /// Equity is wallet plus unrealised P&L; P&L is measured against
    /// `initial_balance`. Percentages are zero when their base is not positive.
    pub fn compute(balance: &Balance, positions: &[Position], initial_balance: f64) -> Self {
        let total_equity = balance.total_wallet_balance + balance.total_unrealized_profit;
        let total_pnl = total_equity - initial_balance;
        let total_pnl_pct = if initial_balance > 0.0 {
            finite_or_zero(total_pnl / initial_balance * 100.0)
        } else {
            0.0
        };

        let margin_used: f64 = positions
            .iter()
            .filter(|p| p.leverage > 0.0)
            .map(|p| p.size() * p.mark_price / p.leverage)
            .sum();
        let margin_used = finite_or_zero(margin_used);
        let margin_used_pct = if total_equity > 0.0 {
            finite_or_zero(margin_used / total_equity * 100.0)
        } else {
            0.0
        };

        Self {
            total_equity,
            wallet_balance: balance.total_wallet_balance,
            unrealized_profit: balance.total_unrealized_profit,
            available_balance: balance.available_balance,
            total_pnl,
            total_pnl_pct,
            initial_balance,
            position_count: positions.len(),
            margin_used,
            margin_used_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(amt: f64, mark: f64, leverage: f64) -> Position {
        Position {
            symbol: "BTCUSDT".into(),
            position_amt: amt,
            entry_price: mark,
            mark_price: mark,
            unrealized_pnl: 0.0,
            leverage,
            liquidation_price: 0.0,
            side: PositionSide::from_signed(amt),
        }
    }

    #[test]
    fn summary_basic() {
        let balance = Balance {
            total_wallet_balance: 1000.0,
            available_balance: 800.0,
            total_unrealized_profit: 50.0,
        };
        let positions = vec![position(-0.01, 40_000.0, 10.0)];
        let s = AccountSummary::compute(&balance, &positions, 1000.0);
        assert_eq!(s.total_equity, 1050.0);
        assert_eq!(s.total_pnl, 50.0);
        assert!((s.total_pnl_pct - 5.0).abs() < 1e-9);
        assert!((s.margin_used - 40.0).abs() < 1e-9);
        assert_eq!(s.position_count, 1);
    }

    #[test]
    fn summary_zero_initial_balance_is_finite() {
        let s = AccountSummary::compute(&Balance::default(), &[position(1.0, 10.0, 0.0)], 0.0);
        assert_eq!(s.total_pnl_pct, 0.0);
        assert_eq!(s.margin_used, 0.0);
        assert!(serde_json::to_string(&s).is_ok());
    }

    #[test]
    fn finite_guard() {
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(-3.5), -3.5);
    }

    #[test]
    fn intent_defaults() {
        let intent: OrderIntent =
            serde_json::from_str(r#"{"symbol":"BTCUSDT","action":"close_long"}"#).unwrap();
        assert_eq!(intent.action, FuturesAction::CloseLong);
        assert_eq!(intent.leverage, 1);
        assert_eq!(intent.stop_loss, 0.0);
    }
}
