//! Event types emitted by traders and the SL/TP monitor to downstream
//! consumers (the runner, a strategy).
//!
//! Consumers hold a [`TdEventReceiver`] and react to triggered closes,
//! failed closes and retired conditions. Sends never block and a dropped
//! receiver is ignored.

use pm_core::{Exchange, PositionSide, TriggerKind};

/// A typed event emitted by a [`Trader`](crate::Trader) handle.
#[derive(Debug, Clone, PartialEq)]
pub enum TdEvent {
    /// A stop-loss or take-profit crossed and a close was issued.
    SlTpTriggered {
        exchange: Exchange,
        symbol: String,
        side: PositionSide,
        kind: TriggerKind,
        trigger_price: f64,
        market_price: f64,
        pnl_pct: f64,
    },

    /// The close issued for a trigger failed. The condition stays armed.
    SlTpCloseFailed {
        exchange: Exchange,
        symbol: String,
        side: PositionSide,
        attempts: u32,
        message: String,
    },

    /// A condition was deactivated after repeated close failures.
    ConditionRetired {
        exchange: Exchange,
        symbol: String,
        side: PositionSide,
        attempts: u32,
    },

    /// A position was closed (manually or by a trigger).
    PositionClosed {
        exchange: Exchange,
        symbol: String,
        side: PositionSide,
        quantity: f64,
        price: Option<f64>,
    },

    /// A non-fatal error occurred in a background task.
    Error {
        exchange: Exchange,
        message: String,
    },
}

/// Sender half of the TD event channel.
pub type TdEventSender = tokio::sync::mpsc::UnboundedSender<TdEvent>;

/// Receiver half of the TD event channel.
pub type TdEventReceiver = tokio::sync::mpsc::UnboundedReceiver<TdEvent>;

/// Create a new event channel.
pub fn channel() -> (TdEventSender, TdEventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
