//! Typed error definitions for the position manager.
//!
//! Provides [`TradeError`] for domain-specific failures that callers need to
//! branch on (sizing rejections, missing positions, permission problems).
//! All variants implement `std::error::Error` via `thiserror`, so they travel
//! inside `anyhow::Error` and can be recovered with `downcast_ref`.

use thiserror::Error;

/// Domain-specific errors for order sizing, dispatch and exchange access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    /// A USD notional that cannot be turned into at least one contract.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// A close percentage outside `(0, 100]`.
    #[error("invalid close percentage {0}: must be in (0, 100]")]
    InvalidPercent(f64),

    /// No open position exists for the requested symbol/direction.
    #[error("no {side} position for {symbol}")]
    NoPosition { symbol: String, side: String },

    /// The quantised order rounds to zero or is below the minimum notional.
    #[error("order too small: {0}")]
    OrderTooSmall(String),

    /// An order action that the dispatcher does not know.
    #[error("unsupported futures action: {0}")]
    UnsupportedAction(String),

    /// The API key has the wrong access tier for futures trading.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The exchange answered with a structured error body.
    #[error("exchange rejected request (http {status}, code {code}): {message}")]
    Rejected { status: u16, code: String, message: String },

    /// Network, HTTP or decoding failure at the transport boundary.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response field was missing or malformed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),
}

impl TradeError {
    /// Shorthand for a [`TradeError::NoPosition`] value.
    pub fn no_position(symbol: &str, side: impl std::fmt::Display) -> Self {
        Self::NoPosition {
            symbol: symbol.to_string(),
            side: side.to_string(),
        }
    }

    /// The exchange-provided code and message, if this is a rejection.
    pub fn rejection(&self) -> Option<(&str, &str)> {
        match self {
            Self::Rejected { code, message, .. } => Some((code.as_str(), message.as_str())),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TradeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_exposes_code_and_message() {
        let err = TradeError::Rejected {
            status: 400,
            code: "-4046".into(),
            message: "No need to change margin type.".into(),
        };
        assert_eq!(err.rejection(), Some(("-4046", "No need to change margin type.")));
        assert_eq!(TradeError::Transport("x".into()).rejection(), None);
    }

    #[test]
    fn no_position_display() {
        let err = TradeError::no_position("BTCUSDT", "LONG");
        assert_eq!(err.to_string(), "no LONG position for BTCUSDT");
    }

    #[test]
    fn travels_through_anyhow() {
        let err: anyhow::Error = TradeError::OrderTooSmall("0 contracts".into()).into();
        let err = err.context("open long failed");
        assert!(matches!(
            err.downcast_ref::<TradeError>(),
            Some(TradeError::OrderTooSmall(_))
        ));
    }
}
