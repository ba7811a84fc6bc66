//! Enumerations used throughout the position manager.
//!
//! Wire spellings (`"LONG"`, `"open_long"`, ...) are kept stable because they
//! appear in config files, order intents and notification text.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TradeError;

// ---------------------------------------------------------------------------
// Exchange identifiers
// ---------------------------------------------------------------------------

/// Supported derivatives exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Gate,
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Gate => write!(f, "gate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Position side / order direction
// ---------------------------------------------------------------------------

/// Side of a position in hedge mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side implied by a signed position amount (`> 0` long, otherwise short).
    pub fn from_signed(amount: f64) -> Self {
        if amount > 0.0 { Self::Long } else { Self::Short }
    }

    /// Upper-case wire label (`"LONG"` / `"SHORT"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }

    /// Direction of the order that opens this side.
    pub fn open_direction(self) -> Direction {
        match self {
            Self::Long => Direction::Buy,
            Self::Short => Direction::Sell,
        }
    }

    /// Direction of the order that reduces this side.
    pub fn close_direction(self) -> Direction {
        match self {
            Self::Long => Direction::Sell,
            Self::Short => Direction::Buy,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = TradeError;

    /// Accepts `LONG`/`SHORT` as well as the `BUY`/`SELL` spellings some
    /// endpoints report, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Self::Long),
            "SHORT" | "SELL" => Ok(Self::Short),
            other => Err(TradeError::Parse(format!("unknown position side: {other}"))),
        }
    }
}

/// Buy or sell direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

// ---------------------------------------------------------------------------
// Order intent actions
// ---------------------------------------------------------------------------

/// Action carried by an [`OrderIntent`](crate::trading::OrderIntent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum FuturesAction {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    PartialClose,
}

impl FuturesAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenLong => "open_long",
            Self::OpenShort => "open_short",
            Self::CloseLong => "close_long",
            Self::CloseShort => "close_short",
            Self::PartialClose => "partial_close",
        }
    }
}

impl std::fmt::Display for FuturesAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FuturesAction {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open_long" => Ok(Self::OpenLong),
            "open_short" => Ok(Self::OpenShort),
            "close_long" => Ok(Self::CloseLong),
            "close_short" => Ok(Self::CloseShort),
            "partial_close" => Ok(Self::PartialClose),
            other => Err(TradeError::UnsupportedAction(other.to_string())),
        }
    }
}

impl TryFrom<String> for FuturesAction {
    type Error = TradeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// SL/TP
// ---------------------------------------------------------------------------

/// Which protective level a trigger belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => f.write_str("stop-loss"),
            Self::TakeProfit => f.write_str("take-profit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parse_round_trip() {
        for action in [
            FuturesAction::OpenLong,
            FuturesAction::OpenShort,
            FuturesAction::CloseLong,
            FuturesAction::CloseShort,
            FuturesAction::PartialClose,
        ] {
            assert_eq!(action.as_str().parse::<FuturesAction>().unwrap(), action);
        }
    }

    #[test]
    fn unknown_action_is_unsupported() {
        let err = "flip_position".parse::<FuturesAction>().unwrap_err();
        assert_eq!(err, TradeError::UnsupportedAction("flip_position".into()));

        let json = serde_json::from_str::<FuturesAction>("\"hold\"");
        assert!(json.is_err());
    }

    #[test]
    fn action_deserializes_from_snake_case() {
        let action: FuturesAction = serde_json::from_str("\"partial_close\"").unwrap();
        assert_eq!(action, FuturesAction::PartialClose);
    }

    #[test]
    fn position_side_normalisation() {
        assert_eq!("long".parse::<PositionSide>().unwrap(), PositionSide::Long);
        assert_eq!("SELL".parse::<PositionSide>().unwrap(), PositionSide::Short);
        assert_eq!(PositionSide::from_signed(-0.5), PositionSide::Short);
        assert_eq!(PositionSide::Long.close_direction(), Direction::Sell);
        assert!("BOTH".parse::<PositionSide>().is_err());
    }
}
