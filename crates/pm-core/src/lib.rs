//! # pm-core
//!
//! Core crate for the position manager, providing:
//!
//! - **Types** (`types`): enums, balance/position/order records, SL/TP conditions
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `TradeError` via thiserror
//! - **Time utilities** (`time_util`): epoch timestamps at several resolutions
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
