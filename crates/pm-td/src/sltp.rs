//! Locally tracked stop-loss / take-profit conditions.
//!
//! Conditions are keyed by `(symbol, position_side)`; setting a stop-loss and
//! then a take-profit on the same key updates one entry. Cancelling or firing
//! a condition clears its `active` flag without removing it, and a later set
//! re-arms the same key.
//!
//! The map sits behind a tokio `RwLock`. Every method takes the lock for the
//! map operation only; nothing awaits I/O while holding it.

use std::collections::HashMap;
use std::sync::Arc;

use pm_core::{PositionSide, SlTpCondition, TriggerKind};
use tokio::sync::RwLock;

type Key = (String, PositionSide);

/// Outcome of recording a failed triggered close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The condition is armed again for the next tick.
    Rearmed { attempts: u32 },
    /// The retry budget is spent; the condition stays inactive.
    Retired { attempts: u32 },
}

/// Shared SL/TP condition map. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct SlTpBook {
    inner: Arc<RwLock<HashMap<Key, SlTpCondition>>>,
}

impl SlTpBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stop-loss price for a key, creating the condition if needed.
    pub async fn upsert_stop_loss(&self, symbol: &str, side: PositionSide, quantity: f64, price: f64) {
        self.upsert(symbol, side, quantity, TriggerKind::StopLoss, price).await;
    }

    /// Set the take-profit price for a key, creating the condition if needed.
    pub async fn upsert_take_profit(&self, symbol: &str, side: PositionSide, quantity: f64, price: f64) {
        self.upsert(symbol, side, quantity, TriggerKind::TakeProfit, price).await;
    }

    async fn upsert(&self, symbol: &str, side: PositionSide, quantity: f64, kind: TriggerKind, price: f64) {
        let mut map = self.inner.write().await;
        let cond = map
            .entry((symbol.to_string(), side))
            .or_insert_with(|| SlTpCondition::new(symbol, side, quantity));
        cond.quantity = quantity;
        match kind {
            TriggerKind::StopLoss => cond.stop_loss_price = price,
            TriggerKind::TakeProfit => cond.take_profit_price = price,
        }
        cond.active = cond.has_stop_loss() || cond.has_take_profit();
        cond.close_failures = 0;
    }

    /// Reset the stop-loss price on both sides of a symbol. Returns how many
    /// conditions changed.
    pub async fn cancel_stop_loss(&self, symbol: &str) -> usize {
        self.reset(symbol, None, Some(TriggerKind::StopLoss)).await
    }

    /// Reset the take-profit price on both sides of a symbol.
    pub async fn cancel_take_profit(&self, symbol: &str) -> usize {
        self.reset(symbol, None, Some(TriggerKind::TakeProfit)).await
    }

    /// Clear both prices and deactivate every condition of a symbol.
    pub async fn cancel_symbol(&self, symbol: &str) -> usize {
        self.reset(symbol, None, None).await
    }

    /// Clear both prices and deactivate one side of a symbol.
    pub async fn cancel_side(&self, symbol: &str, side: PositionSide) -> usize {
        self.reset(symbol, Some(side), None).await
    }

    async fn reset(&self, symbol: &str, side: Option<PositionSide>, kind: Option<TriggerKind>) -> usize {
        let mut map = self.inner.write().await;
        let mut changed = 0;
        for ((sym, s), cond) in map.iter_mut() {
            if sym != symbol || side.is_some_and(|want| want != *s) {
                continue;
            }
            match kind {
                Some(TriggerKind::StopLoss) => cond.stop_loss_price = 0.0,
                Some(TriggerKind::TakeProfit) => cond.take_profit_price = 0.0,
                None => {
                    cond.stop_loss_price = 0.0;
                    cond.take_profit_price = 0.0;
                }
            }
            if !cond.has_stop_loss() && !cond.has_take_profit() {
                cond.active = false;
            }
            changed += 1;
        }
        changed
    }

    /// Copy of every active condition.
    pub async fn active_snapshot(&self) -> Vec<SlTpCondition> {
        self.inner
            .read()
            .await
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect()
    }

    pub async fn get(&self, symbol: &str, side: PositionSide) -> Option<SlTpCondition> {
        self.inner.read().await.get(&(symbol.to_string(), side)).cloned()
    }

    /// Clear the `active` flag. Prices are kept for inspection.
    pub async fn deactivate(&self, symbol: &str, side: PositionSide) {
        if let Some(cond) = self.inner.write().await.get_mut(&(symbol.to_string(), side)) {
            cond.active = false;
        }
    }

    /// Put back the pre-trigger condition after a failed close, counting the
    /// failure. Once `max_attempts` is reached the condition stays inactive.
    ///
    /// Does nothing if the key was re-armed by a new set in the meantime.
    pub async fn record_failure(&self, snapshot: &SlTpCondition, max_attempts: u32) -> FailureOutcome {
        let mut map = self.inner.write().await;
        let key = (snapshot.symbol.clone(), snapshot.position_side);
        let attempts = snapshot.close_failures + 1;

        if let Some(current) = map.get(&key) {
            if current.active {
                return FailureOutcome::Rearmed { attempts: current.close_failures };
            }
        }

        let mut restored = snapshot.clone();
        restored.close_failures = attempts;
        restored.active = attempts < max_attempts;
        map.insert(key, restored);

        if attempts < max_attempts {
            FailureOutcome::Rearmed { attempts }
        } else {
            FailureOutcome::Retired { attempts }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
