//! SL/TP polling engine.
//!
//! One background task per trader re-evaluates every active condition on a
//! fixed interval:
//!
//! 1. snapshot active conditions from the [`SlTpBook`]
//! 2. fetch positions once and index them by `(symbol, side)`
//! 3. skip conditions with no matching position
//! 4. fetch the price, compute P&L % against used margin
//! 5. suppress inside the leverage-tiered dead zone
//! 6. close the position when a level is crossed
//!
//! | Leverage | Dead zone (P&L %) |
//! |----------|-------------------|
//! | `< 50`   | `[-10, 15]`       |
//! | `>= 50`  | `[-20, 30]`       |
//!
//! The task never returns errors; failures end the tick for that condition
//! and are logged. It stops only when [`SlTpMonitor::shutdown`] is called.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use pm_core::{Position, PositionSide, SlTpCondition, TriggerKind, trading::finite_or_zero};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Trader;
use crate::event::{TdEvent, TdEventSender};
use crate::sltp::{FailureOutcome, SlTpBook};

/// Leverage at which the wider dead zone applies.
pub const HIGH_LEVERAGE: f64 = 50.0;

// ---------------------------------------------------------------------------
// Pure evaluation helpers
// ---------------------------------------------------------------------------

/// `|amount| * mark / leverage`, or `0.0` when leverage or size is not positive.
pub fn margin_used(position_amt: f64, mark_price: f64, leverage: f64) -> f64 {
    let size = position_amt.abs();
    if leverage <= 0.0 || size <= 0.0 {
        return 0.0;
    }
    finite_or_zero(size * mark_price / leverage)
}

/// Unrealised P&L as a percentage of used margin. `0.0` when margin is zero.
pub fn pnl_percentage(unrealized_pnl: f64, margin: f64) -> f64 {
    if margin <= 0.0 {
        return 0.0;
    }
    finite_or_zero(unrealized_pnl / margin * 100.0)
}

/// Whether triggering is suppressed for this leverage and P&L %. Bounds are inclusive.
pub fn in_dead_zone(leverage: f64, pnl_pct: f64) -> bool {
    let (low, high) = if leverage >= HIGH_LEVERAGE { (-20.0, 30.0) } else { (-10.0, 15.0) };
    (low..=high).contains(&pnl_pct)
}

/// Which level, if any, `price` has crossed. Stop-loss is checked first.
pub fn trigger_for(cond: &SlTpCondition, price: f64) -> Option<(TriggerKind, f64)> {
    let (sl_hit, tp_hit) = match cond.position_side {
        PositionSide::Long => (price <= cond.stop_loss_price, price >= cond.take_profit_price),
        PositionSide::Short => (price >= cond.stop_loss_price, price <= cond.take_profit_price),
    };
    if cond.has_stop_loss() && sl_hit {
        Some((TriggerKind::StopLoss, cond.stop_loss_price))
    } else if cond.has_take_profit() && tp_hit {
        Some((TriggerKind::TakeProfit, cond.take_profit_price))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// Polling parameters.
#[derive(Debug, Clone, Copy)]
pub struct MonitorPolicy {
    pub interval: Duration,
    /// Failed closes before a condition is retired.
    pub max_close_retries: u32,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_close_retries: 3,
        }
    }
}

/// What one tick did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub no_position: usize,
    pub suppressed: usize,
    pub triggered: usize,
    pub failed: usize,
}

/// Evaluate every active condition once.
pub async fn run_tick(
    trader: &dyn Trader,
    book: &SlTpBook,
    policy: &MonitorPolicy,
    events: Option<&TdEventSender>,
) -> TickReport {
    let mut report = TickReport::default();
    let conditions = book.active_snapshot().await;
    if conditions.is_empty() {
        return report;
    }

    let positions = match trader.get_positions().await {
        Ok(p) => p,
        Err(e) => {
            warn!("[sltp] {} positions query failed: {e:#}", trader.name());
            emit(
                events,
                TdEvent::Error {
                    exchange: trader.exchange(),
                    message: format!("positions query failed: {e:#}"),
                },
            );
            return report;
        }
    };
    let index: HashMap<(&str, PositionSide), &Position> =
        positions.iter().map(|p| ((p.symbol.as_str(), p.side), p)).collect();

    for cond in conditions {
        report.evaluated += 1;
        let Some(pos) = index.get(&(cond.symbol.as_str(), cond.position_side)) else {
            report.no_position += 1;
            continue;
        };

        let price = match trader.get_market_price(&cond.symbol).await {
            Ok(p) if p > 0.0 => p,
            Ok(p) => {
                warn!("[sltp] {} non-positive price {p}", cond.symbol);
                continue;
            }
            Err(e) => {
                warn!("[sltp] {} price query failed: {e:#}", cond.symbol);
                continue;
            }
        };

        let margin = margin_used(pos.position_amt, pos.mark_price, pos.leverage);
        let pnl_pct = pnl_percentage(pos.unrealized_pnl, margin);
        if in_dead_zone(pos.leverage, pnl_pct) {
            debug!(
                "[sltp] {} {} suppressed: lev={} pnl={pnl_pct:.2}%",
                cond.symbol, cond.position_side, pos.leverage
            );
            report.suppressed += 1;
            continue;
        }

        let Some((kind, level)) = trigger_for(&cond, price) else {
            continue;
        };

        info!(
            "[sltp] {} {} {kind} hit: price={price} level={level} pnl={pnl_pct:.2}%",
            cond.symbol, cond.position_side
        );
        report.triggered += 1;
        emit(
            events,
            TdEvent::SlTpTriggered {
                exchange: trader.exchange(),
                symbol: cond.symbol.clone(),
                side: cond.position_side,
                kind,
                trigger_price: level,
                market_price: price,
                pnl_pct,
            },
        );

        book.deactivate(&cond.symbol, cond.position_side).await;

        // Whole position unless the condition covers only part of it.
        let quantity = if cond.quantity > 0.0 && cond.quantity < pos.size() { cond.quantity } else { 0.0 };
        let closed = match cond.position_side {
            PositionSide::Long => trader.close_long(&cond.symbol, quantity).await,
            PositionSide::Short => trader.close_short(&cond.symbol, quantity).await,
        };

        match closed {
            Ok(res) => {
                info!("[sltp] {} {} closed: order={}", cond.symbol, cond.position_side, res.order_id);
            }
            Err(e) => {
                report.failed += 1;
                error!("[sltp] {} {} close failed: {e:#}", cond.symbol, cond.position_side);
                let outcome = book.record_failure(&cond, policy.max_close_retries).await;
                let event = match outcome {
                    FailureOutcome::Rearmed { attempts } => TdEvent::SlTpCloseFailed {
                        exchange: trader.exchange(),
                        symbol: cond.symbol.clone(),
                        side: cond.position_side,
                        attempts,
                        message: format!("{e:#}"),
                    },
                    FailureOutcome::Retired { attempts } => {
                        warn!(
                            "[sltp] {} {} retired after {attempts} failed closes",
                            cond.symbol, cond.position_side
                        );
                        TdEvent::ConditionRetired {
                            exchange: trader.exchange(),
                            symbol: cond.symbol.clone(),
                            side: cond.position_side,
                            attempts,
                        }
                    }
                };
                emit(events, event);
            }
        }
    }

    report
}

fn emit(events: Option<&TdEventSender>, event: TdEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

/// Handle to a running polling task.
pub struct SlTpMonitor {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SlTpMonitor {
    /// Spawn the polling loop.
    ///
    /// The task holds only a weak reference to the trader, so dropping the
    /// last strong handle also ends the loop.
    pub fn spawn(
        trader: Weak<dyn Trader>,
        book: SlTpBook,
        policy: MonitorPolicy,
        events: Option<TdEventSender>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(policy.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("[sltp] monitor started, interval={:?}", policy.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(trader) = trader.upgrade() else {
                            break;
                        };
                        let report = run_tick(trader.as_ref(), &book, &policy, events.as_ref()).await;
                        if report.triggered > 0 || report.failed > 0 {
                            info!("[sltp] {} tick: {report:?}", trader.name());
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("[sltp] monitor stopped");
        });

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("[sltp] monitor task ended abnormally: {e}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SlTpMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_guards() {
        assert_eq!(margin_used(0.1, 50_000.0, 10.0), 500.0);
        assert_eq!(margin_used(-0.1, 50_000.0, 10.0), 500.0);
        assert_eq!(margin_used(0.1, 50_000.0, 0.0), 0.0);
        assert_eq!(margin_used(0.0, 50_000.0, 10.0), 0.0);
        assert_eq!(pnl_percentage(50.0, 0.0), 0.0);
        assert_eq!(pnl_percentage(50.0, 500.0), 10.0);
    }

    #[test]
    fn dead_zone_tiers() {
        assert!(in_dead_zone(40.0, 10.0));
        assert!(!in_dead_zone(40.0, 20.0));
        assert!(in_dead_zone(40.0, -10.0));
        assert!(in_dead_zone(40.0, 15.0));
        assert!(!in_dead_zone(40.0, -10.5));

        assert!(in_dead_zone(50.0, 20.0));
        assert!(in_dead_zone(100.0, -20.0));
        assert!(in_dead_zone(100.0, 30.0));
        assert!(!in_dead_zone(100.0, 31.0));
    }

    #[test]
    fn trigger_direction() {
        let mut long = SlTpCondition::new("BTCUSDT", PositionSide::Long, 0.01);
        long.stop_loss_price = 40_000.0;
        long.take_profit_price = 50_000.0;
        assert_eq!(trigger_for(&long, 39_999.0), Some((TriggerKind::StopLoss, 40_000.0)));
        assert_eq!(trigger_for(&long, 50_000.0), Some((TriggerKind::TakeProfit, 50_000.0)));
        assert_eq!(trigger_for(&long, 45_000.0), None);

        let mut short = SlTpCondition::new("BTCUSDT", PositionSide::Short, 0.01);
        short.stop_loss_price = 50_000.0;
        assert_eq!(trigger_for(&short, 51_000.0), Some((TriggerKind::StopLoss, 50_000.0)));
        // Unset take-profit (0) never fires.
        assert_eq!(trigger_for(&short, 1.0), None);
    }
}
