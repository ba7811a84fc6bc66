//! Trader registry: factory for creating trader handles from config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pm_core::Exchange;
use pm_core::config::TraderConfig;
use tracing::{info, warn};

use crate::Trader;
use crate::binance::BinanceTrader;
use crate::binance::config::BinanceTdConfig;
use crate::event::TdEventSender;
use crate::gate::GateTrader;
use crate::gate::config::GateTdConfig;
use crate::monitor::{MonitorPolicy, SlTpMonitor};
use crate::notify::Notifier;

/// A trader plus the background SL/TP monitor that belongs to it.
pub struct TraderHandle {
    trader: Arc<dyn Trader>,
    policy: MonitorPolicy,
    events: Option<TdEventSender>,
    monitor: Option<SlTpMonitor>,
}

impl TraderHandle {
    /// Wrap an already constructed trader.
    pub fn new(trader: Arc<dyn Trader>, policy: MonitorPolicy, events: Option<TdEventSender>) -> Self {
        Self {
            trader,
            policy,
            events,
            monitor: None,
        }
    }

    pub fn trader(&self) -> &Arc<dyn Trader> {
        &self.trader
    }

    pub fn policy(&self) -> MonitorPolicy {
        self.policy
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor.as_ref().is_some_and(SlTpMonitor::is_running)
    }

    /// Log in and, for adapters with a local SL/TP book, start the polling
    /// monitor. Calling it again only repeats the login.
    pub async fn start(&mut self, login_timeout: Duration) -> Result<()> {
        self.trader.login(login_timeout).await?;

        if self.monitor.is_none() {
            if let Some(book) = self.trader.sltp_book() {
                let monitor = SlTpMonitor::spawn(
                    Arc::downgrade(&self.trader),
                    book.clone(),
                    self.policy,
                    self.events.clone(),
                );
                self.monitor = Some(monitor);
                info!("[registry] {} SL/TP monitor running", self.trader.name());
            }
        }
        Ok(())
    }

    /// Stop the monitor first, then the trader.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.shutdown().await;
        }
        self.trader.shutdown().await
    }
}

/// Create a [`TraderHandle`] based on the `exchange` field in the config.
///
/// The handle is not logged in yet; call [`TraderHandle::start`].
pub fn create_trader(
    config: &TraderConfig,
    notifier: Arc<dyn Notifier>,
    events: Option<TdEventSender>,
) -> Result<TraderHandle> {
    let policy = MonitorPolicy {
        interval: Duration::from_secs(config.effective_sltp_poll_secs()),
        max_close_retries: config.effective_max_close_retries(),
    };

    let trader: Arc<dyn Trader> = match config.exchange {
        Exchange::Binance => {
            let mut trader = BinanceTrader::new(BinanceTdConfig::from_trader_config(config)?, notifier)?;
            if let Some(tx) = &events {
                trader = trader.with_events(tx.clone());
            }
            Arc::new(trader)
        }
        Exchange::Gate => {
            if !config.effective_hedge_mode() {
                warn!("[registry] {}: gate positions are always dual-sided, hedge_mode=false ignored", config.name);
            }
            let mut trader = GateTrader::new(GateTdConfig::from_trader_config(config)?, notifier)?;
            if let Some(tx) = &events {
                trader = trader.with_events(tx.clone());
            }
            Arc::new(trader)
        }
    };

    info!("[registry] created {} trader '{}'", config.exchange, config.name);
    Ok(TraderHandle::new(trader, policy, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;

    fn trader_config(exchange: Exchange) -> TraderConfig {
        serde_json::from_value(serde_json::json!({
            "name": "main",
            "exchange": exchange,
            "api_key": "k",
            "secret_key": "s",
            "sltp_poll_secs": 7,
            "max_close_retries": 5
        }))
        .unwrap()
    }

    #[test]
    fn builds_each_exchange() {
        for exchange in [Exchange::Binance, Exchange::Gate] {
            let handle = create_trader(&trader_config(exchange), Arc::new(LogNotifier), None).unwrap();
            assert_eq!(handle.trader().exchange(), exchange);
            assert_eq!(handle.trader().name(), "main");
            assert_eq!(handle.policy().interval, Duration::from_secs(7));
            assert_eq!(handle.policy().max_close_retries, 5);
            assert!(!handle.monitor_running());
        }
    }

    #[test]
    fn only_binance_keeps_a_local_book() {
        let binance = create_trader(&trader_config(Exchange::Binance), Arc::new(LogNotifier), None).unwrap();
        let gate = create_trader(&trader_config(Exchange::Gate), Arc::new(LogNotifier), None).unwrap();
        assert!(binance.trader().sltp_book().is_some());
        assert!(gate.trader().sltp_book().is_none());
    }

    #[test]
    fn empty_credentials_fail() {
        let mut cfg = trader_config(Exchange::Gate);
        cfg.api_key.clear();
        assert!(create_trader(&cfg, Arc::new(LogNotifier), None).is_err());
    }
}
