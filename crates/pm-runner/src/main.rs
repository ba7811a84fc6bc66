//! # pm-runner
//!
//! Command-line entry point for the position manager.
//!
//! Loads a JSON configuration file, builds one trader handle per configured
//! exchange account, and either keeps the SL/TP monitors running, prints
//! account status, or dispatches a single order intent.
//!
//! # Usage
//!
//! ```bash
//! pm-runner config.json run
//! pm-runner config.json status --trader main
//! pm-runner config.json order --trader main --action open_long --symbol BTCUSDT --usd 100 --leverage 10
//! pm-runner config.json order --trader main --intent '{"symbol":"BTCUSDT","action":"close_long"}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use pm_core::config::{AppConfig, TraderConfig};
use pm_core::logging::LogFormat;
use pm_core::{AccountSummary, FuturesAction, OrderIntent};
use pm_td::event::{self, TdEvent, TdEventReceiver};
use pm_td::notify::{LogNotifier, Notifier, TelegramNotifier};
use pm_td::{Trader, TraderHandle, create_trader, dispatcher};
use tracing::{error, info, warn};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Position manager for Binance and Gate USDT perpetual futures.
#[derive(Parser)]
#[command(name = "pm-runner", about = "Futures position manager")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `app.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Log line format (plain, json).
    #[arg(long, default_value = "plain")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and keep the SL/TP monitors running until Ctrl+C.
    Run {
        /// Only this trader (default: all).
        #[arg(long)]
        trader: Option<String>,
    },

    /// Print balance, positions and an account summary as JSON.
    Status {
        #[arg(long)]
        trader: Option<String>,
    },

    /// Dispatch one order intent.
    Order(OrderArgs),
}

#[derive(clap::Args)]
struct OrderArgs {
    #[arg(long)]
    trader: String,

    /// Full intent as JSON; overrides the individual flags.
    #[arg(long)]
    intent: Option<String>,

    #[arg(long, required_unless_present = "intent")]
    action: Option<FuturesAction>,

    #[arg(long, required_unless_present = "intent")]
    symbol: Option<String>,

    /// Position size in USD (open only).
    #[arg(long, default_value_t = 0.0)]
    usd: f64,

    /// Close percentage (partial_close only).
    #[arg(long, default_value_t = 0.0)]
    percent: f64,

    #[arg(long, default_value_t = 1)]
    leverage: u32,

    #[arg(long, default_value_t = 0.0)]
    stop_loss: f64,

    #[arg(long, default_value_t = 0.0)]
    take_profit: f64,

    /// Current signed position in USD contracts (sizes closes).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    current: i64,

    /// Switch margin mode before ordering.
    #[arg(long)]
    margin: Option<MarginMode>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MarginMode {
    Cross,
    Isolated,
}

impl OrderArgs {
    fn to_intent(&self) -> Result<OrderIntent> {
        if let Some(raw) = &self.intent {
            return serde_json::from_str(raw).context("invalid --intent JSON");
        }
        let action = self.action.ok_or_else(|| anyhow!("--action is required"))?;
        let symbol = self.symbol.clone().ok_or_else(|| anyhow!("--symbol is required"))?;
        Ok(OrderIntent {
            symbol,
            action,
            position_size_usd: self.usd,
            close_percentage: self.percent,
            leverage: self.leverage,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = pm_core::config::load_config(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;
    config.validate()?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    pm_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name(), cli.log_format);
    info!(
        "pm-runner starting, config={}, log_level={}, {} trader(s)",
        cli.config.display(),
        cli.log_level,
        config.traders.len()
    );

    let notifier = build_notifier(&config);

    match &cli.command {
        Command::Run { trader } => run(&config, trader.as_deref(), notifier).await,
        Command::Status { trader } => status(&config, trader.as_deref(), notifier).await,
        Command::Order(args) => order(&config, args, notifier).await,
    }
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    match &config.telegram {
        Some(tg) if tg.is_enabled() => {
            info!("telegram notifications enabled");
            Arc::new(TelegramNotifier::new(tg))
        }
        _ => Arc::new(LogNotifier),
    }
}

fn selected<'a>(config: &'a AppConfig, name: Option<&str>) -> Result<Vec<&'a TraderConfig>> {
    match name {
        Some(n) => {
            let t = config.trader(n).ok_or_else(|| anyhow!("no trader named '{n}' in config"))?;
            Ok(vec![t])
        }
        None => Ok(config.traders.iter().collect()),
    }
}

async fn start_handle(
    cfg: &TraderConfig,
    notifier: Arc<dyn Notifier>,
    events: Option<event::TdEventSender>,
) -> Result<TraderHandle> {
    let mut handle = create_trader(cfg, notifier, events)?;
    handle
        .start(LOGIN_TIMEOUT)
        .await
        .with_context(|| format!("start trader '{}'", cfg.name))?;
    Ok(handle)
}

async fn run(config: &AppConfig, name: Option<&str>, notifier: Arc<dyn Notifier>) -> Result<()> {
    let (tx, rx) = event::channel();
    let drain = tokio::spawn(drain_events(rx));

    let mut handles = Vec::new();
    for cfg in selected(config, name)? {
        match start_handle(cfg, notifier.clone(), Some(tx.clone())).await {
            Ok(handle) => {
                info!("trader '{}' ({}) started", cfg.name, cfg.exchange);
                handles.push(handle);
            }
            Err(e) => error!("trader '{}': {e:#}", cfg.name),
        }
    }
    drop(tx);

    if handles.is_empty() {
        return Err(anyhow!("no trader could be started"));
    }
    info!("all {} trader(s) started, press Ctrl+C to stop", handles.len());

    // 3. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 4. Stop all traders gracefully
    for handle in &mut handles {
        let name = handle.trader().name().to_string();
        if let Err(e) = handle.shutdown().await {
            error!("error stopping '{name}': {e:#}");
        }
    }
    drop(handles);
    let _ = drain.await;

    info!("all traders stopped, goodbye");
    Ok(())
}

async fn drain_events(mut rx: TdEventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            TdEvent::SlTpTriggered {
                exchange,
                symbol,
                side,
                kind,
                trigger_price,
                market_price,
                pnl_pct,
            } => info!(
                "[event] {exchange} {symbol} {side} {kind} at {market_price} (level {trigger_price}, pnl {pnl_pct:.2}%)"
            ),
            TdEvent::SlTpCloseFailed {
                exchange,
                symbol,
                side,
                attempts,
                message,
            } => warn!("[event] {exchange} {symbol} {side} close failed (attempt {attempts}): {message}"),
            TdEvent::ConditionRetired {
                exchange,
                symbol,
                side,
                attempts,
            } => error!("[event] {exchange} {symbol} {side} protection retired after {attempts} failed closes"),
            TdEvent::PositionClosed {
                exchange,
                symbol,
                side,
                quantity,
                price,
            } => info!("[event] {exchange} {symbol} {side} closed qty={quantity} price={price:?}"),
            TdEvent::Error { exchange, message } => error!("[event] {exchange}: {message}"),
        }
    }
}

async fn status(config: &AppConfig, name: Option<&str>, notifier: Arc<dyn Notifier>) -> Result<()> {
    for cfg in selected(config, name)? {
        let mut handle = start_handle(cfg, notifier.clone(), None).await?;
        let trader = handle.trader().clone();

        let balance = trader.get_balance().await?;
        let positions = trader.get_positions().await?;
        let initial = cfg.initial_balance.unwrap_or(balance.total_wallet_balance);
        let summary = AccountSummary::compute(&balance, &positions, initial);

        let mut prices = serde_json::Map::new();
        for symbol in &cfg.symbols {
            match trader.get_market_price(symbol).await {
                Ok(p) => {
                    prices.insert(symbol.clone(), serde_json::json!(p));
                }
                Err(e) => warn!("{} price for {symbol} unavailable: {e:#}", cfg.name),
            }
        }

        let out = serde_json::json!({
            "trader": cfg.name,
            "exchange": cfg.exchange,
            "balance": balance,
            "positions": positions,
            "summary": summary,
            "prices": prices,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        handle.shutdown().await?;
    }
    Ok(())
}

async fn order(config: &AppConfig, args: &OrderArgs, notifier: Arc<dyn Notifier>) -> Result<()> {
    let cfg = config
        .trader(&args.trader)
        .ok_or_else(|| anyhow!("no trader named '{}' in config", args.trader))?;
    let intent = args.to_intent()?;

    let mut handle = start_handle(cfg, notifier, None).await?;
    let trader = handle.trader().clone();

    if let Some(mode) = args.margin {
        trader
            .set_margin_mode(&intent.symbol, matches!(mode, MarginMode::Cross))
            .await?;
    }

    let outcome = dispatcher::place_futures_order(trader.as_ref(), &intent, args.current).await;
    handle.shutdown().await?;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
