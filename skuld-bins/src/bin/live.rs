//! Live trading driver.
//!
//! Wires an exchange adapter to the engine and drains its bounded tick
//! channel until interrupted. Without a venue configured this runs the
//! paper adapter, which fills through the deterministic fee model.

use anyhow::Result;
use clap::Parser;
use crossbeam::channel::RecvTimeoutError;
use rust_decimal::Decimal;
use skuld_bins::common::{exit_codes, init_logging, print_report};
use skuld_core::adapter::{ExchangeAdapter, PaperAdapter};
use skuld_core::bus::EventBus;
use skuld_core::core::{Clock, SystemClock};
use skuld_core::engine::{Engine, EngineConfig, EngineState};
use skuld_core::wal::WalLogger;
use skuld_strategies::{
    LeverageBandLevels, LiquidationHunter, LiquidationHunterConfig, MarketMaker, MeanReversion,
    Momentum,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "skuld-live", about = "Run the engine against an exchange adapter")]
struct Args {
    /// Symbol to trade.
    #[arg(long, default_value = "BTC/USDT")]
    symbol: String,

    /// Fee table / venue.
    #[arg(long, default_value = "binance")]
    exchange: String,

    /// Starting cash.
    #[arg(long, default_value = "10000")]
    initial_capital: Decimal,

    /// WAL output path.
    #[arg(long, default_value = "./data/live_wal.jsonl")]
    wal_path: PathBuf,

    /// Replay the existing WAL to restore state before trading.
    #[arg(long)]
    recover: bool,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() {
    std::process::exit(match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e}");
            exit_codes::CONFIG_ERROR
        }
    });
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = EngineConfig::new(&args.symbol);
    config.exchange = args.exchange.parse()?;
    config.initial_capital = args.initial_capital;
    config.wal_log_path = args.wal_path.clone();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        return Ok(exit_codes::CONFIG_ERROR);
    }

    // Recover before the logger reopens the file for append.
    let recovered = if args.recover && args.wal_path.exists() {
        let entries = skuld_core::wal::replay(&args.wal_path)?;
        Some(skuld_core::wal::RecoveredState::from_entries(
            &entries,
            config.initial_capital,
        ))
    } else {
        None
    };

    let wal = Arc::new(WalLogger::new(
        config.wal_log_path.clone(),
        config.wal_max_file_size_mb,
    )?);
    let bus = Arc::new(EventBus::new(
        config.event_queue_size,
        EventBus::DEFAULT_WINDOW_SEC,
    ));

    let mut adapter = PaperAdapter::new(config.exchange, config.initial_capital);
    adapter.connect()?;
    let ticks = adapter.subscribe(&args.symbol)?;

    let clock = SystemClock;
    let mut engine = Engine::new(config, wal, bus.clone(), Box::new(clock))?
        .with_adapter(Box::new(adapter));

    engine.register_strategy(
        Box::new(LiquidationHunter::new(
            LiquidationHunterConfig::default(),
            LeverageBandLevels::default(),
        )),
        Decimal::new(25, 2),
    );
    engine.register_strategy(Box::new(Momentum::default()), Decimal::new(25, 2));
    engine.register_strategy(Box::new(MarketMaker::default()), Decimal::new(25, 2));
    engine.register_strategy(Box::new(MeanReversion::default()), Decimal::new(25, 2));

    if let Some(state) = recovered {
        engine.restore(state)?;
        tracing::info!("state recovered from wal; strategy buffers are cold");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        shutdown_flag.store(true, Ordering::SeqCst);
    })?;

    engine.start(clock.now())?;
    tracing::info!(symbol = %args.symbol, "live engine running");

    while !shutdown.load(Ordering::SeqCst) {
        match ticks.recv_timeout(Duration::from_millis(100)) {
            Ok(tick) => {
                engine.process_tick(&tick);
                if engine.state() == EngineState::Stopped {
                    tracing::error!("engine stopped itself");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("tick stream disconnected");
                break;
            }
        }
    }

    if engine.state() != EngineState::Stopped {
        engine.stop(clock.now())?;
    }
    print_report(&engine, &bus);
    Ok(exit_codes::OK)
}
