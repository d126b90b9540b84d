//! CSV backtest driver.
//!
//! Feeds OHLCV rows through a paper-trading engine with the three
//! reference strategies registered, then prints an ASCII report.
//!
//! Exit codes: 0 success, 2 config error, 3 data error, 4 engine frozen
//! while running in `--strict` mode.

use anyhow::Result;
use clap::Parser;
use rust_decimal::Decimal;
use skuld_bins::common::{exit_codes, init_logging, print_report};
use skuld_core::bus::EventBus;
use skuld_core::core::SystemClock;
use skuld_core::data::CsvTickReader;
use skuld_core::engine::{Engine, EngineConfig, EngineState};
use skuld_core::wal::WalLogger;
use skuld_strategies::{
    LeverageBandLevels, LiquidationHunter, LiquidationHunterConfig, MarketMaker, MeanReversion,
    Momentum,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "skuld-backtest", about = "Replay OHLCV data through the engine")]
struct Args {
    /// CSV file with timestamp,open,high,low,close,volume columns.
    #[arg(long)]
    data: PathBuf,

    /// Symbol to trade.
    #[arg(long, default_value = "BTC/USDT")]
    symbol: String,

    /// Stop after this many ticks.
    #[arg(long)]
    max_ticks: Option<usize>,

    /// Fee table to use.
    #[arg(long, default_value = "binance")]
    exchange: String,

    /// Starting cash.
    #[arg(long, default_value = "10000")]
    initial_capital: Decimal,

    /// Synthetic bid/ask spread in bps around close.
    #[arg(long, default_value = "2")]
    synth_spread_bps: Decimal,

    /// WAL output path.
    #[arg(long, default_value = "./data/backtest_wal.jsonl")]
    wal_path: PathBuf,

    /// Exit non-zero if the engine freezes mid-run.
    #[arg(long)]
    strict: bool,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("failed to initialize logging: {e}");
        return exit_codes::CONFIG_ERROR;
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return exit_codes::CONFIG_ERROR;
        }
    };

    let reader = CsvTickReader::new(&args.symbol).with_synth_spread_bps(args.synth_spread_bps);
    let ticks = match reader.read(&args.data, args.max_ticks) {
        Ok(ticks) => ticks,
        Err(e) => {
            tracing::error!(error = %e, "failed to load data");
            return exit_codes::DATA_ERROR;
        }
    };

    match run_engine(config, ticks, args.strict) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "backtest failed");
            exit_codes::CONFIG_ERROR
        }
    }
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::backtest(&args.symbol, &args.wal_path);
    config.exchange = args.exchange.parse()?;
    config.initial_capital = args.initial_capital;
    config.validate()?;
    Ok(config)
}

fn run_engine(
    config: EngineConfig,
    ticks: Vec<skuld_core::data::Tick>,
    strict: bool,
) -> Result<i32> {
    let wal = Arc::new(WalLogger::new(
        config.wal_log_path.clone(),
        config.wal_max_file_size_mb,
    )?);
    let bus = Arc::new(EventBus::new(
        config.event_queue_size,
        EventBus::DEFAULT_WINDOW_SEC,
    ));

    let mut engine = Engine::new(config, wal, bus.clone(), Box::new(SystemClock))?;
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

    let start_ts = ticks.first().map(|t| t.local_timestamp).unwrap_or(0.0);
    engine.start(start_ts)?;

    let mut froze = false;
    for tick in &ticks {
        engine.process_tick(tick);
        match engine.state() {
            EngineState::Frozen => {
                froze = true;
                if strict {
                    tracing::error!("engine froze in strict mode; aborting replay");
                    break;
                }
            }
            EngineState::Stopped => {
                tracing::error!("engine stopped itself; aborting replay");
                break;
            }
            _ => {}
        }
    }

    let end_ts = ticks.last().map(|t| t.local_timestamp).unwrap_or(start_ts);
    if engine.state() != EngineState::Stopped {
        engine.stop(end_ts)?;
    }

    print_report(&engine, &bus);

    if froze && strict {
        return Ok(exit_codes::FROZEN_STRICT);
    }
    Ok(exit_codes::OK)
}
