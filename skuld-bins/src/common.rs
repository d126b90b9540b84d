//! Shared bootstrap and reporting for the binaries.

use anyhow::Result;
use skuld_core::engine::Engine;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Process exit codes shared by the drivers.
pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const CONFIG_ERROR: i32 = 2;
    pub const DATA_ERROR: i32 = 3;
    pub const FROZEN_STRICT: i32 = 4;
}

/// Initialize tracing/logging.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}

/// Print the end-of-run ASCII report.
pub fn print_report(engine: &Engine, bus: &skuld_core::bus::EventBus) {
    let stats = engine.stats();
    let sanitizer = engine.sanitizer_stats();
    let portfolio = engine.portfolio();
    let tca = engine.tca_summary();

    println!("{:=<72}", "");
    println!("ENGINE REPORT");
    println!("{:=<72}", "");
    println!("state:             {}", engine.state());
    println!("ticks:             {} total", stats.ticks_total);
    println!(
        "                   {} valid / {} skipped / {} rejected / {} freezes",
        stats.ticks_valid, stats.ticks_skipped, stats.ticks_rejected, stats.freezes
    );
    println!(
        "sanitizer:         {} passed of {} ({} freezes)",
        sanitizer.passed, sanitizer.total, sanitizer.freezes
    );
    println!("signals:           {}", stats.signals_generated);
    println!(
        "orders:            {} placed, {} fills, {} closes",
        stats.orders_placed, stats.fills, stats.closes
    );

    println!("{:-<72}", "");
    println!("PORTFOLIO");
    println!("  initial capital: {}", portfolio.initial_capital);
    println!("  realized pnl:    {}", portfolio.realized_pnl);
    println!("  unrealized pnl:  {}", portfolio.unrealized_pnl);
    println!("  equity:          {}", portfolio.current_equity);
    println!("  peak equity:     {}", portfolio.peak_equity);
    println!("  drawdown:        {}", portfolio.drawdown);
    println!("  open positions:  {}", portfolio.open_positions);
    println!(
        "  risk checks:     {} ({} warnings, {} violations)",
        portfolio.checks, portfolio.warnings, portfolio.violations
    );

    if tca.trades > 0 {
        println!("{:-<72}", "");
        println!("EXECUTION QUALITY");
        println!("  trades measured: {}", tca.trades);
        println!("  avg quality:     {:.3}", tca.avg_execution_quality);
        println!("  avg surprise:    {}", tca.avg_cost_surprise.round_dp(4));
        println!(
            "  est vs realized: {} vs {}",
            tca.total_estimated_cost.round_dp(4),
            tca.total_realized_cost.round_dp(4)
        );
    }

    let reasons = engine.reasons().summary();
    if !reasons.is_empty() {
        println!("{:-<72}", "");
        println!("DECISIONS BY REASON");
        for (code, stat) in reasons {
            println!(
                "  {:<24} {:>5}x  win {:>5.1}%  pnl {}",
                code.as_str(),
                stat.decisions,
                stat.win_rate(),
                stat.total_pnl.round_dp(2)
            );
        }
    }

    let strategies: Vec<_> = engine.signal_manager().all_metrics().collect();
    if !strategies.is_empty() {
        println!("{:-<72}", "");
        println!("STRATEGIES");
        for metrics in strategies {
            println!(
                "  {:<20} {:?}  trades {:>4}  win {:>5.1}%  revenue {}",
                metrics.strategy_id,
                metrics.status,
                metrics.trades_executed,
                metrics.win_rate(),
                metrics.revenue_generated.round_dp(2)
            );
        }
    }

    let bus_summary = bus.summary();
    if bus_summary.total_events > 0 {
        println!("{:-<72}", "");
        println!("EVENT BUS");
        println!(
            "  events: {} ({} errors, {} overflowed, depth {})",
            bus_summary.total_events,
            bus_summary.total_errors,
            bus_summary.overflow_count,
            bus_summary.queue_depth
        );
        for (topic, metrics) in bus_summary.by_topic {
            println!(
                "  {:<14} count {:>7}  avg {:.3}ms  max {:.3}ms",
                topic.as_str(),
                metrics.count,
                metrics.avg_latency_ms(),
                metrics.max_latency_ms
            );
        }
    }
    println!("{:=<72}", "");
}
