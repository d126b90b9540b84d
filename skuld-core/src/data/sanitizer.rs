//! Layer-0 data sanitizer.
//!
//! First line of defense: every tick passes through here before any
//! strategy or risk logic sees it. Checks run in a fixed order and
//! short-circuit on the first failure:
//!
//! 1. Latency -> freeze
//! 2. Quote validity -> reject
//! 3. Spread -> skip (market may recover)
//! 4. Tick size -> reject
//! 5. Integrity tag -> freeze
//! 6. Staleness -> freeze
//!
//! Freeze is sticky at the engine level: once signalled, no new positions
//! open until an operator resumes.

use crate::core::ReasonCode;
use crate::data::Tick;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

/// What to do with the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Tick is good, continue the pipeline.
    Allow,
    /// Drop this tick only.
    Skip,
    /// Drop the tick and count it as bad data.
    Reject,
    /// Stop trading until an explicit resume.
    Freeze,
}

/// Result of validating one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub action: GateAction,
    /// Present for every non-allow verdict.
    pub reason: Option<ReasonCode>,
    pub detail: String,
    pub latency_ms: f64,
    pub spread_bps: Decimal,
}

impl Verdict {
    fn allow(latency_ms: f64, spread_bps: Decimal) -> Self {
        Self {
            action: GateAction::Allow,
            reason: None,
            detail: String::new(),
            latency_ms,
            spread_bps,
        }
    }

    fn fail(
        action: GateAction,
        reason: ReasonCode,
        detail: String,
        latency_ms: f64,
        spread_bps: Decimal,
    ) -> Self {
        Self {
            action,
            reason: Some(reason),
            detail,
            latency_ms,
            spread_bps,
        }
    }
}

/// Sanitizer limits. `None` disables a check; backtests disable latency
/// and staleness because the clock is simulated.
#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    pub max_latency_ms: Option<f64>,
    pub max_spread_bps: Decimal,
    pub max_data_age_sec: Option<f64>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: Some(100.0),
            max_spread_bps: Decimal::from(50),
            max_data_age_sec: Some(2.0),
        }
    }
}

/// Running counters, exposed for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizerStats {
    pub total: u64,
    pub passed: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub freezes: u64,
}

/// Per-tick validator with registered tick sizes per symbol.
#[derive(Debug)]
pub struct Sanitizer {
    config: SanitizerConfig,
    tick_sizes: HashMap<String, Decimal>,
    stats: SanitizerStats,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        info!(
            max_latency_ms = ?config.max_latency_ms,
            max_spread_bps = %config.max_spread_bps,
            max_data_age_sec = ?config.max_data_age_sec,
            "sanitizer initialized"
        );
        Self {
            config,
            tick_sizes: HashMap::new(),
            stats: SanitizerStats::default(),
        }
    }

    /// Register the exchange tick size for a symbol. Symbols without a
    /// registered size skip the tick-size check.
    pub fn register_tick_size(&mut self, symbol: impl Into<String>, tick_size: Decimal) {
        self.tick_sizes.insert(symbol.into(), tick_size);
    }

    pub fn stats(&self) -> SanitizerStats {
        self.stats
    }

    /// Validate one tick. `now` is only consulted for the staleness
    /// check and is never read when that check is disabled.
    pub fn validate(&mut self, tick: &Tick, now: f64) -> Verdict {
        self.stats.total += 1;
        let verdict = self.run_checks(tick, now);
        match verdict.action {
            GateAction::Allow => self.stats.passed += 1,
            GateAction::Skip => self.stats.skipped += 1,
            GateAction::Reject => self.stats.rejected += 1,
            GateAction::Freeze => self.stats.freezes += 1,
        }
        verdict
    }

    fn run_checks(&self, tick: &Tick, now: f64) -> Verdict {
        let latency_ms = tick.latency_ms();

        // 1. Latency
        if let Some(max_latency) = self.config.max_latency_ms {
            if latency_ms > max_latency {
                return Verdict::fail(
                    GateAction::Freeze,
                    ReasonCode::ErrorLatencyHigh,
                    format!("latency {latency_ms:.1}ms > {max_latency:.1}ms"),
                    latency_ms,
                    Decimal::ZERO,
                );
            }
        }

        // 2. Quote validity
        if tick.bid <= Decimal::ZERO || tick.ask <= Decimal::ZERO {
            return Verdict::fail(
                GateAction::Reject,
                ReasonCode::ErrorDataInvalid,
                format!("non-positive quote: bid={} ask={}", tick.bid, tick.ask),
                latency_ms,
                Decimal::ZERO,
            );
        }
        if tick.ask < tick.bid {
            return Verdict::fail(
                GateAction::Reject,
                ReasonCode::ErrorDataInvalid,
                format!("crossed market: ask {} < bid {}", tick.ask, tick.bid),
                latency_ms,
                Decimal::ZERO,
            );
        }

        let spread_bps = tick.spread_bps();

        // 3. Spread (liquidity); not fatal, the market may come back
        if spread_bps > self.config.max_spread_bps {
            return Verdict::fail(
                GateAction::Skip,
                ReasonCode::MarketSpreadWide,
                format!(
                    "spread {spread_bps:.1}bps > {}bps",
                    self.config.max_spread_bps
                ),
                latency_ms,
                spread_bps,
            );
        }

        // 4. Tick size, for symbols with a registered size
        if let Some(&tick_size) = self.tick_sizes.get(&tick.symbol) {
            let epsilon = tick_size * Decimal::new(1, 3);
            for (label, price) in [("bid", tick.bid), ("ask", tick.ask)] {
                let remainder = price % tick_size;
                if remainder > epsilon && (tick_size - remainder) > epsilon {
                    return Verdict::fail(
                        GateAction::Reject,
                        ReasonCode::ErrorDataInvalid,
                        format!("{label} {price} not a multiple of tick size {tick_size}"),
                        latency_ms,
                        spread_bps,
                    );
                }
            }
        }

        // 5. Integrity tag, when the feed supplies one
        if let Some(provided) = &tick.integrity {
            let expected = tick.expected_integrity_tag();
            if *provided != expected {
                return Verdict::fail(
                    GateAction::Freeze,
                    ReasonCode::ErrorDataInvalid,
                    format!("integrity tag mismatch: {provided} != {expected}"),
                    latency_ms,
                    spread_bps,
                );
            }
        }

        // 6. Staleness
        if let Some(max_age) = self.config.max_data_age_sec {
            let age = now - tick.local_timestamp;
            if age > max_age {
                return Verdict::fail(
                    GateAction::Freeze,
                    ReasonCode::ErrorDataStale,
                    format!("tick is {age:.1}s old > {max_age:.1}s"),
                    latency_ms,
                    spread_bps,
                );
            }
        }

        Verdict::allow(latency_ms, spread_bps)
    }
}
