//! Reason codes for every decision the engine takes.
//!
//! The enum is closed: no decision, risk check, or error enters the WAL
//! without one of these codes. The tracker aggregates per-code outcomes
//! so operators can see which reasons make money and which bleed it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Top-level category, derived from the code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonCategory {
    Signal,
    Risk,
    Market,
    System,
    Error,
}

/// Closed set of decision reasons.
///
/// Format on the wire: `CATEGORY_SUBCATEGORY` (SCREAMING_SNAKE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    // Signal reasons
    SignalStrong,
    SignalMedium,
    SignalWeak,
    SignalLiquidation,
    SignalVolatility,
    SignalTrend,
    SignalMeanReversion,
    SignalMarketMaking,
    SignalDuplicate,

    // Risk reasons
    RiskLimitOk,
    RiskLimitWarn,
    RiskLimitExceeded,
    RiskPositionTooLarge,
    RiskDrawdownExceeded,
    RiskConcentration,

    // Market reasons
    MarketSpreadWide,
    MarketTrendBlock,
    MarketVolatilityHigh,
    MarketVolumeLow,

    // System reasons
    SystemStartup,
    SystemShutdown,
    SystemFreeze,
    SystemResume,

    // Error reasons
    ErrorDataInvalid,
    ErrorDataStale,
    ErrorLatencyHigh,
    ErrorConnectionLost,
    ErrorExecutionFailed,
    ErrorUnknown,
}

impl ReasonCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::SignalStrong => "SIGNAL_STRONG",
            ReasonCode::SignalMedium => "SIGNAL_MEDIUM",
            ReasonCode::SignalWeak => "SIGNAL_WEAK",
            ReasonCode::SignalLiquidation => "SIGNAL_LIQUIDATION",
            ReasonCode::SignalVolatility => "SIGNAL_VOLATILITY",
            ReasonCode::SignalTrend => "SIGNAL_TREND",
            ReasonCode::SignalMeanReversion => "SIGNAL_MEAN_REVERSION",
            ReasonCode::SignalMarketMaking => "SIGNAL_MARKET_MAKING",
            ReasonCode::SignalDuplicate => "SIGNAL_DUPLICATE",
            ReasonCode::RiskLimitOk => "RISK_LIMIT_OK",
            ReasonCode::RiskLimitWarn => "RISK_LIMIT_WARN",
            ReasonCode::RiskLimitExceeded => "RISK_LIMIT_EXCEEDED",
            ReasonCode::RiskPositionTooLarge => "RISK_POSITION_TOO_LARGE",
            ReasonCode::RiskDrawdownExceeded => "RISK_DRAWDOWN_EXCEEDED",
            ReasonCode::RiskConcentration => "RISK_CONCENTRATION",
            ReasonCode::MarketSpreadWide => "MARKET_SPREAD_WIDE",
            ReasonCode::MarketTrendBlock => "MARKET_TREND_BLOCK",
            ReasonCode::MarketVolatilityHigh => "MARKET_VOLATILITY_HIGH",
            ReasonCode::MarketVolumeLow => "MARKET_VOLUME_LOW",
            ReasonCode::SystemStartup => "SYSTEM_STARTUP",
            ReasonCode::SystemShutdown => "SYSTEM_SHUTDOWN",
            ReasonCode::SystemFreeze => "SYSTEM_FREEZE",
            ReasonCode::SystemResume => "SYSTEM_RESUME",
            ReasonCode::ErrorDataInvalid => "ERROR_DATA_INVALID",
            ReasonCode::ErrorDataStale => "ERROR_DATA_STALE",
            ReasonCode::ErrorLatencyHigh => "ERROR_LATENCY_HIGH",
            ReasonCode::ErrorConnectionLost => "ERROR_CONNECTION_LOST",
            ReasonCode::ErrorExecutionFailed => "ERROR_EXECUTION_FAILED",
            ReasonCode::ErrorUnknown => "ERROR_UNKNOWN",
        }
    }

    /// Category derived from the code prefix.
    pub fn category(&self) -> ReasonCategory {
        match self.as_str().split('_').next() {
            Some("SIGNAL") => ReasonCategory::Signal,
            Some("RISK") => ReasonCategory::Risk,
            Some("MARKET") => ReasonCategory::Market,
            Some("SYSTEM") => ReasonCategory::System,
            _ => ReasonCategory::Error,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a decision, recorded once known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Pending,
    Profit,
    Loss,
    Blocked,
}

/// Aggregated statistics for one reason code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeStats {
    pub decisions: u64,
    pub wins: u64,
    pub losses: u64,
    pub blocked: u64,
    pub pending: u64,
    pub total_pnl: Decimal,
}

impl CodeStats {
    /// Win rate in percent over resolved trades.
    pub fn win_rate(&self) -> f64 {
        let resolved = self.wins + self.losses;
        if resolved == 0 {
            return 0.0;
        }
        self.wins as f64 / resolved as f64 * 100.0
    }
}

/// Aggregates decision outcomes per reason code.
///
/// Stores only running aggregates, never individual decisions, so memory
/// stays constant regardless of tick volume.
#[derive(Debug, Default)]
pub struct ReasonCodeTracker {
    stats: HashMap<ReasonCode, CodeStats>,
    total_decisions: u64,
}

impl ReasonCodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision outcome against its reason code.
    pub fn record(&mut self, code: ReasonCode, outcome: DecisionOutcome, pnl: Option<Decimal>) {
        let entry = self.stats.entry(code).or_default();
        entry.decisions += 1;
        self.total_decisions += 1;

        match outcome {
            DecisionOutcome::Profit => entry.wins += 1,
            DecisionOutcome::Loss => entry.losses += 1,
            DecisionOutcome::Blocked => entry.blocked += 1,
            DecisionOutcome::Pending => entry.pending += 1,
        }

        if let Some(pnl) = pnl {
            entry.total_pnl += pnl;
        }
    }

    /// A decision previously recorded as pending has resolved.
    pub fn resolve(&mut self, code: ReasonCode, pnl: Decimal) {
        let entry = self.stats.entry(code).or_default();
        if entry.pending > 0 {
            entry.pending -= 1;
        }
        if pnl > Decimal::ZERO {
            entry.wins += 1;
        } else {
            entry.losses += 1;
        }
        entry.total_pnl += pnl;
    }

    /// Statistics for a single code.
    pub fn stats(&self, code: ReasonCode) -> CodeStats {
        self.stats.get(&code).cloned().unwrap_or_default()
    }

    pub fn total_decisions(&self) -> u64 {
        self.total_decisions
    }

    /// Top `n` codes by total P&L, descending.
    pub fn best(&self, n: usize) -> Vec<(ReasonCode, CodeStats)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .map(|(code, stats)| (*code, stats.clone()))
            .collect();
        all.sort_by(|a, b| b.1.total_pnl.cmp(&a.1.total_pnl));
        all.truncate(n);
        all
    }

    /// Bottom `n` codes by total P&L, ascending.
    pub fn worst(&self, n: usize) -> Vec<(ReasonCode, CodeStats)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .map(|(code, stats)| (*code, stats.clone()))
            .collect();
        all.sort_by(|a, b| a.1.total_pnl.cmp(&b.1.total_pnl));
        all.truncate(n);
        all
    }

    /// All codes seen so far with their aggregates.
    pub fn summary(&self) -> Vec<(ReasonCode, CodeStats)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .map(|(code, stats)| (*code, stats.clone()))
            .collect();
        all.sort_by_key(|(code, _)| code.as_str());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_category_from_prefix() {
        assert_eq!(ReasonCode::SignalStrong.category(), ReasonCategory::Signal);
        assert_eq!(
            ReasonCode::RiskLimitExceeded.category(),
            ReasonCategory::Risk
        );
        assert_eq!(
            ReasonCode::MarketSpreadWide.category(),
            ReasonCategory::Market
        );
        assert_eq!(ReasonCode::SystemFreeze.category(), ReasonCategory::System);
        assert_eq!(ReasonCode::ErrorDataStale.category(), ReasonCategory::Error);
    }

    #[test]
    fn test_serde_screaming_snake() {
        let json = serde_json::to_string(&ReasonCode::ErrorLatencyHigh).unwrap();
        assert_eq!(json, "\"ERROR_LATENCY_HIGH\"");
        let back: ReasonCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ReasonCode::ErrorLatencyHigh);
    }

    #[test]
    fn test_tracker_records_outcomes() {
        let mut tracker = ReasonCodeTracker::new();

        for i in 0..10 {
            let pnl = if i < 7 { dec!(100) } else { dec!(-50) };
            let outcome = if i < 7 {
                DecisionOutcome::Profit
            } else {
                DecisionOutcome::Loss
            };
            tracker.record(ReasonCode::SignalStrong, outcome, Some(pnl));
        }

        let stats = tracker.stats(ReasonCode::SignalStrong);
        assert_eq!(stats.decisions, 10);
        assert_eq!(stats.wins, 7);
        assert_eq!(stats.losses, 3);
        assert_eq!(stats.total_pnl, dec!(550));
        assert!((stats.win_rate() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_tracker_blocked_has_no_pnl() {
        let mut tracker = ReasonCodeTracker::new();
        tracker.record(ReasonCode::RiskLimitExceeded, DecisionOutcome::Blocked, None);

        let stats = tracker.stats(ReasonCode::RiskLimitExceeded);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.total_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_pending_then_resolve() {
        let mut tracker = ReasonCodeTracker::new();
        tracker.record(ReasonCode::SignalLiquidation, DecisionOutcome::Pending, None);
        tracker.resolve(ReasonCode::SignalLiquidation, dec!(42));

        let stats = tracker.stats(ReasonCode::SignalLiquidation);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.total_pnl, dec!(42));
    }

    #[test]
    fn test_best_and_worst_ordering() {
        let mut tracker = ReasonCodeTracker::new();
        tracker.record(
            ReasonCode::SignalStrong,
            DecisionOutcome::Profit,
            Some(dec!(500)),
        );
        tracker.record(
            ReasonCode::SignalWeak,
            DecisionOutcome::Loss,
            Some(dec!(-200)),
        );
        tracker.record(
            ReasonCode::SignalTrend,
            DecisionOutcome::Profit,
            Some(dec!(100)),
        );

        let best = tracker.best(2);
        assert_eq!(best[0].0, ReasonCode::SignalStrong);
        assert_eq!(best[1].0, ReasonCode::SignalTrend);

        let worst = tracker.worst(1);
        assert_eq!(worst[0].0, ReasonCode::SignalWeak);
    }
}
