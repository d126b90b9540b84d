//! Dynamic risk budget guard.
//!
//! Tracks unrealized and realized loss in real time against a bounded
//! risk budget. Four checks run in a fixed order and the first non-allow
//! verdict wins:
//!
//! 1. Per-position loss -> close / warn
//! 2. Portfolio loss    -> freeze / reduce
//! 3. Drawdown          -> freeze / reduce
//! 4. Concentration     -> reduce / warn
//!
//! The guard is the sole authority on whether a new position may open:
//! admission applies a hypothetical snapshot, re-runs the checks, and
//! rolls the snapshot back.

use crate::core::{ConfigError, ReasonCode};
use crate::position::Position;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Verdict of a risk check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskAction {
    /// Within budget.
    Allow,
    /// Approaching a limit.
    Warn,
    /// Cut exposure; no new entries.
    Reduce,
    /// Close the offending position now.
    Close,
    /// Stop all trading.
    Freeze,
}

impl RiskAction {
    /// Whether a new position may open under this verdict.
    #[inline]
    pub fn admits_entry(self) -> bool {
        matches!(self, RiskAction::Allow | RiskAction::Warn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskAction::Allow => "allow",
            RiskAction::Warn => "warn",
            RiskAction::Reduce => "reduce",
            RiskAction::Close => "close",
            RiskAction::Freeze => "freeze",
        }
    }
}

impl fmt::Display for RiskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one guard evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheck {
    pub action: RiskAction,
    pub reason_code: ReasonCode,
    pub reason: String,
    pub current_risk: Decimal,
    pub limit: Decimal,
    pub utilization_pct: f64,
}

impl RiskCheck {
    fn allow(detail: &str, current_risk: Decimal, limit: Decimal) -> Self {
        Self {
            action: RiskAction::Allow,
            reason_code: ReasonCode::RiskLimitOk,
            reason: detail.to_string(),
            current_risk,
            limit,
            utilization_pct: utilization(current_risk, limit),
        }
    }
}

/// Configured limits, immutable after engine start except through the
/// explicit reconfigure path (which the engine journals first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub initial_capital: Decimal,
    /// Max unrealized loss per position, percent of initial capital.
    pub max_position_loss_pct: Decimal,
    /// Max total unrealized loss, percent of initial capital.
    pub max_total_loss_pct: Decimal,
    /// Max drawdown from peak equity, percent of initial capital.
    pub max_drawdown_pct: Decimal,
    /// Max share of total exposure in one position (0..1).
    pub max_concentration: Decimal,
    /// Warn when utilization crosses this percent of a limit.
    pub warn_threshold_pct: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::from(10_000),
            max_position_loss_pct: Decimal::from(5),
            max_total_loss_pct: Decimal::from(10),
            max_drawdown_pct: Decimal::from(15),
            max_concentration: Decimal::new(3, 1),
            warn_threshold_pct: Decimal::from(80),
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "initial_capital",
                message: format!("must be positive, got {}", self.initial_capital),
            });
        }
        for (field, value) in [
            ("max_position_loss_pct", self.max_position_loss_pct),
            ("max_total_loss_pct", self.max_total_loss_pct),
            ("max_drawdown_pct", self.max_drawdown_pct),
            ("warn_threshold_pct", self.warn_threshold_pct),
        ] {
            if value <= Decimal::ZERO || value > Decimal::from(100) {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("must be in (0, 100], got {value}"),
                });
            }
        }
        if self.max_concentration <= Decimal::ZERO || self.max_concentration > Decimal::ONE {
            return Err(ConfigError::Invalid {
                field: "max_concentration",
                message: format!("must be in (0, 1], got {}", self.max_concentration),
            });
        }
        Ok(())
    }

    pub fn max_position_loss(&self) -> Decimal {
        self.initial_capital * self.max_position_loss_pct / Decimal::from(100)
    }

    pub fn max_total_loss(&self) -> Decimal {
        self.initial_capital * self.max_total_loss_pct / Decimal::from(100)
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.initial_capital * self.max_drawdown_pct / Decimal::from(100)
    }
}

/// Portfolio snapshot for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSummary {
    pub initial_capital: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub current_equity: Decimal,
    pub peak_equity: Decimal,
    pub drawdown: Decimal,
    pub open_positions: usize,
    pub consecutive_losses: u32,
    pub checks: u64,
    pub warnings: u64,
    pub violations: u64,
}

/// The guard itself. Owns the position snapshots it judges; the engine
/// feeds it mark-to-market updates and close events.
#[derive(Debug)]
pub struct DrbGuard {
    limits: RiskLimits,
    positions: HashMap<String, Position>,
    realized_pnl: Decimal,
    peak_equity: Decimal,
    consecutive_losses: u32,
    checks: u64,
    warnings: u64,
    violations: u64,
}

impl DrbGuard {
    pub fn new(limits: RiskLimits) -> Self {
        info!(
            capital = %limits.initial_capital,
            max_position_loss_pct = %limits.max_position_loss_pct,
            max_total_loss_pct = %limits.max_total_loss_pct,
            max_drawdown_pct = %limits.max_drawdown_pct,
            "risk guard initialized"
        );
        let peak_equity = limits.initial_capital;
        Self {
            limits,
            positions: HashMap::new(),
            realized_pnl: Decimal::ZERO,
            peak_equity,
            consecutive_losses: 0,
            checks: 0,
            warnings: 0,
            violations: 0,
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Swap in new limits. The engine is responsible for journaling the
    /// change before calling this.
    pub fn reconfigure(&mut self, limits: RiskLimits) {
        info!(capital = %limits.initial_capital, "risk limits reconfigured");
        self.limits = limits;
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    /// Restore state recovered from the WAL.
    pub fn restore(&mut self, realized_pnl: Decimal, peak_equity: Decimal) {
        self.realized_pnl = realized_pnl;
        self.peak_equity = peak_equity.max(self.limits.initial_capital);
    }

    /// Upsert the guard's snapshot of a position.
    pub fn update_position(&mut self, position: Position) {
        debug!(symbol = %position.symbol, pnl = %position.unrealized_pnl(), "position updated");
        self.positions.insert(position.symbol.clone(), position);
    }

    /// A position closed; fold its realized P&L into the budget and
    /// advance the equity high-water mark.
    pub fn remove_position(&mut self, symbol: &str, realized_pnl: Decimal) {
        if self.positions.remove(symbol).is_some() {
            self.realized_pnl += realized_pnl;
            if realized_pnl < Decimal::ZERO {
                self.consecutive_losses += 1;
            } else {
                self.consecutive_losses = 0;
            }
            self.peak_equity = self.peak_equity.max(self.current_equity());
            debug!(symbol, realized = %realized_pnl, "position removed");
        }
    }

    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl()).sum()
    }

    pub fn current_equity(&self) -> Decimal {
        self.limits.initial_capital + self.realized_pnl + self.total_unrealized_pnl()
    }

    /// Run the ordered risk checks against the current snapshot.
    pub fn check(&mut self) -> RiskCheck {
        self.checks += 1;

        // Keep the high-water mark current before judging drawdown.
        self.peak_equity = self.peak_equity.max(self.current_equity());

        let result = self
            .check_position_loss()
            .or_else(|| self.check_portfolio_loss())
            .or_else(|| self.check_drawdown())
            .or_else(|| self.check_concentration());

        match result {
            Some(check) => {
                match check.action {
                    RiskAction::Warn => self.warnings += 1,
                    _ => self.violations += 1,
                }
                warn!(
                    action = ?check.action,
                    reason = %check.reason,
                    utilization = check.utilization_pct,
                    "risk check"
                );
                check
            }
            None => RiskCheck::allow("all risk checks passed", Decimal::ZERO, Decimal::ZERO),
        }
    }

    /// Pre-trade admission: judge the book as if `candidate` were open,
    /// then roll the snapshot back.
    pub fn admit(&mut self, candidate: Position) -> RiskCheck {
        let symbol = candidate.symbol.clone();
        let previous = self.positions.insert(symbol.clone(), candidate);

        let check = self.check();

        match previous {
            Some(prior) => {
                self.positions.insert(symbol, prior);
            }
            None => {
                self.positions.remove(&symbol);
            }
        }
        check
    }

    fn check_position_loss(&self) -> Option<RiskCheck> {
        let limit = self.limits.max_position_loss();
        for position in self.positions.values() {
            let unrealized_loss = position.unrealized_pnl().min(Decimal::ZERO).abs();
            let used = utilization(unrealized_loss, limit);

            if unrealized_loss > limit {
                return Some(RiskCheck {
                    action: RiskAction::Close,
                    reason_code: ReasonCode::RiskLimitExceeded,
                    reason: format!(
                        "position loss exceeded: {} -{}",
                        position.symbol, unrealized_loss
                    ),
                    current_risk: unrealized_loss,
                    limit,
                    utilization_pct: used,
                });
            }
            if Decimal::try_from(used).map_or(false, |u| u > self.limits.warn_threshold_pct) {
                return Some(RiskCheck {
                    action: RiskAction::Warn,
                    reason_code: ReasonCode::RiskLimitWarn,
                    reason: format!("position loss approaching limit: {}", position.symbol),
                    current_risk: unrealized_loss,
                    limit,
                    utilization_pct: used,
                });
            }
        }
        None
    }

    fn check_portfolio_loss(&self) -> Option<RiskCheck> {
        let limit = self.limits.max_total_loss();
        let total_loss = self.total_unrealized_pnl().min(Decimal::ZERO).abs();
        let used = utilization(total_loss, limit);

        if total_loss > limit {
            return Some(RiskCheck {
                action: RiskAction::Freeze,
                reason_code: ReasonCode::RiskLimitExceeded,
                reason: format!("total unrealized loss exceeded: -{total_loss}"),
                current_risk: total_loss,
                limit,
                utilization_pct: used,
            });
        }
        if Decimal::try_from(used).map_or(false, |u| u > self.limits.warn_threshold_pct) {
            return Some(RiskCheck {
                action: RiskAction::Reduce,
                reason_code: ReasonCode::RiskLimitWarn,
                reason: "total unrealized loss approaching limit".to_string(),
                current_risk: total_loss,
                limit,
                utilization_pct: used,
            });
        }
        None
    }

    fn check_drawdown(&self) -> Option<RiskCheck> {
        let limit = self.limits.max_drawdown();
        let drawdown = (self.peak_equity - self.current_equity()).max(Decimal::ZERO);
        let used = utilization(drawdown, limit);

        if drawdown > limit {
            return Some(RiskCheck {
                action: RiskAction::Freeze,
                reason_code: ReasonCode::RiskDrawdownExceeded,
                reason: format!("drawdown exceeded: -{drawdown}"),
                current_risk: drawdown,
                limit,
                utilization_pct: used,
            });
        }
        if Decimal::try_from(used).map_or(false, |u| u > self.limits.warn_threshold_pct) {
            return Some(RiskCheck {
                action: RiskAction::Reduce,
                reason_code: ReasonCode::RiskLimitWarn,
                reason: "drawdown approaching limit".to_string(),
                current_risk: drawdown,
                limit,
                utilization_pct: used,
            });
        }
        None
    }

    fn check_concentration(&self) -> Option<RiskCheck> {
        // A lone position is trivially 100% of exposure; concentration
        // only means something once capital is spread over several.
        if self.positions.len() < 2 {
            return None;
        }

        let total_exposure: Decimal = self.positions.values().map(|p| p.current_value()).sum();
        if total_exposure <= Decimal::ZERO {
            return None;
        }

        let limit = self.limits.max_concentration;
        for position in self.positions.values() {
            let concentration = position.current_value() / total_exposure;
            let used = utilization(concentration, limit);

            if concentration > limit {
                return Some(RiskCheck {
                    action: RiskAction::Reduce,
                    reason_code: ReasonCode::RiskConcentration,
                    reason: format!(
                        "concentration too high: {} at {:.1}%",
                        position.symbol,
                        concentration * Decimal::from(100)
                    ),
                    current_risk: concentration,
                    limit,
                    utilization_pct: used,
                });
            }
            if Decimal::try_from(used).map_or(false, |u| u > self.limits.warn_threshold_pct) {
                return Some(RiskCheck {
                    action: RiskAction::Warn,
                    reason_code: ReasonCode::RiskLimitWarn,
                    reason: format!("concentration approaching limit: {}", position.symbol),
                    current_risk: concentration,
                    limit,
                    utilization_pct: used,
                });
            }
        }
        None
    }

    pub fn summary(&self) -> PortfolioSummary {
        let unrealized = self.total_unrealized_pnl();
        let equity = self.current_equity();
        PortfolioSummary {
            initial_capital: self.limits.initial_capital,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: unrealized,
            current_equity: equity,
            peak_equity: self.peak_equity,
            drawdown: (self.peak_equity - equity).max(Decimal::ZERO),
            open_positions: self.positions.len(),
            consecutive_losses: self.consecutive_losses,
            checks: self.checks,
            warnings: self.warnings,
            violations: self.violations,
        }
    }
}

fn utilization(current: Decimal, limit: Decimal) -> f64 {
    if limit.is_zero() {
        return 0.0;
    }
    (current / limit * Decimal::from(100))
        .to_f64()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PositionSide;
    use rust_decimal_macros::dec;

    fn guard() -> DrbGuard {
        DrbGuard::new(RiskLimits::default())
    }

    fn position(symbol: &str, size: Decimal, entry: Decimal, current: Decimal) -> Position {
        Position {
            symbol: symbol.into(),
            side: PositionSide::Long,
            size,
            entry_price: entry,
            current_price: current,
            opened_at: 0.0,
            take_profit_pct: dec!(0.01),
            stop_loss_pct: dec!(0.01),
        }
    }

    #[test]
    fn test_healthy_portfolio_allows() {
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93600)));

        let check = g.check();
        assert_eq!(check.action, RiskAction::Allow);
        assert_eq!(check.reason_code, ReasonCode::RiskLimitOk);
    }

    #[test]
    fn test_position_loss_close() {
        // Limit: 5% of 10k = 500. Loss of 550 must trigger Close.
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(88000)));

        let check = g.check();
        assert_eq!(check.action, RiskAction::Close);
        assert_eq!(check.reason_code, ReasonCode::RiskLimitExceeded);
        assert_eq!(check.current_risk, dec!(550.0));
        assert_eq!(check.limit, dec!(500));
        assert!(check.utilization_pct > 100.0);
    }

    #[test]
    fn test_position_loss_warns_near_limit() {
        // Loss of 450 = 90% of the 500 limit, above the 80% warn line.
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(89000)));

        let check = g.check();
        assert_eq!(check.action, RiskAction::Warn);
        assert_eq!(check.reason_code, ReasonCode::RiskLimitWarn);
    }

    #[test]
    fn test_portfolio_loss_freeze() {
        // Three positions, each at its per-position 80% mark, summing
        // past the 1000 portfolio limit.
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(89500)));
        g.update_position(position("ETH/USDT", dec!(2), dec!(3300), dec!(3100)));
        g.update_position(position("SOL/USDT", dec!(10), dec!(150), dec!(110)));

        let check = g.check();
        assert_eq!(check.action, RiskAction::Freeze);
        assert_eq!(check.reason_code, ReasonCode::RiskLimitExceeded);
    }

    #[test]
    fn test_drawdown_freeze_after_realized_losses() {
        let mut g = guard();
        // Realize a string of losses: equity 10k -> 8.4k, drawdown 1.6k
        // against the 1.5k limit.
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500)));
        g.remove_position("BTC/USDT", dec!(-1600));

        let check = g.check();
        assert_eq!(check.action, RiskAction::Freeze);
        assert_eq!(check.reason_code, ReasonCode::RiskDrawdownExceeded);
    }

    #[test]
    fn test_peak_equity_high_water_mark() {
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500)));
        g.remove_position("BTC/USDT", dec!(500));
        assert_eq!(g.peak_equity(), dec!(10500));

        // A later loss does not lower the mark.
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500)));
        g.remove_position("BTC/USDT", dec!(-200));
        assert_eq!(g.peak_equity(), dec!(10500));
        assert_eq!(g.realized_pnl(), dec!(300));
    }

    #[test]
    fn test_single_position_concentration_not_flagged() {
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500)));
        assert_eq!(g.check().action, RiskAction::Allow);
    }

    #[test]
    fn test_concentration_reduce_with_two_positions() {
        let mut g = guard();
        // 9350 vs 330 exposure: BTC is ~96% of the book.
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500)));
        g.update_position(position("ETH/USDT", dec!(0.1), dec!(3300), dec!(3300)));

        let check = g.check();
        assert_eq!(check.action, RiskAction::Reduce);
        assert_eq!(check.reason_code, ReasonCode::RiskConcentration);
    }

    #[test]
    fn test_first_failing_check_wins() {
        // Position loss (Close) fires before the portfolio-level freeze.
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.3), dec!(93500), dec!(88000)));

        let check = g.check();
        assert_eq!(check.action, RiskAction::Close);
    }

    #[test]
    fn test_admission_rolls_back() {
        let mut g = guard();
        let candidate = position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500));

        let check = g.admit(candidate);
        assert_eq!(check.action, RiskAction::Allow);
        assert_eq!(g.summary().open_positions, 0);
    }

    #[test]
    fn test_admission_restores_existing_snapshot() {
        let mut g = guard();
        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93600)));

        let candidate = position("BTC/USDT", dec!(0.5), dec!(93600), dec!(93600));
        g.admit(candidate);

        assert_eq!(g.summary().open_positions, 1);
        let restored = g.positions.get("BTC/USDT").unwrap();
        assert_eq!(restored.size, dec!(0.1));
    }

    #[test]
    fn test_admission_blocks_oversized_loss_exposure() {
        // Candidate already marked below water past the limit.
        let mut g = guard();
        let candidate = position("BTC/USDT", dec!(0.2), dec!(93500), dec!(90000));
        let check = g.admit(candidate);
        assert_eq!(check.action, RiskAction::Close);
        assert!(!check.action.admits_entry());
    }

    #[test]
    fn test_consecutive_losses_track_and_reset() {
        let mut g = guard();
        for _ in 0..3 {
            g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500)));
            g.remove_position("BTC/USDT", dec!(-10));
        }
        assert_eq!(g.consecutive_losses(), 3);

        g.update_position(position("BTC/USDT", dec!(0.1), dec!(93500), dec!(93500)));
        g.remove_position("BTC/USDT", dec!(5));
        assert_eq!(g.consecutive_losses(), 0);
    }

    #[test]
    fn test_limits_validation() {
        let mut limits = RiskLimits::default();
        limits.initial_capital = Decimal::ZERO;
        assert!(limits.validate().is_err());

        let mut limits = RiskLimits::default();
        limits.max_concentration = dec!(1.5);
        assert!(limits.validate().is_err());

        assert!(RiskLimits::default().validate().is_ok());
    }
}
