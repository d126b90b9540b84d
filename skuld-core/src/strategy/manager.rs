//! Multi-strategy registry and signal selection.
//!
//! Each registered strategy carries a revenue-share target and a running
//! performance record. Per tick the manager gathers candidate signals,
//! scores them as `0.4·confidence + priority_weight + 0.3·performance`,
//! and hands the engine the winner. Strategies that demonstrably lose
//! (ten or more trades with a sub-30% win rate or a Sharpe below -1) are
//! disabled automatically.

use crate::data::Tick;
use crate::strategy::{Signal, Strategy};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Lifecycle state of a registered strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Active,
    Inactive,
    Degraded,
    Disabled,
}

/// How many recent trade returns feed the Sharpe-like ratio.
const RETURN_WINDOW: usize = 256;
/// Trades required before the auto-disable rule may fire.
const MIN_TRADES_FOR_DISABLE: u64 = 10;

/// Running performance record for one strategy.
#[derive(Debug, Clone)]
pub struct StrategyMetrics {
    pub strategy_id: String,
    pub status: StrategyStatus,
    /// Target share of total revenue, as a fraction.
    pub revenue_target: Decimal,
    pub revenue_generated: Decimal,
    pub signals_generated: u64,
    pub trades_executed: u64,
    pub wins: u64,
    pub losses: u64,
    pub last_signal_at: Option<f64>,
    returns: VecDeque<f64>,
}

impl StrategyMetrics {
    fn new(strategy_id: String, revenue_target: Decimal) -> Self {
        Self {
            strategy_id,
            status: StrategyStatus::Active,
            revenue_target,
            revenue_generated: Decimal::ZERO,
            signals_generated: 0,
            trades_executed: 0,
            wins: 0,
            losses: 0,
            last_signal_at: None,
            returns: VecDeque::new(),
        }
    }

    /// Win rate in percent over executed trades.
    pub fn win_rate(&self) -> f64 {
        if self.trades_executed == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades_executed as f64 * 100.0
    }

    /// Sharpe-like ratio over the recent return window: mean over
    /// standard deviation, no annualization.
    pub fn sharpe(&self) -> f64 {
        let n = self.returns.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.returns.iter().sum::<f64>() / n as f64;
        let variance =
            self.returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            return 0.0;
        }
        mean / std_dev
    }

    /// Blended performance score in [0, 1]:
    /// 0.4·win-rate + 0.3·normalized Sharpe + 0.3·revenue-vs-target.
    pub fn performance_score(&self, total_revenue: Decimal) -> f64 {
        let win_rate_score = (self.win_rate() / 100.0).min(1.0) * 0.4;
        let sharpe_score = (self.sharpe().max(0.0) / 3.0).min(1.0) * 0.3;

        let revenue_score = if self.revenue_target > Decimal::ZERO && total_revenue > Decimal::ZERO
        {
            let target_revenue = total_revenue * self.revenue_target;
            let ratio = (self.revenue_generated / target_revenue)
                .to_f64()
                .unwrap_or(0.0);
            ratio.clamp(0.0, 1.0) * 0.3
        } else {
            // No target or no revenue yet: stay neutral.
            0.15
        };

        win_rate_score + sharpe_score + revenue_score
    }
}

/// Owns the strategies and selects the best signal per tick.
pub struct SignalManager {
    strategies: Vec<Box<dyn Strategy>>,
    metrics: HashMap<String, StrategyMetrics>,
    total_revenue: Decimal,
    total_trades: u64,
}

impl SignalManager {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            metrics: HashMap::new(),
            total_revenue: Decimal::ZERO,
            total_trades: 0,
        }
    }

    /// Register a strategy with its revenue-share target.
    pub fn register(&mut self, strategy: Box<dyn Strategy>, revenue_target: Decimal) {
        let id = strategy.id().to_string();
        info!(strategy = %id, target = %revenue_target, "strategy registered");
        self.metrics
            .insert(id.clone(), StrategyMetrics::new(id, revenue_target));
        self.strategies.push(strategy);
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    pub fn metrics(&self, strategy_id: &str) -> Option<&StrategyMetrics> {
        self.metrics.get(strategy_id)
    }

    pub fn all_metrics(&self) -> impl Iterator<Item = &StrategyMetrics> {
        self.metrics.values()
    }

    pub fn total_revenue(&self) -> Decimal {
        self.total_revenue
    }

    pub fn set_status(&mut self, strategy_id: &str, status: StrategyStatus) {
        if let Some(metrics) = self.metrics.get_mut(strategy_id) {
            metrics.status = status;
        }
    }

    /// Feed the tick to every active strategy and gather their signals.
    pub fn collect(&mut self, tick: &Tick) -> Vec<Signal> {
        let mut signals = Vec::new();

        for strategy in &mut self.strategies {
            let Some(metrics) = self.metrics.get_mut(strategy.id()) else {
                continue;
            };
            if metrics.status != StrategyStatus::Active {
                continue;
            }

            if let Some(signal) = strategy.on_tick(tick) {
                metrics.signals_generated += 1;
                metrics.last_signal_at = Some(tick.local_timestamp);
                debug!(strategy = %signal.strategy_id, %signal, "signal collected");
                signals.push(signal);
            }
        }

        signals
    }

    /// Pick the highest-scoring signal. Ties keep the earliest.
    pub fn select_best(&self, signals: Vec<Signal>) -> Option<Signal> {
        let mut best: Option<(f64, Signal)> = None;

        for signal in signals {
            let score = self.score(&signal);
            match &best {
                Some((best_score, _)) if *best_score >= score => {}
                _ => best = Some((score, signal)),
            }
        }

        if let Some((score, signal)) = &best {
            debug!(%signal, score, "signal selected");
        }
        best.map(|(_, signal)| signal)
    }

    /// Score one signal: confidence, priority band, then the producing
    /// strategy's track record.
    pub fn score(&self, signal: &Signal) -> f64 {
        let confidence_score = signal.confidence * 0.4;
        let priority_score = signal.priority().weight();
        let performance_score = self
            .metrics
            .get(&signal.strategy_id)
            .map(|m| m.performance_score(self.total_revenue) * 0.3)
            .unwrap_or(0.15);

        confidence_score + priority_score + performance_score
    }

    /// Fold a closed trade's realized P&L back into the originating
    /// strategy's record, possibly disabling it.
    pub fn record_trade_result(&mut self, strategy_id: &str, pnl: Decimal) {
        self.total_revenue += pnl;
        self.total_trades += 1;

        let Some(metrics) = self.metrics.get_mut(strategy_id) else {
            warn!(strategy = strategy_id, "trade result for unknown strategy");
            return;
        };

        metrics.trades_executed += 1;
        metrics.revenue_generated += pnl;
        if pnl > Decimal::ZERO {
            metrics.wins += 1;
        } else {
            metrics.losses += 1;
        }
        if metrics.returns.len() == RETURN_WINDOW {
            metrics.returns.pop_front();
        }
        metrics.returns.push_back(pnl.to_f64().unwrap_or(0.0));

        if metrics.trades_executed >= MIN_TRADES_FOR_DISABLE
            && metrics.status == StrategyStatus::Active
        {
            if metrics.win_rate() < 30.0 {
                warn!(
                    strategy = strategy_id,
                    win_rate = metrics.win_rate(),
                    "disabling strategy: low win rate"
                );
                metrics.status = StrategyStatus::Disabled;
            } else if metrics.sharpe() < -1.0 {
                warn!(
                    strategy = strategy_id,
                    sharpe = metrics.sharpe(),
                    "disabling strategy: negative sharpe"
                );
                metrics.status = StrategyStatus::Disabled;
            }
        }
    }
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ReasonCode, Side};
    use crate::data::Tick;
    use rust_decimal_macros::dec;

    struct FixedStrategy {
        id: String,
        confidence: f64,
        every_tick: bool,
    }

    impl Strategy for FixedStrategy {
        fn id(&self) -> &str {
            &self.id
        }

        fn on_tick(&mut self, tick: &Tick) -> Option<Signal> {
            self.every_tick.then(|| Signal {
                strategy_id: self.id.clone(),
                side: Side::Buy,
                entry_price: tick.last,
                take_profit: tick.last * dec!(1.01),
                stop_loss: tick.last * dec!(0.99),
                size: dec!(0.01),
                confidence: self.confidence,
                reason_code: ReasonCode::SignalStrong,
                reason_detail: "fixed".into(),
                metadata: serde_json::Value::Null,
            })
        }
    }

    fn tick() -> Tick {
        Tick {
            symbol: "BTC/USDT".into(),
            exchange_timestamp: 1.0,
            local_timestamp: 1.0,
            bid: dec!(93490),
            ask: dec!(93510),
            last: dec!(93500),
            volume: dec!(100),
            depth: None,
            integrity: None,
        }
    }

    fn manager_with(strategies: Vec<(&str, f64)>) -> SignalManager {
        let mut manager = SignalManager::new();
        for (id, confidence) in strategies {
            manager.register(
                Box::new(FixedStrategy {
                    id: id.into(),
                    confidence,
                    every_tick: true,
                }),
                dec!(0.33),
            );
        }
        manager
    }

    #[test]
    fn test_collect_gathers_active_signals() {
        let mut manager = manager_with(vec![("a", 0.7), ("b", 0.5)]);
        let signals = manager.collect(&tick());
        assert_eq!(signals.len(), 2);
        assert_eq!(manager.metrics("a").unwrap().signals_generated, 1);
    }

    #[test]
    fn test_inactive_strategies_are_skipped() {
        let mut manager = manager_with(vec![("a", 0.7), ("b", 0.5)]);
        manager.set_status("b", StrategyStatus::Inactive);
        let signals = manager.collect(&tick());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].strategy_id, "a");
    }

    #[test]
    fn test_higher_confidence_wins_selection() {
        let mut manager = manager_with(vec![("weak", 0.45), ("strong", 0.85)]);
        let signals = manager.collect(&tick());
        let best = manager.select_best(signals).unwrap();
        assert_eq!(best.strategy_id, "strong");
    }

    #[test]
    fn test_score_components() {
        let mut manager = manager_with(vec![("a", 0.85)]);
        let signals = manager.collect(&tick());
        let score = manager.score(&signals[0]);
        // 0.85 * 0.4 + critical 0.3 + fresh-strategy performance
        // (neutral revenue component 0.15, weighted by 0.3)
        assert!((score - (0.34 + 0.3 + 0.045)).abs() < 1e-9);
    }

    #[test]
    fn test_trade_results_update_metrics() {
        let mut manager = manager_with(vec![("a", 0.7)]);
        manager.record_trade_result("a", dec!(100));
        manager.record_trade_result("a", dec!(-40));

        let metrics = manager.metrics("a").unwrap();
        assert_eq!(metrics.trades_executed, 2);
        assert_eq!(metrics.wins, 1);
        assert_eq!(metrics.losses, 1);
        assert_eq!(metrics.revenue_generated, dec!(60));
        assert!((metrics.win_rate() - 50.0).abs() < 1e-9);
        assert_eq!(manager.total_revenue(), dec!(60));
    }

    #[test]
    fn test_auto_disable_on_low_win_rate() {
        let mut manager = manager_with(vec![("loser", 0.7)]);
        // 2 wins, 8 losses over 10 trades: 20% win rate.
        for i in 0..10 {
            let pnl = if i < 2 { dec!(10) } else { dec!(-10) };
            manager.record_trade_result("loser", pnl);
        }
        assert_eq!(
            manager.metrics("loser").unwrap().status,
            StrategyStatus::Disabled
        );

        // Disabled strategies stop producing.
        let signals = manager.collect(&tick());
        assert!(signals.is_empty());
    }

    #[test]
    fn test_no_disable_before_minimum_trades() {
        let mut manager = manager_with(vec![("young", 0.7)]);
        for _ in 0..9 {
            manager.record_trade_result("young", dec!(-10));
        }
        assert_eq!(
            manager.metrics("young").unwrap().status,
            StrategyStatus::Active
        );
    }

    #[test]
    fn test_sharpe_of_consistent_winner_is_positive() {
        let mut metrics = StrategyMetrics::new("x".into(), dec!(0.33));
        for i in 0..20 {
            metrics.returns.push_back(10.0 + (i % 3) as f64);
        }
        assert!(metrics.sharpe() > 1.0);
    }
}
