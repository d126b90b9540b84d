//! Strategy contract and multi-strategy signal selection.

pub mod manager;

pub use manager::{SignalManager, StrategyMetrics, StrategyStatus};

use crate::core::{ReasonCode, Side};
use crate::data::Tick;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority band, derived from confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl SignalPriority {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 0.4 {
            SignalPriority::Low
        } else if confidence < 0.6 {
            SignalPriority::Medium
        } else if confidence < 0.8 {
            SignalPriority::High
        } else {
            SignalPriority::Critical
        }
    }

    /// Contribution to the selection score.
    pub fn weight(self) -> f64 {
        match self {
            SignalPriority::Low => 0.1,
            SignalPriority::Medium => 0.2,
            SignalPriority::High => 0.25,
            SignalPriority::Critical => 0.3,
        }
    }
}

/// A trade proposal from one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub side: Side,
    pub entry_price: Decimal,
    /// Target exit price.
    pub take_profit: Decimal,
    /// Protective exit price.
    pub stop_loss: Decimal,
    pub size: Decimal,
    /// Strategy conviction in [0, 1].
    pub confidence: f64,
    pub reason_code: ReasonCode,
    pub reason_detail: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Signal {
    pub fn priority(&self) -> SignalPriority {
        SignalPriority::from_confidence(self.confidence)
    }

    /// Take-profit distance as a fraction of entry.
    pub fn take_profit_pct(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        ((self.take_profit - self.entry_price) / self.entry_price).abs()
    }

    /// Stop-loss distance as a fraction of entry.
    pub fn stop_loss_pct(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        ((self.entry_price - self.stop_loss) / self.entry_price).abs()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} (conf {:.0}%, {})",
            self.strategy_id,
            self.side,
            self.entry_price,
            self.confidence * 100.0,
            self.reason_code,
        )
    }
}

/// A signal producer. Strategies are pure functions of their own rolling
/// buffers plus the current tick; they never touch engine state, and
/// they stay quiet until their buffers are warm.
pub trait Strategy: Send {
    /// Stable identifier used for attribution and performance tracking.
    fn id(&self) -> &str;

    /// Feed one tick; possibly produce a signal.
    fn on_tick(&mut self, tick: &Tick) -> Option<Signal>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_priority_bands() {
        assert_eq!(SignalPriority::from_confidence(0.1), SignalPriority::Low);
        assert_eq!(SignalPriority::from_confidence(0.4), SignalPriority::Medium);
        assert_eq!(SignalPriority::from_confidence(0.6), SignalPriority::High);
        assert_eq!(
            SignalPriority::from_confidence(0.8),
            SignalPriority::Critical
        );
    }

    #[test]
    fn test_priority_weights_increase() {
        assert!(SignalPriority::Low.weight() < SignalPriority::Medium.weight());
        assert!(SignalPriority::Medium.weight() < SignalPriority::High.weight());
        assert!(SignalPriority::High.weight() < SignalPriority::Critical.weight());
    }

    #[test]
    fn test_tp_sl_fractions() {
        let signal = Signal {
            strategy_id: "test".into(),
            side: Side::Buy,
            entry_price: dec!(100),
            take_profit: dec!(101),
            stop_loss: dec!(99),
            size: dec!(1),
            confidence: 0.7,
            reason_code: ReasonCode::SignalStrong,
            reason_detail: String::new(),
            metadata: serde_json::Value::Null,
        };
        assert_eq!(signal.take_profit_pct(), dec!(0.01));
        assert_eq!(signal.stop_loss_pct(), dec!(0.01));
    }
}
