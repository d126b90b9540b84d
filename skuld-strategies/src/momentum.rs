//! Momentum strategy with an RSI exhaustion filter.
//!
//! Long when the lookback return clears the threshold, short when it
//! clears it downward, but never into an exhausted move: overbought RSI
//! blocks new longs, oversold RSI blocks new shorts.

use crate::indicators::{RollingWindow, Rsi};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use skuld_core::core::{ReasonCode, Side};
use skuld_core::data::Tick;
use skuld_core::strategy::{Signal, Strategy};

#[derive(Debug, Clone)]
pub struct MomentumConfig {
    /// Ticks in the momentum lookback window.
    pub lookback: usize,
    /// Fractional move over the lookback that counts as momentum.
    pub threshold: Decimal,
    /// Minimum normalized strength to act on.
    pub min_strength: f64,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub size: Decimal,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            threshold: Decimal::new(1, 3),
            min_strength: 0.3,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            take_profit_pct: Decimal::new(1, 2),
            stop_loss_pct: Decimal::new(1, 2),
            size: Decimal::new(1, 2),
        }
    }
}

pub struct Momentum {
    config: MomentumConfig,
    window: RollingWindow,
    rsi: Rsi,
}

impl Momentum {
    pub fn new(config: MomentumConfig) -> Self {
        let window = RollingWindow::new(config.lookback);
        let rsi = Rsi::new(config.rsi_period);
        Self {
            config,
            window,
            rsi,
        }
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self::new(MomentumConfig::default())
    }
}

impl Strategy for Momentum {
    fn id(&self) -> &str {
        "momentum"
    }

    fn on_tick(&mut self, tick: &Tick) -> Option<Signal> {
        let price = tick.last;
        self.window.push(price);
        let rsi = self.rsi.update(price);

        if !self.window.is_full() {
            return None;
        }
        let rsi = rsi?;

        let momentum = self.window.total_return()?;
        let strength = (momentum.abs() / self.config.threshold)
            .to_f64()
            .unwrap_or(0.0)
            .min(1.0);
        if strength < self.config.min_strength {
            return None;
        }

        let side = if momentum > self.config.threshold {
            if rsi >= self.config.rsi_overbought {
                return None;
            }
            Side::Buy
        } else if momentum < -self.config.threshold {
            if rsi <= self.config.rsi_oversold {
                return None;
            }
            Side::Sell
        } else {
            return None;
        };

        let (take_profit, stop_loss) = match side {
            Side::Buy => (
                price * (Decimal::ONE + self.config.take_profit_pct),
                price * (Decimal::ONE - self.config.stop_loss_pct),
            ),
            Side::Sell => (
                price * (Decimal::ONE - self.config.take_profit_pct),
                price * (Decimal::ONE + self.config.stop_loss_pct),
            ),
        };

        Some(Signal {
            strategy_id: self.id().to_string(),
            side,
            entry_price: price,
            take_profit,
            stop_loss,
            size: self.config.size,
            confidence: strength,
            reason_code: ReasonCode::SignalTrend,
            reason_detail: format!(
                "lookback return {}% with rsi {:.1}",
                (momentum * Decimal::from(100)).round_dp(3),
                rsi,
            ),
            metadata: serde_json::json!({
                "momentum": momentum.to_string(),
                "rsi": rsi,
            }),
        })
    }
}
