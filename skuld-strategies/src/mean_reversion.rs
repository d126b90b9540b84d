//! Mean-reversion strategy.
//!
//! Measures how far price has stretched from its rolling mean in
//! standard deviations and fades the extremes: buy deep dips, sell
//! sharp spikes, targeting a return to the mean.

use crate::indicators::RollingWindow;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use skuld_core::core::{ReasonCode, Side};
use skuld_core::data::Tick;
use skuld_core::strategy::{Signal, Strategy};

#[derive(Debug, Clone)]
pub struct MeanReversionConfig {
    /// Ticks in the rolling mean window.
    pub window: usize,
    /// Z-score magnitude required to fade a move.
    pub entry_z: f64,
    /// Stop distance as a fraction of entry; the target is the mean.
    pub stop_loss_pct: Decimal,
    pub size: Decimal,
    /// Ignore windows with negligible dispersion.
    pub min_std_dev: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            window: 30,
            entry_z: 2.0,
            stop_loss_pct: Decimal::new(1, 2),
            size: Decimal::new(1, 2),
            min_std_dev: 1e-9,
        }
    }
}

pub struct MeanReversion {
    config: MeanReversionConfig,
    window: RollingWindow,
}

impl MeanReversion {
    pub fn new(config: MeanReversionConfig) -> Self {
        let window = RollingWindow::new(config.window);
        Self { config, window }
    }
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self::new(MeanReversionConfig::default())
    }
}

impl Strategy for MeanReversion {
    fn id(&self) -> &str {
        "mean_reversion"
    }

    fn on_tick(&mut self, tick: &Tick) -> Option<Signal> {
        use rust_decimal::prelude::ToPrimitive;

        let price = tick.last;
        self.window.push(price);
        if !self.window.is_full() {
            return None;
        }

        let mean = self.window.mean()?;
        let std_dev = self.window.std_dev()?;
        if std_dev < self.config.min_std_dev {
            return None;
        }

        let z = (price - mean).to_f64()? / std_dev;
        if z.abs() < self.config.entry_z {
            return None;
        }

        // Stretched below the mean: buy the dip. Above: sell the rip.
        let side = if z < 0.0 { Side::Buy } else { Side::Sell };

        let stop_offset = price * self.config.stop_loss_pct;
        let (take_profit, stop_loss) = match side {
            Side::Buy => (mean, price - stop_offset),
            Side::Sell => (mean, price + stop_offset),
        };

        // Degenerate geometry: the mean is on the wrong side of entry.
        match side {
            Side::Buy if take_profit <= price => return None,
            Side::Sell if take_profit >= price => return None,
            _ => {}
        }

        // Conviction grows with the stretch, saturating at 4 sigma.
        let confidence = (z.abs() / 4.0).clamp(0.0, 0.95);

        Some(Signal {
            strategy_id: self.id().to_string(),
            side,
            entry_price: price,
            take_profit,
            stop_loss,
            size: self.config.size,
            confidence,
            reason_code: ReasonCode::SignalMeanReversion,
            reason_detail: format!(
                "price {} sigma from mean {}",
                Decimal::from_f64(z)
                    .map(|d| d.round_dp(2))
                    .unwrap_or_default(),
                mean.round_dp(2),
            ),
            metadata: serde_json::json!({
                "z_score": z,
                "mean": mean.to_string(),
                "std_dev": std_dev,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(price: Decimal, n: f64) -> Tick {
        Tick {
            symbol: "BTC/USDT".into(),
            exchange_timestamp: n,
            local_timestamp: n,
            bid: price - dec!(5),
            ask: price + dec!(5),
            last: price,
            volume: dec!(100),
            depth: None,
            integrity: None,
        }
    }

    /// Mildly oscillating tape so the window has non-trivial dispersion.
    fn warm(strategy: &mut MeanReversion) {
        for i in 0..30u32 {
            let wiggle = Decimal::from(i % 5 * 10);
            assert!(strategy
                .on_tick(&tick(dec!(93500) + wiggle, i as f64))
                .is_none());
        }
    }

    #[test]
    fn test_quiet_until_window_full() {
        let mut strategy = MeanReversion::default();
        for i in 0..29 {
            assert!(strategy.on_tick(&tick(dec!(93500), i as f64)).is_none());
        }
    }

    #[test]
    fn test_flat_tape_never_signals() {
        let mut strategy = MeanReversion::default();
        for i in 0..60 {
            assert!(strategy.on_tick(&tick(dec!(93500), i as f64)).is_none());
        }
    }

    #[test]
    fn test_spike_down_buys_toward_mean() {
        let mut strategy = MeanReversion::default();
        warm(&mut strategy);

        let signal = strategy.on_tick(&tick(dec!(93300), 100.0)).unwrap();
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.reason_code, ReasonCode::SignalMeanReversion);
        assert!(signal.take_profit > signal.entry_price);
        assert!(signal.stop_loss < signal.entry_price);
        assert!(signal.confidence > 0.4);
    }

    #[test]
    fn test_spike_up_sells_toward_mean() {
        let mut strategy = MeanReversion::default();
        warm(&mut strategy);

        let signal = strategy.on_tick(&tick(dec!(93750), 100.0)).unwrap();
        assert_eq!(signal.side, Side::Sell);
        assert!(signal.take_profit < signal.entry_price);
        assert!(signal.stop_loss > signal.entry_price);
    }

    #[test]
    fn test_small_stretch_ignored() {
        let mut strategy = MeanReversion::default();
        warm(&mut strategy);
        assert!(strategy.on_tick(&tick(dec!(93530), 100.0)).is_none());
    }
}
