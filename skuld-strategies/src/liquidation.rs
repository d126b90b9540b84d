//! Liquidation-cluster hunter.
//!
//! Watches for dense liquidation levels near the current mid and trades
//! the flush: long liquidations below price get faded with a short, short
//! liquidations above price get chased with a long, but only when the
//! trend filter agrees with the trade direction.
//!
//! Cluster discovery is behind the [`LiquidationLevels`] trait; the
//! engine core never fabricates levels. Backtests plug in
//! [`LeverageBandLevels`], which derives clusters purely from standard
//! leverage bands off the mid, so replays stay deterministic.

use crate::indicators::Ema;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use skuld_core::core::{PositionSide, ReasonCode, Side};
use skuld_core::data::Tick;
use skuld_core::strategy::{Signal, Strategy};
use tracing::debug;

/// A price level where leveraged positions get forced out.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationCluster {
    pub price: Decimal,
    pub volume: Decimal,
    /// Which side gets liquidated at this level.
    pub side: PositionSide,
}

/// Source of liquidation levels for a symbol around a mid price.
pub trait LiquidationLevels: Send {
    fn liquidation_levels(&self, symbol: &str, mid: Decimal) -> Vec<LiquidationCluster>;
}

/// Deterministic provider deriving clusters from standard leverage
/// bands: a 20x long liquidates ~5% below entry, so clusters sit at
/// `mid * (1 -/+ 1/leverage)` with volume growing with leverage.
#[derive(Debug, Clone)]
pub struct LeverageBandLevels {
    leverage_bands: Vec<u32>,
    /// Volume assigned per 10x of leverage.
    volume_per_10x: Decimal,
}

impl LeverageBandLevels {
    pub fn new(volume_per_10x: Decimal) -> Self {
        Self {
            leverage_bands: vec![10, 20, 50, 100],
            volume_per_10x,
        }
    }
}

impl Default for LeverageBandLevels {
    fn default() -> Self {
        Self::new(Decimal::from(120))
    }
}

impl LiquidationLevels for LeverageBandLevels {
    fn liquidation_levels(&self, _symbol: &str, mid: Decimal) -> Vec<LiquidationCluster> {
        let mut clusters = Vec::with_capacity(self.leverage_bands.len() * 2);
        for &leverage in &self.leverage_bands {
            let offset = Decimal::ONE / Decimal::from(leverage);
            let volume = self.volume_per_10x * Decimal::from(leverage) / Decimal::from(10);

            // Long liquidations below the mid, short liquidations above.
            clusters.push(LiquidationCluster {
                price: mid * (Decimal::ONE - offset),
                volume,
                side: PositionSide::Long,
            });
            clusters.push(LiquidationCluster {
                price: mid * (Decimal::ONE + offset),
                volume,
                side: PositionSide::Short,
            });
        }
        clusters
    }
}

/// Tunables for the hunter.
#[derive(Debug, Clone)]
pub struct LiquidationHunterConfig {
    /// Ignore clusters thinner than this.
    pub min_cluster_volume: Decimal,
    /// Enter when the nearest cluster is within this fraction of mid.
    pub entry_distance_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub base_size: Decimal,
    /// Drop signals below this confidence.
    pub min_confidence: f64,
    pub trend_fast_period: usize,
    pub trend_slow_period: usize,
}

impl Default for LiquidationHunterConfig {
    fn default() -> Self {
        Self {
            min_cluster_volume: Decimal::from(100),
            entry_distance_pct: Decimal::new(15, 3),
            take_profit_pct: Decimal::new(12, 3),
            stop_loss_pct: Decimal::new(12, 3),
            base_size: Decimal::new(1, 2),
            min_confidence: 0.4,
            trend_fast_period: 20,
            trend_slow_period: 50,
        }
    }
}

/// The strategy. Pure over its own EMAs plus the injected level source.
pub struct LiquidationHunter<P: LiquidationLevels> {
    config: LiquidationHunterConfig,
    provider: P,
    trend_fast: Ema,
    trend_slow: Ema,
    signals_filtered: u64,
}

impl<P: LiquidationLevels> LiquidationHunter<P> {
    pub fn new(config: LiquidationHunterConfig, provider: P) -> Self {
        let trend_fast = Ema::new(config.trend_fast_period);
        let trend_slow = Ema::new(config.trend_slow_period);
        Self {
            config,
            provider,
            trend_fast,
            trend_slow,
            signals_filtered: 0,
        }
    }

    pub fn signals_filtered(&self) -> u64 {
        self.signals_filtered
    }

    /// Trend agreement for a prospective direction. `None` while the
    /// EMAs are still warming up.
    fn trend_allows(&self, direction: PositionSide) -> Option<bool> {
        let fast = self.trend_fast.value()?;
        let slow = self.trend_slow.value()?;
        Some(match direction {
            PositionSide::Long => fast >= slow,
            PositionSide::Short => fast <= slow,
        })
    }

    fn confidence(&self, cluster: &LiquidationCluster, distance_pct: Decimal) -> f64 {
        use rust_decimal::prelude::ToPrimitive;

        // Thicker clusters and closer entries score higher.
        let volume_ratio = (cluster.volume / (self.config.min_cluster_volume * Decimal::TWO))
            .to_f64()
            .unwrap_or(0.0)
            .min(1.0);
        let proximity = 1.0
            - (distance_pct / self.config.entry_distance_pct)
                .to_f64()
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);

        // Trend already gated the direction; its presence is worth a
        // fixed component.
        (0.3 + volume_ratio * 0.4 + proximity * 0.3).clamp(0.0, 1.0)
    }
}

impl<P: LiquidationLevels> Strategy for LiquidationHunter<P> {
    fn id(&self) -> &str {
        "liquidation_hunter"
    }

    fn on_tick(&mut self, tick: &Tick) -> Option<Signal> {
        let mid = tick.mid();
        self.trend_fast.update(mid);
        self.trend_slow.update(mid);

        let clusters = self.provider.liquidation_levels(&tick.symbol, mid);
        let nearest = clusters
            .into_iter()
            .filter(|c| c.volume >= self.config.min_cluster_volume)
            .min_by_key(|c| (c.price - mid).abs())?;

        if mid.is_zero() {
            return None;
        }
        let distance_pct = (nearest.price - mid).abs() / mid;
        if distance_pct > self.config.entry_distance_pct {
            return None;
        }

        // Long liquidations cascade the price down: fade with a short.
        // Short liquidations squeeze it up: follow with a long.
        let (side, direction) = match nearest.side {
            PositionSide::Long => (Side::Sell, PositionSide::Short),
            PositionSide::Short => (Side::Buy, PositionSide::Long),
        };

        match self.trend_allows(direction) {
            // Warm-up not complete: stay quiet.
            None => return None,
            Some(false) => {
                self.signals_filtered += 1;
                debug!(direction = %direction, "liquidation signal blocked by trend");
                return None;
            }
            Some(true) => {}
        }

        let confidence = self.confidence(&nearest, distance_pct);
        if confidence < self.config.min_confidence {
            self.signals_filtered += 1;
            return None;
        }

        // Size scales with conviction, half to full base size.
        let size_multiplier =
            Decimal::from_f64(0.5 + confidence * 0.5).unwrap_or(Decimal::ONE);
        let size = (self.config.base_size * size_multiplier).round_dp(6);

        let (take_profit, stop_loss) = match side {
            Side::Buy => (
                mid * (Decimal::ONE + self.config.take_profit_pct),
                mid * (Decimal::ONE - self.config.stop_loss_pct),
            ),
            Side::Sell => (
                mid * (Decimal::ONE - self.config.take_profit_pct),
                mid * (Decimal::ONE + self.config.stop_loss_pct),
            ),
        };

        Some(Signal {
            strategy_id: self.id().to_string(),
            side,
            entry_price: mid,
            take_profit,
            stop_loss,
            size,
            confidence,
            reason_code: ReasonCode::SignalLiquidation,
            reason_detail: format!(
                "{} liquidation cluster at {} ({} within {}%)",
                nearest.side,
                nearest.price.round_dp(2),
                nearest.volume,
                (distance_pct * Decimal::from(100)).round_dp(2),
            ),
            metadata: serde_json::json!({
                "cluster_price": nearest.price.to_string(),
                "cluster_volume": nearest.volume.to_string(),
                "cluster_side": nearest.side.to_string(),
            }),
        })
    }
}
