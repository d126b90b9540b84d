//! Inventory-aware market maker.
//!
//! Quotes one side of a volatility-scaled spread around a dynamic mid
//! (EMA of the tick mid). Inventory skews both the quoted side and the
//! quote price: long inventory leans on the ask to shed exposure, short
//! inventory leans on the bid. With flat inventory the quoted side
//! alternates so both sides of the book get worked.

use crate::indicators::{Ema, RollingVolatility};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use skuld_core::core::{ReasonCode, Side};
use skuld_core::data::Tick;
use skuld_core::strategy::{Signal, Strategy};

#[derive(Debug, Clone)]
pub struct MarketMakerConfig {
    /// Base half-spread in bps around the dynamic mid.
    pub base_half_spread_bps: Decimal,
    /// Floor for the half-spread after all adjustments.
    pub min_half_spread_bps: Decimal,
    /// Extra half-spread per bp of rolling volatility.
    pub vol_multiplier: Decimal,
    /// Quote size.
    pub size: Decimal,
    /// Inventory level treated as neutral.
    pub target_inventory: Decimal,
    /// Price skew in bps per unit of inventory imbalance.
    pub skew_bps_per_unit: Decimal,
    /// Period of the dynamic-mid EMA.
    pub mid_period: usize,
    /// Window of the volatility estimator.
    pub vol_window: usize,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            base_half_spread_bps: Decimal::from(5),
            min_half_spread_bps: Decimal::ONE,
            vol_multiplier: Decimal::new(5, 1),
            size: Decimal::new(1, 2),
            target_inventory: Decimal::ZERO,
            skew_bps_per_unit: Decimal::from(100),
            mid_period: 20,
            vol_window: 32,
        }
    }
}

pub struct MarketMaker {
    config: MarketMakerConfig,
    dynamic_mid: Ema,
    volatility: RollingVolatility,
    inventory: Decimal,
    last_quoted: Side,
}

impl MarketMaker {
    pub fn new(config: MarketMakerConfig) -> Self {
        let dynamic_mid = Ema::new(config.mid_period);
        let volatility = RollingVolatility::new(config.vol_window);
        Self {
            config,
            dynamic_mid,
            volatility,
            inventory: Decimal::ZERO,
            last_quoted: Side::Sell,
        }
    }

    /// Inform the maker of a fill so inventory skew stays honest. The
    /// driver calls this; the engine core never mutates strategies.
    pub fn record_fill(&mut self, side: Side, size: Decimal) {
        match side {
            Side::Buy => self.inventory += size,
            Side::Sell => self.inventory -= size,
        }
    }

    pub fn inventory(&self) -> Decimal {
        self.inventory
    }

    /// Half-spread in bps, widened by current volatility.
    fn half_spread_bps(&self) -> Decimal {
        let vol_bps = self
            .volatility
            .value_bps()
            .and_then(Decimal::from_f64)
            .unwrap_or(Decimal::ZERO);
        (self.config.base_half_spread_bps + vol_bps * self.config.vol_multiplier)
            .max(self.config.min_half_spread_bps)
    }

    /// Which side to quote given inventory imbalance.
    fn quote_side(&mut self) -> Side {
        let imbalance = self.inventory - self.config.target_inventory;
        if imbalance > Decimal::ZERO {
            Side::Sell
        } else if imbalance < Decimal::ZERO {
            Side::Buy
        } else {
            // Balanced: alternate.
            self.last_quoted = self.last_quoted.opposite();
            self.last_quoted
        }
    }
}

impl Default for MarketMaker {
    fn default() -> Self {
        Self::new(MarketMakerConfig::default())
    }
}

impl Strategy for MarketMaker {
    fn id(&self) -> &str {
        "market_maker"
    }

    fn on_tick(&mut self, tick: &Tick) -> Option<Signal> {
        let tick_mid = tick.mid();
        let dynamic_mid = self.dynamic_mid.update(tick_mid);
        self.volatility.update(tick_mid);

        let mid = dynamic_mid?;
        if !self.volatility.ready() {
            return None;
        }

        let half_spread = self.half_spread_bps() / Decimal::from(10_000);
        let imbalance = self.inventory - self.config.target_inventory;
        let skew =
            imbalance * self.config.skew_bps_per_unit / Decimal::from(10_000);
        // Long inventory shifts both quotes down (easier to sell out),
        // short inventory shifts them up.
        let skewed_mid = mid * (Decimal::ONE - skew);

        let side = self.quote_side();
        let (entry, take_profit, stop_loss) = match side {
            Side::Buy => (
                skewed_mid * (Decimal::ONE - half_spread),
                skewed_mid * (Decimal::ONE + half_spread),
                skewed_mid * (Decimal::ONE - half_spread * Decimal::from(3)),
            ),
            Side::Sell => (
                skewed_mid * (Decimal::ONE + half_spread),
                skewed_mid * (Decimal::ONE - half_spread),
                skewed_mid * (Decimal::ONE + half_spread * Decimal::from(3)),
            ),
        };

        // Wide markets erode edge; scale conviction down as realized
        // volatility eats into the quoted spread.
        let confidence = if self.half_spread_bps() > self.config.base_half_spread_bps * Decimal::TWO
        {
            0.45
        } else {
            0.6
        };

        Some(Signal {
            strategy_id: self.id().to_string(),
            side,
            entry_price: entry.round_dp(8),
            take_profit: take_profit.round_dp(8),
            stop_loss: stop_loss.round_dp(8),
            size: self.config.size,
            confidence,
            reason_code: ReasonCode::SignalMarketMaking,
            reason_detail: format!(
                "quoting {} at {} bps half-spread, inventory {}",
                side,
                self.half_spread_bps().round_dp(2),
                self.inventory,
            ),
            metadata: serde_json::json!({
                "dynamic_mid": mid.to_string(),
                "half_spread_bps": self.half_spread_bps().to_string(),
                "inventory": self.inventory.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(mid: Decimal, n: f64) -> Tick {
        Tick {
            symbol: "BTC/USDT".into(),
            exchange_timestamp: n,
            local_timestamp: n,
            bid: mid - dec!(5),
            ask: mid + dec!(5),
            last: mid,
            volume: dec!(10),
            depth: None,
            integrity: None,
        }
    }

    fn warm(maker: &mut MarketMaker, ticks: usize) -> Option<Signal> {
        let mut signal = None;
        for i in 0..ticks {
            signal = maker.on_tick(&tick(dec!(93500), i as f64));
        }
        signal
    }

    #[test]
    fn test_quiet_until_buffers_full() {
        let mut maker = MarketMaker::default();
        for i in 0..15 {
            assert!(maker.on_tick(&tick(dec!(93500), i as f64)).is_none());
        }
    }

    #[test]
    fn test_quotes_after_warmup() {
        let mut maker = MarketMaker::default();
        let signal = warm(&mut maker, 40).unwrap();
        assert_eq!(signal.reason_code, ReasonCode::SignalMarketMaking);
        assert!(signal.size > Decimal::ZERO);
        // Flat tape: quote hugs the mid at the base half-spread.
        let mid = dec!(93500);
        assert!((signal.entry_price - mid).abs() / mid < dec!(0.001));
    }

    #[test]
    fn test_alternates_sides_when_flat() {
        let mut maker = MarketMaker::default();
        warm(&mut maker, 40);
        let first = maker.on_tick(&tick(dec!(93500), 100.0)).unwrap();
        let second = maker.on_tick(&tick(dec!(93500), 101.0)).unwrap();
        assert_ne!(first.side, second.side);
    }

    #[test]
    fn test_long_inventory_quotes_ask() {
        let mut maker = MarketMaker::default();
        warm(&mut maker, 40);
        maker.record_fill(Side::Buy, dec!(0.05));

        for i in 0..4 {
            let signal = maker.on_tick(&tick(dec!(93500), 200.0 + i as f64)).unwrap();
            assert_eq!(signal.side, Side::Sell);
        }
    }

    #[test]
    fn test_short_inventory_quotes_bid() {
        let mut maker = MarketMaker::default();
        warm(&mut maker, 40);
        maker.record_fill(Side::Sell, dec!(0.05));

        let signal = maker.on_tick(&tick(dec!(93500), 200.0)).unwrap();
        assert_eq!(signal.side, Side::Buy);
    }

    #[test]
    fn test_long_inventory_skews_quotes_down() {
        let mut flat = MarketMaker::default();
        warm(&mut flat, 40);
        let mut long = MarketMaker::default();
        warm(&mut long, 40);
        long.record_fill(Side::Buy, dec!(0.5));

        // Compare sell quotes: the long maker asks lower to get flat.
        let flat_sell = loop {
            let s = flat.on_tick(&tick(dec!(93500), 300.0)).unwrap();
            if s.side == Side::Sell {
                break s;
            }
        };
        let long_sell = long.on_tick(&tick(dec!(93500), 300.0)).unwrap();
        assert_eq!(long_sell.side, Side::Sell);
        assert!(long_sell.entry_price < flat_sell.entry_price);
    }

    #[test]
    fn test_volatility_widens_spread() {
        let mut calm = MarketMaker::default();
        warm(&mut calm, 40);

        let mut choppy = MarketMaker::default();
        let mut up = true;
        for i in 0..40 {
            let mid = if up { dec!(93900) } else { dec!(93100) };
            choppy.on_tick(&tick(mid, i as f64));
            up = !up;
        }

        assert!(choppy.half_spread_bps() > calm.half_spread_bps());
    }
}
