//! Rolling-window indicators shared by the strategies.
//!
//! Every indicator owns a fixed-capacity buffer sized at construction:
//! after warm-up there is no allocation per tick, and none of them ever
//! reads a clock. Prices stay `Decimal`; derived ratios (RSI, returns,
//! volatility) come out as `f64` because they feed confidence math, not
//! money math.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Fixed-capacity price window.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<Decimal>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: Decimal) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Buffer has reached capacity.
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn front(&self) -> Option<Decimal> {
        self.values.front().copied()
    }

    pub fn back(&self) -> Option<Decimal> {
        self.values.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.values.iter().copied()
    }

    pub fn mean(&self) -> Option<Decimal> {
        if self.values.is_empty() {
            return None;
        }
        let sum: Decimal = self.values.iter().copied().sum();
        Some(sum / Decimal::from(self.values.len() as u64))
    }

    /// Fractional change from the oldest to the newest value.
    pub fn total_return(&self) -> Option<Decimal> {
        let first = self.front()?;
        let last = self.back()?;
        if first.is_zero() {
            return None;
        }
        Some((last - first) / first)
    }

    /// Sample standard deviation of the window contents.
    pub fn std_dev(&self) -> Option<f64> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }
        let mean = self.mean()?.to_f64()?;
        let variance = self
            .values
            .iter()
            .filter_map(|v| v.to_f64())
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        Some(variance.sqrt())
    }
}

/// Exponential moving average over prices.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    value: Option<Decimal>,
    count: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            value: None,
            count: 0,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        self.count += 1;
        let alpha = Decimal::TWO / Decimal::from((self.period + 1) as u64);
        self.value = Some(match self.value {
            None => price,
            Some(prev) => alpha * price + (Decimal::ONE - alpha) * prev,
        });
        self.ready().then_some(self.value).flatten()
    }

    pub fn value(&self) -> Option<Decimal> {
        self.ready().then_some(self.value).flatten()
    }

    pub fn ready(&self) -> bool {
        self.count >= self.period
    }
}

/// Wilder-smoothed relative strength index.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    last_price: Option<Decimal>,
    avg_gain: f64,
    avg_loss: f64,
    count: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            last_price: None,
            avg_gain: 0.0,
            avg_loss: 0.0,
            count: 0,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<f64> {
        let Some(last) = self.last_price.replace(price) else {
            return None;
        };

        let change = (price - last).to_f64().unwrap_or(0.0);
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        self.count += 1;
        if self.count <= self.period {
            // Seed with simple averages until the window is full.
            self.avg_gain += (gain - self.avg_gain) / self.count as f64;
            self.avg_loss += (loss - self.avg_loss) / self.count as f64;
        } else {
            let n = self.period as f64;
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if !self.ready() {
            return None;
        }
        if self.avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }

    pub fn ready(&self) -> bool {
        self.count >= self.period
    }
}

/// Rolling volatility of per-tick returns, reported in basis points.
#[derive(Debug, Clone)]
pub struct RollingVolatility {
    returns_bps: VecDeque<f64>,
    capacity: usize,
    last_price: Option<Decimal>,
}

impl RollingVolatility {
    pub fn new(capacity: usize) -> Self {
        Self {
            returns_bps: VecDeque::with_capacity(capacity.max(2)),
            capacity: capacity.max(2),
            last_price: None,
        }
    }

    pub fn update(&mut self, price: Decimal) {
        if let Some(last) = self.last_price.replace(price) {
            if !last.is_zero() {
                let ret = ((price - last) / last * Decimal::from(10_000))
                    .to_f64()
                    .unwrap_or(0.0);
                if self.returns_bps.len() == self.capacity {
                    self.returns_bps.pop_front();
                }
                self.returns_bps.push_back(ret);
            }
        }
    }

    /// Standard deviation of returns in bps.
    pub fn value_bps(&self) -> Option<f64> {
        let n = self.returns_bps.len();
        if n < 2 {
            return None;
        }
        let mean = self.returns_bps.iter().sum::<f64>() / n as f64;
        let variance = self
            .returns_bps
            .iter()
            .map(|r| (r - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        Some(variance.sqrt())
    }

    pub fn ready(&self) -> bool {
        self.returns_bps.len() >= self.capacity / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rolling_window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for value in [1, 2, 3, 4] {
            window.push(Decimal::from(value));
        }
        assert!(window.is_full());
        assert_eq!(window.front(), Some(dec!(2)));
        assert_eq!(window.back(), Some(dec!(4)));
    }

    #[test]
    fn test_rolling_window_total_return() {
        let mut window = RollingWindow::new(4);
        window.push(dec!(100));
        window.push(dec!(101));
        window.push(dec!(102));
        assert_eq!(window.total_return(), Some(dec!(0.02)));
    }

    #[test]
    fn test_ema_warms_up_then_tracks() {
        let mut ema = Ema::new(3);
        assert!(ema.update(dec!(100)).is_none());
        assert!(ema.update(dec!(100)).is_none());
        let value = ema.update(dec!(100)).unwrap();
        assert_eq!(value, dec!(100));

        // A jump pulls the average up, but not all the way.
        let value = ema.update(dec!(110)).unwrap();
        assert!(value > dec!(100) && value < dec!(110));
    }

    #[test]
    fn test_rsi_extremes() {
        let mut rsi = Rsi::new(5);
        let mut price = dec!(100);
        for _ in 0..10 {
            price += dec!(1);
            rsi.update(price);
        }
        // Straight up: RSI pegged at 100.
        assert_eq!(rsi.value(), Some(100.0));

        let mut rsi = Rsi::new(5);
        let mut price = dec!(100);
        for _ in 0..10 {
            price -= dec!(1);
            rsi.update(price);
        }
        assert!(rsi.value().unwrap() < 1.0);
    }

    #[test]
    fn test_rsi_not_ready_early() {
        let mut rsi = Rsi::new(14);
        assert!(rsi.update(dec!(100)).is_none());
        assert!(rsi.update(dec!(101)).is_none());
        assert!(!rsi.ready());
    }

    #[test]
    fn test_volatility_flat_is_zero() {
        let mut vol = RollingVolatility::new(10);
        for _ in 0..10 {
            vol.update(dec!(93500));
        }
        assert_eq!(vol.value_bps(), Some(0.0));
    }

    #[test]
    fn test_volatility_detects_swings() {
        let mut vol = RollingVolatility::new(10);
        let mut up = true;
        for _ in 0..10 {
            vol.update(if up { dec!(94000) } else { dec!(93000) });
            up = !up;
        }
        assert!(vol.value_bps().unwrap() > 50.0);
    }
}
