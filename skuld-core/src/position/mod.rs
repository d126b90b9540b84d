//! Per-symbol open positions with TP/SL tracking.
//!
//! The book enforces at most one open position per symbol. Closing
//! removes the entry outright rather than zeroing it; `size > 0` is an
//! invariant of every position the book holds.

use crate::core::{EngineError, PositionSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub opened_at: f64,
    /// Take-profit distance as a fraction of entry (0.01 = 1%).
    pub take_profit_pct: Decimal,
    /// Stop-loss distance as a fraction of entry.
    pub stop_loss_pct: Decimal,
}

impl Position {
    pub fn entry_value(&self) -> Decimal {
        self.size * self.entry_price
    }

    pub fn current_value(&self) -> Decimal {
        self.size * self.current_price
    }

    /// Side-signed mark-to-market P&L.
    pub fn unrealized_pnl(&self) -> Decimal {
        self.side.signum() * (self.current_price - self.entry_price) * self.size
    }

    /// Unrealized P&L as a percentage of entry value.
    pub fn unrealized_pnl_pct(&self) -> Decimal {
        let entry_value = self.entry_value();
        if entry_value.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl() / entry_value * Decimal::from(100)
    }

    /// Side-signed fractional return of entry -> `price`.
    pub fn signed_return(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.side.signum() * (price - self.entry_price) / self.entry_price
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} (pnl {})",
            self.symbol,
            self.side,
            self.size,
            self.current_price,
            self.unrealized_pnl(),
        )
    }
}

/// Why an exit check fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeStop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TimeStop => write!(f, "time_stop"),
        }
    }
}

/// Open positions for one engine instance, keyed by symbol.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<String, Position>,
    /// Optional time stop, enforced on ticks only.
    max_hold_secs: Option<f64>,
}

impl PositionBook {
    pub fn new(max_hold_secs: Option<f64>) -> Self {
        Self {
            positions: HashMap::new(),
            max_hold_secs,
        }
    }

    /// Open a position. A second open on the same symbol is rejected.
    pub fn open(&mut self, position: Position) -> Result<(), EngineError> {
        if position.size <= Decimal::ZERO {
            return Err(EngineError::Invariant(format!(
                "position size must be positive, got {}",
                position.size
            )));
        }
        if self.positions.contains_key(&position.symbol) {
            return Err(EngineError::DuplicatePosition(position.symbol));
        }
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Update the mark price for a symbol's position, if open.
    pub fn mark_to_market(&mut self, symbol: &str, price: Decimal) -> Option<&Position> {
        let position = self.positions.get_mut(symbol)?;
        position.current_price = price;
        Some(position)
    }

    /// Check whether the position should exit at `price`. TP and SL
    /// compare the side-signed return against the stored distances; the
    /// time stop compares the hold time against the configured maximum.
    pub fn check_exit(&self, symbol: &str, price: Decimal, now: f64) -> Option<ExitReason> {
        let position = self.positions.get(symbol)?;
        let signed_return = position.signed_return(price);

        if signed_return >= position.take_profit_pct {
            return Some(ExitReason::TakeProfit);
        }
        if signed_return <= -position.stop_loss_pct {
            return Some(ExitReason::StopLoss);
        }
        if let Some(max_hold) = self.max_hold_secs {
            if now - position.opened_at >= max_hold {
                return Some(ExitReason::TimeStop);
            }
        }
        None
    }

    /// Close a position at `price`, removing it and returning the gross
    /// realized P&L (fees are the caller's concern).
    pub fn close(&mut self, symbol: &str, price: Decimal) -> Option<(Position, Decimal)> {
        let mut position = self.positions.remove(symbol)?;
        position.current_price = price;
        let realized = position.side.signum() * (price - position.entry_price) * position.size;
        Some((position, realized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long(symbol: &str, entry: Decimal) -> Position {
        Position {
            symbol: symbol.into(),
            side: PositionSide::Long,
            size: dec!(0.1),
            entry_price: entry,
            current_price: entry,
            opened_at: 1_700_000_000.0,
            take_profit_pct: dec!(0.01),
            stop_loss_pct: dec!(0.01),
        }
    }

    #[test]
    fn test_unrealized_pnl_long_and_short() {
        let mut pos = long("BTC/USDT", dec!(93500));
        pos.current_price = dec!(93600);
        assert_eq!(pos.unrealized_pnl(), dec!(10.0));

        pos.side = PositionSide::Short;
        assert_eq!(pos.unrealized_pnl(), dec!(-10.0));
    }

    #[test]
    fn test_at_most_one_position_per_symbol() {
        let mut book = PositionBook::new(None);
        book.open(long("BTC/USDT", dec!(93500))).unwrap();

        let err = book.open(long("BTC/USDT", dec!(94000))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicatePosition(_)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut book = PositionBook::new(None);
        let mut pos = long("BTC/USDT", dec!(93500));
        pos.size = Decimal::ZERO;
        assert!(matches!(
            book.open(pos),
            Err(EngineError::Invariant(_))
        ));
    }

    #[test]
    fn test_mark_to_market_updates_price() {
        let mut book = PositionBook::new(None);
        book.open(long("BTC/USDT", dec!(93500))).unwrap();
        book.mark_to_market("BTC/USDT", dec!(94000));
        assert_eq!(
            book.get("BTC/USDT").unwrap().current_price,
            dec!(94000)
        );
    }

    #[test]
    fn test_take_profit_exit() {
        let mut book = PositionBook::new(None);
        book.open(long("BTC/USDT", dec!(93500))).unwrap();

        // +1% on a long hits the 1% take profit.
        let exit = book.check_exit("BTC/USDT", dec!(94435), 1_700_000_001.0);
        assert_eq!(exit, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn test_stop_loss_exit() {
        let mut book = PositionBook::new(None);
        book.open(long("BTC/USDT", dec!(93500))).unwrap();

        let exit = book.check_exit("BTC/USDT", dec!(92565), 1_700_000_001.0);
        assert_eq!(exit, Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_short_exit_directions_invert() {
        let mut book = PositionBook::new(None);
        let mut pos = long("BTC/USDT", dec!(93500));
        pos.side = PositionSide::Short;
        book.open(pos).unwrap();

        // Price falling is profit for a short.
        assert_eq!(
            book.check_exit("BTC/USDT", dec!(92565), 0.0),
            Some(ExitReason::TakeProfit)
        );
        assert_eq!(
            book.check_exit("BTC/USDT", dec!(94435), 0.0),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_time_stop() {
        let mut book = PositionBook::new(Some(1800.0));
        book.open(long("BTC/USDT", dec!(93500))).unwrap();

        assert_eq!(book.check_exit("BTC/USDT", dec!(93500), 1_700_000_100.0), None);
        assert_eq!(
            book.check_exit("BTC/USDT", dec!(93500), 1_700_001_800.0),
            Some(ExitReason::TimeStop)
        );
    }

    #[test]
    fn test_close_removes_and_returns_gross_pnl() {
        let mut book = PositionBook::new(None);
        book.open(long("BTC/USDT", dec!(93500))).unwrap();

        let (position, realized) = book.close("BTC/USDT", dec!(94000)).unwrap();
        assert_eq!(position.symbol, "BTC/USDT");
        assert_eq!(realized, dec!(50.0));
        assert!(book.is_empty());
        assert!(book.close("BTC/USDT", dec!(94000)).is_none());
    }

    #[test]
    fn test_pnl_round_trip_is_mark_independent() {
        // Interim mark-to-market calls must not change the realized
        // number produced at close.
        let mut book = PositionBook::new(None);
        book.open(long("BTC/USDT", dec!(93500))).unwrap();

        book.mark_to_market("BTC/USDT", dec!(80000));
        book.mark_to_market("BTC/USDT", dec!(120000));

        let (_, realized) = book.close("BTC/USDT", dec!(95800)).unwrap();
        assert_eq!(realized, (dec!(95800) - dec!(93500)) * dec!(0.1));
    }
}
