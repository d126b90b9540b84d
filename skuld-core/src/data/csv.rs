//! CSV market-data reader for backtests.
//!
//! Input format: `timestamp,open,high,low,close,volume` with a header
//! row. Bid/ask are synthesized around the close with a configurable
//! spread and rounded to the symbol tick size; the resulting ticks carry
//! top-of-book depth so simulated fills cross a real quote.

use crate::core::DataError;
use crate::data::{Tick, TopOfBook};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// One OHLCV row as it appears in the file. Prices deserialize straight
/// into `Decimal` from their string form.
#[derive(Debug, Clone, Deserialize)]
pub struct OhlcvRow {
    pub timestamp: f64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Reader configuration.
#[derive(Debug, Clone)]
pub struct CsvTickReader {
    symbol: String,
    /// Full synthetic spread in basis points, split evenly around close.
    synth_spread_bps: Decimal,
    /// Round synthesized quotes to this tick size when set.
    tick_size: Option<Decimal>,
}

impl CsvTickReader {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            synth_spread_bps: Decimal::TWO,
            tick_size: Some(Decimal::new(1, 2)),
        }
    }

    pub fn with_synth_spread_bps(mut self, bps: Decimal) -> Self {
        self.synth_spread_bps = bps;
        self
    }

    pub fn with_tick_size(mut self, tick_size: Option<Decimal>) -> Self {
        self.tick_size = tick_size;
        self
    }

    /// Read the whole file into ticks, capped at `max_ticks` when given.
    /// Rows that fail basic sanity (non-positive close) are skipped with
    /// a warning rather than aborting the run.
    pub fn read(&self, path: &Path, max_ticks: Option<usize>) -> Result<Vec<Tick>, DataError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut ticks = Vec::new();

        for (idx, record) in reader.deserialize::<OhlcvRow>().enumerate() {
            if let Some(cap) = max_ticks {
                if ticks.len() >= cap {
                    break;
                }
            }

            let row = record.map_err(|e| DataError::BadRow {
                row: idx + 1,
                message: e.to_string(),
            })?;

            if row.close <= Decimal::ZERO {
                warn!(row = idx + 1, close = %row.close, "skipping non-positive close");
                continue;
            }

            ticks.push(self.tick_from_row(&row));
        }

        if ticks.is_empty() {
            return Err(DataError::Empty);
        }

        info!(
            path = %path.display(),
            ticks = ticks.len(),
            symbol = %self.symbol,
            "loaded backtest data"
        );
        Ok(ticks)
    }

    fn tick_from_row(&self, row: &OhlcvRow) -> Tick {
        let half = self.synth_spread_bps / Decimal::TWO / Decimal::from(10_000);
        let bid = self.round_to_tick(row.close * (Decimal::ONE - half));
        let ask = self.round_to_tick(row.close * (Decimal::ONE + half));

        Tick {
            symbol: self.symbol.clone(),
            exchange_timestamp: row.timestamp,
            local_timestamp: row.timestamp,
            bid,
            ask,
            last: row.close,
            volume: row.volume,
            depth: Some(TopOfBook { bid, ask }),
            integrity: None,
        }
    }

    fn round_to_tick(&self, price: Decimal) -> Decimal {
        match self.tick_size {
            Some(tick) if !tick.is_zero() => (price / tick).round() * tick,
            _ => price,
        }
    }
}
