//! Market tick representation.
//!
//! Prices and sizes are `Decimal` end to end; anything coming off a CSV
//! or JSON boundary is parsed from its string form, never routed through
//! a binary float.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Best bid/ask snapshot attached to a tick when depth is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid: Decimal,
    pub ask: Decimal,
}

/// One market-data update.
///
/// Timestamps are seconds since the epoch; `exchange_timestamp` is the
/// venue's stamp, `local_timestamp` the receipt time. In backtests both
/// come from the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub exchange_timestamp: f64,
    pub local_timestamp: f64,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<TopOfBook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl Tick {
    /// Arithmetic mid of best bid and ask.
    #[inline]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Quoted spread in basis points of mid.
    #[inline]
    pub fn spread_bps(&self) -> Decimal {
        let mid = self.mid();
        if mid.is_zero() {
            return Decimal::ZERO;
        }
        (self.ask - self.bid) / mid * Decimal::from(10_000)
    }

    /// Feed latency in milliseconds (receipt minus venue stamp).
    #[inline]
    pub fn latency_ms(&self) -> f64 {
        (self.local_timestamp - self.exchange_timestamp) * 1000.0
    }
}

/// Deterministic integrity tag over the fields a corrupted feed would
/// mangle. Producers attach it, the sanitizer recomputes and compares.
pub fn integrity_tag(symbol: &str, bid: Decimal, ask: Decimal, local_timestamp: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbol.as_bytes());
    hasher.update(bid.to_string().as_bytes());
    hasher.update(ask.to_string().as_bytes());
    hasher.update(local_timestamp.to_bits().to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

impl Tick {
    /// Tag this tick would carry if produced by a well-behaved feed.
    pub fn expected_integrity_tag(&self) -> String {
        integrity_tag(&self.symbol, self.bid, self.ask, self.local_timestamp)
    }
}
