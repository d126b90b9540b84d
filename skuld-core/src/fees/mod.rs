//! Deterministic fee and fill model.
//!
//! `simulate_fill` is a pure function of its inputs: identical orders and
//! books produce bit-identical fills. There is no RNG anywhere in this
//! module; slippage is closed-form, fees come from a per-exchange table.
//!
//! Maker/taker classification follows order type and crossing logic:
//! market orders always take, limit orders take only when they would
//! cross a supplied top-of-book and otherwise rest as maker.

use crate::core::{OrderId, OrderType, Side};
use crate::data::TopOfBook;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Kraken,
    Okx,
}

impl Exchange {
    pub const ALL: [Exchange; 3] = [Exchange::Binance, Exchange::Kraken, Exchange::Okx];

    /// VIP-0 fee schedule for the venue.
    pub fn fees(self) -> FeeSchedule {
        match self {
            // 10 / 10 bps
            Exchange::Binance => FeeSchedule {
                maker_rate: Decimal::new(1, 3),
                taker_rate: Decimal::new(1, 3),
                min_fee: Decimal::ZERO,
            },
            // 16 / 26 bps
            Exchange::Kraken => FeeSchedule {
                maker_rate: Decimal::new(16, 4),
                taker_rate: Decimal::new(26, 4),
                min_fee: Decimal::ZERO,
            },
            // 8 / 10 bps
            Exchange::Okx => FeeSchedule {
                maker_rate: Decimal::new(8, 4),
                taker_rate: Decimal::new(1, 3),
                min_fee: Decimal::ZERO,
            },
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Binance => write!(f, "binance"),
            Exchange::Kraken => write!(f, "kraken"),
            Exchange::Okx => write!(f, "okx"),
        }
    }
}

impl FromStr for Exchange {
    type Err = crate::core::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "kraken" => Ok(Exchange::Kraken),
            "okx" => Ok(Exchange::Okx),
            other => Err(crate::core::ConfigError::UnknownExchange(other.to_string())),
        }
    }
}

/// Per-exchange fee rates. Rates are fractions (0.001 = 10 bps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
    pub min_fee: Decimal,
}

/// An order handed to the fill model or an exchange adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    pub size: Decimal,
}

impl OrderRequest {
    pub fn market(client_id: OrderId, symbol: impl Into<String>, side: Side, size: Decimal) -> Self {
        Self {
            client_id,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            price: None,
            size,
        }
    }

    pub fn limit(
        client_id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            client_id,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
        }
    }
}

/// A simulated (or echoed live) fill with its full cost breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillResult {
    pub client_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub order_price: Decimal,
    pub fill_price: Decimal,
    pub size: Decimal,
    pub is_maker: bool,
    /// Signed, oriented so positive = adverse.
    pub slippage_bps: Decimal,
    pub slippage_cash: Decimal,
    pub fee_rate: Decimal,
    pub fee_cash: Decimal,
    pub total_cost_cash: Decimal,
    pub execution_ms: f64,
    pub timestamp: f64,
}

impl fmt::Display for FillResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} ({}, slippage={:.1}bps, fee={})",
            self.symbol,
            self.side,
            self.size,
            self.fill_price,
            if self.is_maker { "MAKER" } else { "TAKER" },
            self.slippage_bps,
            self.fee_cash,
        )
    }
}

/// Rejections from the fill model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FillError {
    #[error("order size must be positive, got {0}")]
    NonPositiveSize(Decimal),

    #[error("limit order has no price")]
    MissingLimitPrice,

    #[error("reference price must be positive, got {0}")]
    NonPositiveReference(Decimal),
}

/// Deterministic fill simulator for one exchange.
#[derive(Debug, Clone)]
pub struct FillEngine {
    exchange: Exchange,
    schedule: FeeSchedule,
    /// Spread in bps crossed by a market order when no book is supplied.
    crossing_spread_bps: Decimal,
}

impl FillEngine {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            schedule: exchange.fees(),
            crossing_spread_bps: Decimal::from(5),
        }
    }

    pub fn with_crossing_spread_bps(mut self, bps: Decimal) -> Self {
        self.crossing_spread_bps = bps;
        self
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn schedule(&self) -> FeeSchedule {
        self.schedule
    }

    /// Simulate an immediate full fill.
    ///
    /// `reference` is the decision-time reference price (mid or last);
    /// it doubles as the market order's order price. `timestamp` and
    /// `execution_ms` are pass-through inputs so the result is a pure
    /// function of its arguments.
    pub fn simulate_fill(
        &self,
        order: &OrderRequest,
        reference: Decimal,
        book: Option<&TopOfBook>,
        execution_ms: f64,
        timestamp: f64,
    ) -> Result<FillResult, FillError> {
        if order.size <= Decimal::ZERO {
            return Err(FillError::NonPositiveSize(order.size));
        }
        if reference <= Decimal::ZERO {
            return Err(FillError::NonPositiveReference(reference));
        }

        let (is_maker, order_price, fill_price) = self.classify(order, reference, book)?;

        // Slippage: signed deviation of fill from the order price,
        // oriented so positive is adverse for the trader.
        let slippage_bps = match order.side {
            Side::Buy => (fill_price - order_price) / order_price * Decimal::from(10_000),
            Side::Sell => (order_price - fill_price) / order_price * Decimal::from(10_000),
        };
        let slippage_cash = (fill_price - order_price).abs() * order.size;

        let fee_rate = if is_maker {
            self.schedule.maker_rate
        } else {
            self.schedule.taker_rate
        };
        let fee_cash = (fill_price * order.size * fee_rate).max(self.schedule.min_fee);

        // Buys pay slippage on top of fees; for sells adverse slippage
        // shows up as reduced proceeds.
        let total_cost_cash = match order.side {
            Side::Buy => slippage_cash + fee_cash,
            Side::Sell => -slippage_cash + fee_cash,
        };

        Ok(FillResult {
            client_id: order.client_id,
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            order_price,
            fill_price,
            size: order.size,
            is_maker,
            slippage_bps,
            slippage_cash,
            fee_rate,
            fee_cash,
            total_cost_cash,
            execution_ms,
            timestamp,
        })
    }

    /// Decide maker/taker and the fill price.
    fn classify(
        &self,
        order: &OrderRequest,
        reference: Decimal,
        book: Option<&TopOfBook>,
    ) -> Result<(bool, Decimal, Decimal), FillError> {
        match order.order_type {
            OrderType::Market => {
                let fill = match (book, order.side) {
                    (Some(book), Side::Buy) => book.ask,
                    (Some(book), Side::Sell) => book.bid,
                    (None, side) => {
                        let cross = self.crossing_spread_bps / Decimal::from(10_000);
                        match side {
                            Side::Buy => reference * (Decimal::ONE + cross),
                            Side::Sell => reference * (Decimal::ONE - cross),
                        }
                    }
                };
                Ok((false, reference, fill))
            }
            OrderType::Limit => {
                let limit = order.price.ok_or(FillError::MissingLimitPrice)?;
                // A limit that crosses the book removes liquidity and
                // fills at the crossing side.
                if let Some(book) = book {
                    let crosses = match order.side {
                        Side::Buy => limit >= book.ask,
                        Side::Sell => limit <= book.bid,
                    };
                    if crosses {
                        let fill = match order.side {
                            Side::Buy => book.ask,
                            Side::Sell => book.bid,
                        };
                        return Ok((false, limit, fill));
                    }
                }
                Ok((true, limit, limit))
            }
        }
    }

    /// Cost comparison of one order across all supported venues.
    pub fn compare_exchanges(
        order: &OrderRequest,
        reference: Decimal,
        book: Option<&TopOfBook>,
    ) -> Vec<(Exchange, FillResult)> {
        Exchange::ALL
            .iter()
            .filter_map(|&exchange| {
                FillEngine::new(exchange)
                    .simulate_fill(order, reference, book, 0.0, 0.0)
                    .ok()
                    .map(|fill| (exchange, fill))
            })
            .collect()
    }
}
