//! Transaction cost analysis.
//!
//! Two-phase contract: `estimate` before the order goes out, `measure`
//! once the fill comes back. The difference between the two is the
//! surprise, and the surprise is what tells you whether your edge
//! survives its costs.
//!
//! The pre-trade side deliberately models slippage with its own
//! base-plus-impact curve rather than echoing the fill simulator: the
//! estimator prices expected conditions, the fill engine prices the
//! actual crossing, and the gap between them is exactly what TCA exists
//! to surface.

use crate::core::{OrderId, OrderType, Side};
use crate::fees::{FeeSchedule, OrderRequest};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Pre-trade cost estimate, stored until the fill arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreTradeEstimate {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub reference_price: Decimal,
    pub estimated_fill_price: Decimal,
    pub estimated_slippage_bps: Decimal,
    pub estimated_fee: Decimal,
    pub estimated_total_cost: Decimal,
    pub timestamp: f64,
}

/// Post-trade realization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTradeMeasurement {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub reference_price: Decimal,
    pub fill_price: Decimal,
    pub realized_slippage_bps: Decimal,
    pub realized_fee: Decimal,
    pub realized_total_cost: Decimal,
    pub execution_ms: f64,
    pub timestamp: f64,
}

/// Estimate vs realization for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcaReport {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub estimated_slippage_bps: Decimal,
    pub estimated_fee: Decimal,
    pub estimated_total_cost: Decimal,
    pub realized_slippage_bps: Decimal,
    pub realized_fee: Decimal,
    pub realized_total_cost: Decimal,
    /// realized minus estimated; positive means worse than priced.
    pub slippage_surprise_bps: Decimal,
    pub fee_surprise: Decimal,
    pub cost_surprise: Decimal,
    pub execution_ms: f64,
    /// 1.0 when realized cost came in at or under the estimate.
    pub execution_quality: f64,
}

/// Rolling summary over the retained report history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TcaSummary {
    pub trades: u64,
    pub avg_execution_quality: f64,
    pub avg_cost_surprise: Decimal,
    pub total_estimated_cost: Decimal,
    pub total_realized_cost: Decimal,
}

/// Transaction cost analyzer with a bounded report history.
#[derive(Debug)]
pub struct TcaAnalyzer {
    schedule: FeeSchedule,
    base_slippage_bps: Decimal,
    /// Additional expected slippage per 10k of notional.
    impact_bps_per_10k: Decimal,
    pending: HashMap<OrderId, PreTradeEstimate>,
    reports: VecDeque<TcaReport>,
    max_reports: usize,
    trades: u64,
    total_estimated_cost: Decimal,
    total_realized_cost: Decimal,
}

impl TcaAnalyzer {
    pub const DEFAULT_MAX_REPORTS: usize = 10_000;

    pub fn new(schedule: FeeSchedule) -> Self {
        Self {
            schedule,
            base_slippage_bps: Decimal::ONE,
            impact_bps_per_10k: Decimal::ONE,
            pending: HashMap::new(),
            reports: VecDeque::new(),
            max_reports: Self::DEFAULT_MAX_REPORTS,
            trades: 0,
            total_estimated_cost: Decimal::ZERO,
            total_realized_cost: Decimal::ZERO,
        }
    }

    pub fn with_max_reports(mut self, max_reports: usize) -> Self {
        self.max_reports = max_reports.max(1);
        self
    }

    /// Record the pre-trade estimate for an order.
    pub fn estimate(
        &mut self,
        order: &OrderRequest,
        reference_price: Decimal,
        timestamp: f64,
    ) -> PreTradeEstimate {
        let (estimated_slippage_bps, estimated_fill_price, fee_rate) = match order.order_type {
            OrderType::Market => {
                let slip = self.expected_market_slippage_bps(order.size, reference_price);
                let fill = apply_slippage(reference_price, order.side, slip);
                (slip, fill, self.schedule.taker_rate)
            }
            OrderType::Limit => {
                let fill = order.price.unwrap_or(reference_price);
                let slip = signed_slippage_bps(reference_price, fill, order.side);
                (slip, fill, self.schedule.maker_rate)
            }
        };

        let estimated_fee =
            (estimated_fill_price * order.size * fee_rate).max(self.schedule.min_fee);
        let slip_cash = (estimated_fill_price - reference_price).abs() * order.size;
        let estimated_total_cost = match order.side {
            Side::Buy => slip_cash + estimated_fee,
            Side::Sell => -slip_cash + estimated_fee,
        };

        let estimate = PreTradeEstimate {
            order_id: order.client_id,
            symbol: order.symbol.clone(),
            side: order.side,
            size: order.size,
            reference_price,
            estimated_fill_price,
            estimated_slippage_bps,
            estimated_fee,
            estimated_total_cost,
            timestamp,
        };

        debug!(order_id = %order.client_id, cost = %estimated_total_cost, "pre-trade estimate");
        self.total_estimated_cost += estimated_total_cost;
        self.pending.insert(order.client_id, estimate.clone());
        estimate
    }

    /// Reconcile a fill against its stored estimate. Returns `None` (and
    /// warns) when no estimate was recorded for the order.
    pub fn measure(
        &mut self,
        order_id: OrderId,
        fill_price: Decimal,
        size: Decimal,
        fee: Decimal,
        execution_ms: f64,
        timestamp: f64,
    ) -> Option<(PostTradeMeasurement, TcaReport)> {
        let Some(estimate) = self.pending.remove(&order_id) else {
            warn!(%order_id, "no pre-trade estimate for order");
            return None;
        };

        let realized_slippage_bps =
            signed_slippage_bps(estimate.reference_price, fill_price, estimate.side);
        let slip_cash = (fill_price - estimate.reference_price).abs() * size;
        let realized_total_cost = match estimate.side {
            Side::Buy => slip_cash + fee,
            Side::Sell => -slip_cash + fee,
        };

        let measurement = PostTradeMeasurement {
            order_id,
            symbol: estimate.symbol.clone(),
            side: estimate.side,
            size,
            reference_price: estimate.reference_price,
            fill_price,
            realized_slippage_bps,
            realized_fee: fee,
            realized_total_cost,
            execution_ms,
            timestamp,
        };

        let report = self.build_report(&estimate, &measurement);

        self.trades += 1;
        self.total_realized_cost += realized_total_cost;
        if self.reports.len() == self.max_reports {
            self.reports.pop_front();
        }
        self.reports.push_back(report.clone());

        Some((measurement, report))
    }

    fn build_report(
        &self,
        estimate: &PreTradeEstimate,
        measurement: &PostTradeMeasurement,
    ) -> TcaReport {
        let cost_surprise = measurement.realized_total_cost - estimate.estimated_total_cost;

        let execution_quality = if cost_surprise <= Decimal::ZERO {
            1.0
        } else if estimate.estimated_total_cost.is_zero() {
            0.0
        } else {
            let ratio = (cost_surprise / estimate.estimated_total_cost.abs())
                .abs()
                .to_f64()
                .unwrap_or(1.0);
            (1.0 - ratio).max(0.0)
        };

        TcaReport {
            order_id: estimate.order_id,
            symbol: estimate.symbol.clone(),
            side: estimate.side,
            estimated_slippage_bps: estimate.estimated_slippage_bps,
            estimated_fee: estimate.estimated_fee,
            estimated_total_cost: estimate.estimated_total_cost,
            realized_slippage_bps: measurement.realized_slippage_bps,
            realized_fee: measurement.realized_fee,
            realized_total_cost: measurement.realized_total_cost,
            slippage_surprise_bps: measurement.realized_slippage_bps
                - estimate.estimated_slippage_bps,
            fee_surprise: measurement.realized_fee - estimate.estimated_fee,
            cost_surprise,
            execution_ms: measurement.execution_ms,
            execution_quality,
        }
    }

    /// Expected market-order slippage: base plus notional impact.
    fn expected_market_slippage_bps(&self, size: Decimal, reference_price: Decimal) -> Decimal {
        let notional = size * reference_price;
        self.base_slippage_bps + notional / Decimal::from(10_000) * self.impact_bps_per_10k
    }

    pub fn reports(&self) -> impl Iterator<Item = &TcaReport> {
        self.reports.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn summary(&self) -> TcaSummary {
        if self.reports.is_empty() {
            return TcaSummary::default();
        }

        let n = self.reports.len();
        let quality_sum: f64 = self.reports.iter().map(|r| r.execution_quality).sum();
        let surprise_sum: Decimal = self.reports.iter().map(|r| r.cost_surprise).sum();

        TcaSummary {
            trades: self.trades,
            avg_execution_quality: quality_sum / n as f64,
            avg_cost_surprise: surprise_sum / Decimal::from(n as u64),
            total_estimated_cost: self.total_estimated_cost,
            total_realized_cost: self.total_realized_cost,
        }
    }
}

fn apply_slippage(reference: Decimal, side: Side, slippage_bps: Decimal) -> Decimal {
    let fraction = slippage_bps / Decimal::from(10_000);
    match side {
        Side::Buy => reference * (Decimal::ONE + fraction),
        Side::Sell => reference * (Decimal::ONE - fraction),
    }
}

/// Slippage of `fill` vs `reference`, positive = adverse for `side`.
fn signed_slippage_bps(reference: Decimal, fill: Decimal, side: Side) -> Decimal {
    if reference.is_zero() {
        return Decimal::ZERO;
    }
    match side {
        Side::Buy => (fill - reference) / reference * Decimal::from(10_000),
        Side::Sell => (reference - fill) / reference * Decimal::from(10_000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrderId;
    use crate::fees::Exchange;
    use rust_decimal_macros::dec;

    fn analyzer() -> TcaAnalyzer {
        TcaAnalyzer::new(Exchange::Binance.fees())
    }

    #[test]
    fn test_market_estimate_uses_base_plus_impact() {
        let mut tca = analyzer();
        let order = OrderRequest::market(OrderId::new(1), "BTC/USDT", Side::Buy, dec!(0.1));
        let estimate = tca.estimate(&order, dec!(93500), 0.0);

        // base 1 bps + 0.1 * 93500 / 10000 = 1.935 bps
        assert_eq!(estimate.estimated_slippage_bps, dec!(1.935));
        assert!(estimate.estimated_fill_price > dec!(93500));
        assert!(estimate.estimated_total_cost > Decimal::ZERO);
    }

    #[test]
    fn test_limit_estimate_at_reference_has_no_slippage() {
        let mut tca = analyzer();
        let order = OrderRequest::limit(
            OrderId::new(2),
            "BTC/USDT",
            Side::Sell,
            dec!(93600),
            dec!(0.1),
        );
        let estimate = tca.estimate(&order, dec!(93600), 0.0);

        assert_eq!(estimate.estimated_slippage_bps, Decimal::ZERO);
        assert_eq!(estimate.estimated_fill_price, dec!(93600));
        // Just the maker fee.
        assert_eq!(estimate.estimated_total_cost, dec!(9.36));
    }

    #[test]
    fn test_measure_without_estimate_returns_none() {
        let mut tca = analyzer();
        assert!(tca
            .measure(OrderId::new(99), dec!(93500), dec!(0.1), dec!(9.35), 0.0, 0.0)
            .is_none());
    }

    #[test]
    fn test_worse_fill_is_positive_surprise() {
        let mut tca = analyzer();
        let order = OrderRequest::market(OrderId::new(3), "BTC/USDT", Side::Buy, dec!(0.1));
        tca.estimate(&order, dec!(93500), 0.0);

        // Filled 5 bps over reference; estimate priced ~1.9 bps.
        let (_, report) = tca
            .measure(
                OrderId::new(3),
                dec!(93546.75),
                dec!(0.1),
                dec!(9.354675),
                50.0,
                1.0,
            )
            .unwrap();

        assert!(report.cost_surprise > Decimal::ZERO);
        assert!(report.slippage_surprise_bps > Decimal::ZERO);
        assert!(report.execution_quality < 1.0);
    }

    #[test]
    fn test_fill_at_estimate_has_quality_one() {
        let mut tca = analyzer();
        let order = OrderRequest::limit(
            OrderId::new(4),
            "BTC/USDT",
            Side::Buy,
            dec!(93500),
            dec!(0.1),
        );
        let estimate = tca.estimate(&order, dec!(93500), 0.0);

        let (_, report) = tca
            .measure(
                OrderId::new(4),
                estimate.estimated_fill_price,
                dec!(0.1),
                estimate.estimated_fee,
                0.0,
                1.0,
            )
            .unwrap();

        assert_eq!(report.cost_surprise, Decimal::ZERO);
        assert_eq!(report.execution_quality, 1.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tca = analyzer().with_max_reports(3);
        for i in 0..10u64 {
            let order = OrderRequest::market(OrderId::new(i), "BTC/USDT", Side::Buy, dec!(0.01));
            tca.estimate(&order, dec!(93500), 0.0);
            tca.measure(OrderId::new(i), dec!(93505), dec!(0.01), dec!(0.94), 0.0, 0.0);
        }
        assert_eq!(tca.reports().count(), 3);
        assert_eq!(tca.summary().trades, 10);
    }

    #[test]
    fn test_summary_averages() {
        let mut tca = analyzer();
        let order = OrderRequest::limit(
            OrderId::new(5),
            "BTC/USDT",
            Side::Buy,
            dec!(100),
            dec!(1),
        );
        let estimate = tca.estimate(&order, dec!(100), 0.0);
        tca.measure(
            OrderId::new(5),
            estimate.estimated_fill_price,
            dec!(1),
            estimate.estimated_fee,
            0.0,
            0.0,
        );

        let summary = tca.summary();
        assert_eq!(summary.trades, 1);
        assert_eq!(summary.avg_execution_quality, 1.0);
        assert_eq!(summary.avg_cost_surprise, Decimal::ZERO);
        assert_eq!(summary.total_estimated_cost, summary.total_realized_cost);
    }
}
