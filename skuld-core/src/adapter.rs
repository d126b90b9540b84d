//! Exchange adapter boundary.
//!
//! The core never constructs an adapter; drivers inject one. Any async
//! machinery (websockets, HTTP) lives on the far side of the bounded
//! tick channel, which the engine drains on its own schedule.

use crate::core::OrderId;
use crate::data::Tick;
use crate::fees::{Exchange, FillEngine, FillResult, OrderRequest};
use crossbeam::channel::{bounded, Receiver, Sender};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Contract between the engine and the exchange side of the world.
pub trait ExchangeAdapter: Send {
    /// Establish connectivity. Called once before subscribing.
    fn connect(&mut self) -> anyhow::Result<()>;

    /// Subscribe to a symbol's tick stream. The returned channel is
    /// bounded; a slow consumer backpressures the producer.
    fn subscribe(&mut self, symbol: &str) -> anyhow::Result<Receiver<Tick>>;

    /// Place an order and return its fill.
    fn place_order(&mut self, order: &OrderRequest, reference_price: Decimal)
        -> anyhow::Result<FillResult>;

    /// Cancel a resting order.
    fn cancel(&mut self, order_id: OrderId) -> anyhow::Result<()>;

    /// Free balance of an asset.
    fn balance(&self, asset: &str) -> anyhow::Result<Decimal>;
}

/// Capacity of the per-symbol tick channel.
const TICK_CHANNEL_CAPACITY: usize = 1024;

/// In-process adapter that fills orders through the deterministic fee
/// model. Used by the live driver when no venue is wired up, and by
/// tests that need the adapter surface without a network.
pub struct PaperAdapter {
    fill_engine: FillEngine,
    balances: HashMap<String, Decimal>,
    producers: HashMap<String, Sender<Tick>>,
    connected: bool,
}

impl PaperAdapter {
    pub fn new(exchange: Exchange, quote_balance: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert("USDT".to_string(), quote_balance);
        Self {
            fill_engine: FillEngine::new(exchange),
            balances,
            producers: HashMap::new(),
            connected: false,
        }
    }

    /// Push a tick into a subscribed symbol's stream. Returns false when
    /// the channel is full (the engine is behind) or unsubscribed.
    pub fn push_tick(&self, tick: Tick) -> bool {
        self.producers
            .get(&tick.symbol)
            .map(|sender| sender.try_send(tick).is_ok())
            .unwrap_or(false)
    }
}

impl ExchangeAdapter for PaperAdapter {
    fn connect(&mut self) -> anyhow::Result<()> {
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, symbol: &str) -> anyhow::Result<Receiver<Tick>> {
        anyhow::ensure!(self.connected, "adapter not connected");
        let (sender, receiver) = bounded(TICK_CHANNEL_CAPACITY);
        self.producers.insert(symbol.to_string(), sender);
        Ok(receiver)
    }

    fn place_order(
        &mut self,
        order: &OrderRequest,
        reference_price: Decimal,
    ) -> anyhow::Result<FillResult> {
        anyhow::ensure!(self.connected, "adapter not connected");
        let fill = self
            .fill_engine
            .simulate_fill(order, reference_price, None, 0.0, 0.0)?;
        Ok(fill)
    }

    fn cancel(&mut self, _order_id: OrderId) -> anyhow::Result<()> {
        Ok(())
    }

    fn balance(&self, asset: &str) -> anyhow::Result<Decimal> {
        Ok(self.balances.get(asset).copied().unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use rust_decimal_macros::dec;

    fn tick(symbol: &str) -> Tick {
        Tick {
            symbol: symbol.into(),
            exchange_timestamp: 1.0,
            local_timestamp: 1.0,
            bid: dec!(93490),
            ask: dec!(93510),
            last: dec!(93500),
            volume: dec!(1),
            depth: None,
            integrity: None,
        }
    }

    #[test]
    fn test_subscribe_requires_connect() {
        let mut adapter = PaperAdapter::new(Exchange::Binance, dec!(10000));
        assert!(adapter.subscribe("BTC/USDT").is_err());
        adapter.connect().unwrap();
        assert!(adapter.subscribe("BTC/USDT").is_ok());
    }

    #[test]
    fn test_push_and_receive_ticks() {
        let mut adapter = PaperAdapter::new(Exchange::Binance, dec!(10000));
        adapter.connect().unwrap();
        let receiver = adapter.subscribe("BTC/USDT").unwrap();

        assert!(adapter.push_tick(tick("BTC/USDT")));
        // Unsubscribed symbol drops.
        assert!(!adapter.push_tick(tick("ETH/USDT")));

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.symbol, "BTC/USDT");
    }

    #[test]
    fn test_paper_fill_goes_through_fee_model() {
        let mut adapter = PaperAdapter::new(Exchange::Binance, dec!(10000));
        adapter.connect().unwrap();

        let order = OrderRequest::market(OrderId::new(1), "BTC/USDT", Side::Buy, dec!(0.1));
        let fill = adapter.place_order(&order, dec!(93500)).unwrap();
        assert!(!fill.is_maker);
        assert_eq!(fill.fill_price, dec!(93546.75));
    }

    #[test]
    fn test_balance_lookup() {
        let adapter = PaperAdapter::new(Exchange::Binance, dec!(10000));
        assert_eq!(adapter.balance("USDT").unwrap(), dec!(10000));
        assert_eq!(adapter.balance("BTC").unwrap(), Decimal::ZERO);
    }
}
