//! In-process pub/sub with per-topic metrics.
//!
//! Publish is synchronous: handlers run inline on the publisher's
//! thread, a handler error is caught, logged and counted but never
//! propagates. The bus also keeps a bounded ring of recent events for
//! observability; overflow drops the oldest and counts the drop.
//!
//! Subscriber lists are only mutated through `subscribe`, which callers
//! invoke at startup or during an explicit reconfigure.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

/// Closed topic set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    MarketData,
    Signal,
    Decision,
    RiskCheck,
    Order,
    Fill,
    Position,
    StateChange,
    Error,
}

impl Topic {
    pub const ALL: [Topic; 9] = [
        Topic::MarketData,
        Topic::Signal,
        Topic::Decision,
        Topic::RiskCheck,
        Topic::Order,
        Topic::Fill,
        Topic::Position,
        Topic::StateChange,
        Topic::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MarketData => "market_data",
            Topic::Signal => "signal",
            Topic::Decision => "decision",
            Topic::RiskCheck => "risk_check",
            Topic::Order => "order",
            Topic::Fill => "fill",
            Topic::Position => "position",
            Topic::StateChange => "state_change",
            Topic::Error => "error",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One published event. Payloads are the engine's data shapes serialized
/// as JSON, which is also what boundary consumers receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub event_id: String,
    pub timestamp: f64,
    pub payload: serde_json::Value,
}

type Handler = Box<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Per-topic counters. Latency is measured from publish entry to return,
/// so it includes handler time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopicMetrics {
    pub count: u64,
    pub total_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub error_count: u64,
}

impl TopicMetrics {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_latency_ms / self.count as f64
    }
}

/// Bus-wide snapshot for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusSummary {
    pub total_events: u64,
    pub total_errors: u64,
    pub queue_depth: usize,
    pub overflow_count: u64,
    pub by_topic: Vec<(Topic, TopicMetrics)>,
}

struct BusState {
    queue: VecDeque<Event>,
    queue_capacity: usize,
    overflow_count: u64,
    metrics: HashMap<Topic, TopicMetrics>,
    /// Event timestamps per topic for the sliding-window rate.
    window: HashMap<Topic, VecDeque<f64>>,
    window_sec: f64,
    total_events: u64,
    total_errors: u64,
}

/// Process-wide event bus.
pub struct EventBus {
    subscribers: RwLock<HashMap<Topic, Vec<Handler>>>,
    state: Mutex<BusState>,
}

impl EventBus {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
    pub const DEFAULT_WINDOW_SEC: f64 = 60.0;

    pub fn new(queue_capacity: usize, window_sec: f64) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            state: Mutex::new(BusState {
                queue: VecDeque::with_capacity(queue_capacity.min(4096)),
                queue_capacity: queue_capacity.max(1),
                overflow_count: 0,
                metrics: HashMap::new(),
                window: HashMap::new(),
                window_sec,
                total_events: 0,
                total_errors: 0,
            }),
        }
    }

    /// Register a handler for a topic.
    pub fn subscribe<F>(&self, topic: Topic, handler: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(topic)
            .or_default()
            .push(Box::new(handler));
        debug!(topic = %topic, "handler subscribed");
    }

    /// Publish an event. Handler failures are contained here.
    pub fn publish(&self, event: Event) {
        let started = Instant::now();
        let topic = event.topic;

        {
            let mut state = self.state.lock();
            if state.queue.len() == state.queue_capacity {
                state.queue.pop_front();
                state.overflow_count += 1;
            }
            state.queue.push_back(event.clone());

            let cutoff = event.timestamp - state.window_sec;
            let window = state.window.entry(topic).or_default();
            window.push_back(event.timestamp);
            while window.front().is_some_and(|&t| t < cutoff) {
                window.pop_front();
            }
            state.total_events += 1;
        }

        let mut errors = 0u64;
        {
            let subscribers = self.subscribers.read();
            if let Some(handlers) = subscribers.get(&topic) {
                for handler in handlers {
                    if let Err(e) = handler(&event) {
                        warn!(topic = %topic, error = %e, "event handler failed");
                        errors += 1;
                    }
                }
            }
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut state = self.state.lock();
        let metrics = state.metrics.entry(topic).or_default();
        if metrics.count == 0 {
            metrics.min_latency_ms = latency_ms;
        } else {
            metrics.min_latency_ms = metrics.min_latency_ms.min(latency_ms);
        }
        metrics.count += 1;
        metrics.total_latency_ms += latency_ms;
        metrics.max_latency_ms = metrics.max_latency_ms.max(latency_ms);
        metrics.error_count += errors;
        state.total_errors += errors;
    }

    pub fn metrics(&self, topic: Topic) -> TopicMetrics {
        self.state
            .lock()
            .metrics
            .get(&topic)
            .copied()
            .unwrap_or_default()
    }

    /// Events per second on `topic` inside the sliding window ending at
    /// `now` (event time, not wall time).
    pub fn rate(&self, topic: Topic, now: f64) -> f64 {
        let mut state = self.state.lock();
        let window_sec = state.window_sec;
        let cutoff = now - window_sec;
        let window = state.window.entry(topic).or_default();
        while window.front().is_some_and(|&t| t < cutoff) {
            window.pop_front();
        }
        window.len() as f64 / window_sec
    }

    pub fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn overflow_count(&self) -> u64 {
        self.state.lock().overflow_count
    }

    /// Drain up to `max` queued events, oldest first.
    pub fn drain(&self, max: usize) -> Vec<Event> {
        let mut state = self.state.lock();
        let n = max.min(state.queue.len());
        state.queue.drain(..n).collect()
    }

    pub fn summary(&self) -> BusSummary {
        let state = self.state.lock();
        let mut by_topic: Vec<_> = Topic::ALL
            .iter()
            .filter_map(|&t| state.metrics.get(&t).map(|m| (t, *m)))
            .collect();
        by_topic.retain(|(_, m)| m.count > 0);
        BusSummary {
            total_events: state.total_events,
            total_errors: state.total_errors,
            queue_depth: state.queue.len(),
            overflow_count: state.overflow_count,
            by_topic,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUEUE_CAPACITY, Self::DEFAULT_WINDOW_SEC)
    }
}
