//! Skuld - deterministic medium-frequency trading engine core.
//!
//! A tick enters at the Layer-0 sanitizer; if accepted it drives the
//! open position's TP/SL management, then strategy evaluation; a
//! selected signal passes the dynamic risk budget guard, is journaled to
//! the write-ahead log, filled through the deterministic fee model,
//! applied to the position book and republished as metrics on the event
//! bus. Everything is deterministic given its inputs: no RNG, no
//! wall-clock reads outside the staleness gate, closed-form fee and
//! slippage math.
//!
//! ## Modules
//! - `core`: ids, sides, reason codes, typed errors, clock
//! - `data`: tick model, L0 sanitizer, CSV backtest ingest
//! - `fees`: deterministic fee & fill model
//! - `tca`: pre-trade estimate vs post-trade realization
//! - `risk`: dynamic risk budget guard
//! - `position`: per-symbol position book with TP/SL tracking
//! - `wal`: write-ahead decision log and crash recovery
//! - `bus`: in-process pub/sub with per-topic metrics
//! - `strategy`: strategy contract and multi-strategy selection
//! - `engine`: the per-symbol tick pipeline and state machine
//! - `adapter`: exchange boundary contract (injected, never imported)

pub mod adapter;
pub mod bus;
pub mod core;
pub mod data;
pub mod engine;
pub mod fees;
pub mod position;
pub mod risk;
pub mod strategy;
pub mod tca;
pub mod wal;

pub use crate::core::{Clock, OrderId, OrderType, PositionSide, ReasonCode, Side, SystemClock};
pub use crate::data::{Tick, TopOfBook};
pub use crate::engine::{Engine, EngineConfig, EngineState, TickOutcome};
pub use crate::fees::{Exchange, FillResult, OrderRequest};
pub use crate::strategy::{Signal, Strategy};

/// Prelude for drivers and strategy crates.
pub mod prelude {
    pub use crate::adapter::ExchangeAdapter;
    pub use crate::bus::{Event, EventBus, Topic};
    pub use crate::core::{Clock, OrderId, ReasonCode, Side, SystemClock};
    pub use crate::data::{CsvTickReader, Sanitizer, Tick, TopOfBook};
    pub use crate::engine::{Engine, EngineConfig, EngineState, EngineStats, TickOutcome};
    pub use crate::fees::{Exchange, FillEngine, FillResult, OrderRequest};
    pub use crate::position::{Position, PositionBook};
    pub use crate::risk::{DrbGuard, RiskAction, RiskLimits};
    pub use crate::strategy::{Signal, SignalManager, Strategy};
    pub use crate::tca::TcaAnalyzer;
    pub use crate::wal::{RecoveredState, WalEntry, WalLogger};
}
