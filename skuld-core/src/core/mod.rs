//! Core types shared by every stage of the pipeline.

pub mod errors;
pub mod reason;
pub mod types;

pub use errors::{ConfigError, DataError, EngineError, WalError};
pub use reason::{CodeStats, DecisionOutcome, ReasonCategory, ReasonCode, ReasonCodeTracker};
pub use types::{
    Clock, FixedClock, OrderId, OrderIdSequence, OrderType, PositionSide, Side, SystemClock,
};
