//! Market data: tick model, Layer-0 sanitization, backtest ingest.

pub mod csv;
pub mod sanitizer;
pub mod types;

pub use csv::{CsvTickReader, OhlcvRow};
pub use sanitizer::{GateAction, Sanitizer, SanitizerConfig, SanitizerStats, Verdict};
pub use types::{integrity_tag, Tick, TopOfBook};
