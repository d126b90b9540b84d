//! Typed errors for the engine core.
//!
//! Config and data errors map onto the driver exit codes (2 and 3);
//! engine errors are the invariant failures that stop the pipeline.

use thiserror::Error;

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    #[error("unknown exchange `{0}` (expected binance, kraken or okx)")]
    UnknownExchange(String),
}

/// Market-data ingest failures.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("io error reading market data: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed market data: {0}")]
    Malformed(#[from] csv::Error),

    #[error("row {row}: {message}")]
    BadRow { row: usize, message: String },

    #[error("data file contained no usable rows")]
    Empty,
}

/// Write-ahead log failures.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wal serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Internal engine failures. These are fatal: the pipeline logs them and
/// transitions to Stopped rather than continuing on corrupt state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("position already open for {0}")]
    DuplicatePosition(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("order rejected by fill model: {0}")]
    Fill(#[from] crate::fees::FillError),

    #[error("wal append failed: {0}")]
    Wal(#[from] WalError),

    #[error("exchange adapter failure: {0}")]
    Adapter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            field: "initial_capital",
            message: "must be positive".into(),
        };
        assert!(err.to_string().contains("initial_capital"));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_unknown_exchange_display() {
        let err = ConfigError::UnknownExchange("bitmex".into());
        assert!(err.to_string().contains("bitmex"));
    }

    #[test]
    fn test_engine_error_from_wal() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: EngineError = WalError::from(io).into();
        assert!(matches!(err, EngineError::Wal(_)));
    }
}
