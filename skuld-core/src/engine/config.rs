//! Engine configuration.

use crate::core::ConfigError;
use crate::data::SanitizerConfig;
use crate::fees::Exchange;
use crate::risk::RiskLimits;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything one engine instance needs, serializable so drivers can
/// load it from a file. Immutable after `Engine::new` except through the
/// engine's reconfigure path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbol this engine trades.
    pub symbol: String,

    /// Starting cash.
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,

    /// Venue, selects the fee table.
    #[serde(default = "default_exchange")]
    pub exchange: Exchange,

    // Sanitizer limits. `None` disables a check (backtests).
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: Option<f64>,
    #[serde(default = "default_max_data_age_sec")]
    pub max_data_age_sec: Option<f64>,
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: Decimal,

    // Risk limits, percentages of initial capital.
    #[serde(default = "default_max_position_loss_pct")]
    pub max_position_loss_pct: Decimal,
    #[serde(default = "default_max_total_loss_pct")]
    pub max_total_loss_pct: Decimal,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    #[serde(default = "default_max_concentration")]
    pub max_concentration: Decimal,
    #[serde(default = "default_warn_threshold_pct")]
    pub warn_threshold_pct: Decimal,

    /// WAL location and rotation threshold.
    #[serde(default = "default_wal_log_path")]
    pub wal_log_path: PathBuf,
    #[serde(default = "default_wal_max_file_size_mb")]
    pub wal_max_file_size_mb: u64,

    /// Route fills through the simulator (true) or the injected
    /// exchange adapter (false).
    #[serde(default = "default_true")]
    pub paper_trading: bool,

    /// Optional time stop for open positions, seconds.
    #[serde(default)]
    pub max_hold_secs: Option<f64>,

    /// Event-bus ring capacity.
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,

    /// Spread crossed by market fills when no book is available, bps.
    #[serde(default = "default_crossing_spread_bps")]
    pub crossing_spread_bps: Decimal,
}

impl EngineConfig {
    /// Sensible live-mode defaults for a symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            initial_capital: default_initial_capital(),
            exchange: default_exchange(),
            max_latency_ms: default_max_latency_ms(),
            max_data_age_sec: default_max_data_age_sec(),
            max_spread_bps: default_max_spread_bps(),
            max_position_loss_pct: default_max_position_loss_pct(),
            max_total_loss_pct: default_max_total_loss_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_concentration: default_max_concentration(),
            warn_threshold_pct: default_warn_threshold_pct(),
            wal_log_path: default_wal_log_path(),
            wal_max_file_size_mb: default_wal_max_file_size_mb(),
            paper_trading: true,
            max_hold_secs: None,
            event_queue_size: default_event_queue_size(),
            crossing_spread_bps: default_crossing_spread_bps(),
        }
    }

    /// Backtest preset: clock is simulated, so latency and staleness
    /// checks are off.
    pub fn backtest(symbol: impl Into<String>, wal_log_path: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(symbol);
        config.max_latency_ms = None;
        config.max_data_age_sec = None;
        config.wal_log_path = wal_log_path.into();
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(ConfigError::Invalid {
                field: "symbol",
                message: "must not be empty".into(),
            });
        }
        if self.max_spread_bps <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "max_spread_bps",
                message: format!("must be positive, got {}", self.max_spread_bps),
            });
        }
        if self.crossing_spread_bps < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "crossing_spread_bps",
                message: format!("must be non-negative, got {}", self.crossing_spread_bps),
            });
        }
        if self.event_queue_size == 0 {
            return Err(ConfigError::Invalid {
                field: "event_queue_size",
                message: "must be positive".into(),
            });
        }
        self.risk_limits().validate()
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            initial_capital: self.initial_capital,
            max_position_loss_pct: self.max_position_loss_pct,
            max_total_loss_pct: self.max_total_loss_pct,
            max_drawdown_pct: self.max_drawdown_pct,
            max_concentration: self.max_concentration,
            warn_threshold_pct: self.warn_threshold_pct,
        }
    }

    pub fn sanitizer_config(&self) -> SanitizerConfig {
        SanitizerConfig {
            max_latency_ms: self.max_latency_ms,
            max_spread_bps: self.max_spread_bps,
            max_data_age_sec: self.max_data_age_sec,
        }
    }
}

fn default_initial_capital() -> Decimal {
    Decimal::from(10_000)
}

fn default_exchange() -> Exchange {
    Exchange::Binance
}

fn default_max_latency_ms() -> Option<f64> {
    Some(100.0)
}

fn default_max_data_age_sec() -> Option<f64> {
    Some(2.0)
}

fn default_max_spread_bps() -> Decimal {
    Decimal::from(50)
}

fn default_max_position_loss_pct() -> Decimal {
    Decimal::from(5)
}

fn default_max_total_loss_pct() -> Decimal {
    Decimal::from(10)
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::from(15)
}

fn default_max_concentration() -> Decimal {
    Decimal::new(3, 1)
}

fn default_warn_threshold_pct() -> Decimal {
    Decimal::from(80)
}

fn default_wal_log_path() -> PathBuf {
    PathBuf::from("./data/wal.jsonl")
}

fn default_wal_max_file_size_mb() -> u64 {
    100
}

fn default_event_queue_size() -> usize {
    10_000
}

fn default_crossing_spread_bps() -> Decimal {
    Decimal::from(5)
}

fn default_true() -> bool {
    true
}
