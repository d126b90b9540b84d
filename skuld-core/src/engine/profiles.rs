//! Ready-made configuration profiles.
//!
//! Presets bundle the risk knobs that move together; drivers start from
//! one and override the rest.

use crate::engine::EngineConfig;
use rust_decimal::Decimal;

/// Tight limits: small per-position budget, shallow drawdown tolerance,
/// narrow spread gate.
pub fn conservative(symbol: impl Into<String>) -> EngineConfig {
    let mut config = EngineConfig::new(symbol);
    config.max_position_loss_pct = Decimal::from(2);
    config.max_total_loss_pct = Decimal::from(5);
    config.max_drawdown_pct = Decimal::from(8);
    config.max_concentration = Decimal::new(2, 1);
    config.max_spread_bps = Decimal::from(25);
    config
}

/// Wide limits for strategies that need room to breathe.
pub fn aggressive(symbol: impl Into<String>) -> EngineConfig {
    let mut config = EngineConfig::new(symbol);
    config.max_position_loss_pct = Decimal::from(8);
    config.max_total_loss_pct = Decimal::from(15);
    config.max_drawdown_pct = Decimal::from(20);
    config.max_concentration = Decimal::new(5, 1);
    config.max_spread_bps = Decimal::from(80);
    config
}
