//! Reference strategies for the skuld engine.
//!
//! Signal producers built on a shared rolling-indicator kit:
//! - `LiquidationHunter`: fades or follows liquidation clusters
//! - `Momentum`: lookback momentum gated by an RSI exhaustion filter
//! - `MarketMaker`: inventory-skewed quotes with vol-scaled spread
//! - `MeanReversion`: fades multi-sigma stretches back to the mean

pub mod indicators;
pub mod liquidation;
pub mod market_maker;
pub mod mean_reversion;
pub mod momentum;

pub use liquidation::{
    LeverageBandLevels, LiquidationCluster, LiquidationHunter, LiquidationHunterConfig,
    LiquidationLevels,
};
pub use market_maker::{MarketMaker, MarketMakerConfig};
pub use mean_reversion::{MeanReversion, MeanReversionConfig};
pub use momentum::{Momentum, MomentumConfig};
