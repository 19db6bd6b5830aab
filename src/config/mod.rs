//! Configuration module - Types and loading

pub mod loader;
pub mod types;

pub use loader::load_config;
pub use types::{
    ApiCredentials, AppConfig, AppSettings, BinanceConfig, RetrySettings, SimulationConfig,
    StrategySettings,
};
