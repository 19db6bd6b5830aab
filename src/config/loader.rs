//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{ExchangeError, ExchangeResult};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. `BINANCE_API_KEY`, `BINANCE_API_SECRET`, `BINANCE_TESTNET`
/// 2. Environment variables (prefixed with APP__)
/// 3. Configuration file (TOML format)
/// 4. Default values
pub fn load_config(config_path: Option<&str>) -> ExchangeResult<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let testnet = std::env::var("BINANCE_TESTNET")
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1");

    builder = builder
        .set_override_option("binance.api_key", std::env::var("BINANCE_API_KEY").ok())
        .and_then(|b| {
            b.set_override_option("binance.api_secret", std::env::var("BINANCE_API_SECRET").ok())
        })
        .and_then(|b| b.set_override_option("binance.testnet", testnet))
        .map_err(|e| ExchangeError::Configuration(e.to_string()))?;

    let config = builder
        .build()
        .map_err(|e| ExchangeError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ExchangeError::Configuration(e.to_string()))
}
