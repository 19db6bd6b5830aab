//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::common::types::SymbolFilters;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Binance futures connection settings
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Dry-run adapter behavior
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Polling and retry budgets for the strategies
    #[serde(default)]
    pub strategy: StrategySettings,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Binance USDⓈ-M futures configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// API key for signed requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for signing requests
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Use the futures testnet
    #[serde(default = "default_testnet")]
    pub testnet: bool,
    /// Override for the REST base URL
    #[serde(default)]
    pub rest_url: Option<String>,
    /// recvWindow sent with signed requests
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            testnet: default_testnet(),
            rest_url: None,
            recv_window_ms: default_recv_window(),
        }
    }
}

impl std::fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked_key = self.api_key.as_deref().map(|key| {
            if key.len() > 8 {
                format!("{}...{}", &key[..4], &key[key.len() - 4..])
            } else {
                "***REDACTED***".to_string()
            }
        });

        f.debug_struct("BinanceConfig")
            .field("api_key", &masked_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***REDACTED***"))
            .field("testnet", &self.testnet)
            .field("rest_url", &self.rest_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .finish()
    }
}

impl BinanceConfig {
    /// REST base URL, honoring the override
    pub fn rest_base_url(&self) -> &str {
        match &self.rest_url {
            Some(url) => url.as_str(),
            None if self.testnet => "https://testnet.binancefuture.com",
            None => "https://fapi.binance.com",
        }
    }

    /// Both key and secret, if configured
    pub fn credentials(&self) -> Option<ApiCredentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(ApiCredentials::new(key.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}

fn default_testnet() -> bool {
    true
}

fn default_recv_window() -> u64 {
    5000
}

/// Deterministic behavior of the simulated exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// LIMIT orders report FILLED once polled this many times (None = never)
    #[serde(default = "default_limit_fill_after_polls")]
    pub limit_fill_after_polls: Option<u32>,
    /// Stop orders report FILLED once polled this many times (None = never)
    #[serde(default)]
    pub stop_fill_after_polls: Option<u32>,
    /// MARKET orders come back FILLED from submission instead of the first poll
    #[serde(default)]
    pub market_fill_on_submit: bool,
    /// Price returned as the reference (mark) price for every symbol
    #[serde(default = "default_reference_price")]
    pub reference_price: Decimal,
    /// Starting balances per asset
    #[serde(default = "default_balances")]
    pub balances: BTreeMap<String, Decimal>,
    /// Tradable symbols and their filters
    #[serde(default = "default_symbols")]
    pub symbols: Vec<SymbolFilters>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            limit_fill_after_polls: default_limit_fill_after_polls(),
            stop_fill_after_polls: None,
            market_fill_on_submit: false,
            reference_price: default_reference_price(),
            balances: default_balances(),
            symbols: default_symbols(),
        }
    }
}

impl SimulationConfig {
    pub fn with_limit_fill_after_polls(mut self, polls: Option<u32>) -> Self {
        self.limit_fill_after_polls = polls;
        self
    }

    pub fn with_stop_fill_after_polls(mut self, polls: Option<u32>) -> Self {
        self.stop_fill_after_polls = polls;
        self
    }

    pub fn with_market_fill_on_submit(mut self, enabled: bool) -> Self {
        self.market_fill_on_submit = enabled;
        self
    }

    pub fn with_reference_price(mut self, price: Decimal) -> Self {
        self.reference_price = price;
        self
    }

    /// Add or replace a simulated symbol
    pub fn with_symbol(mut self, filters: SymbolFilters) -> Self {
        self.symbols.retain(|s| s.symbol != filters.symbol);
        self.symbols.push(filters);
        self
    }
}

fn default_limit_fill_after_polls() -> Option<u32> {
    Some(2)
}

fn default_reference_price() -> Decimal {
    dec!(50000)
}

fn default_balances() -> BTreeMap<String, Decimal> {
    BTreeMap::from([("USDT".to_string(), dec!(1000.00))])
}

fn default_symbols() -> Vec<SymbolFilters> {
    vec![
        SymbolFilters::new("BTCUSDT", dec!(0.10), dec!(0.001), dec!(5))
            .with_quantity_bounds(dec!(0.001), dec!(1000))
            .with_price_bounds(dec!(0.10), dec!(1000000)),
        SymbolFilters::new("ETHUSDT", dec!(0.01), dec!(0.001), dec!(5))
            .with_quantity_bounds(dec!(0.001), dec!(10000))
            .with_price_bounds(dec!(0.01), dec!(100000)),
    ]
}

/// Polling and retry budgets shared by the strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    /// Delay between status polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Polls allowed while waiting for a LIMIT entry to fill
    #[serde(default = "default_entry_max_polls")]
    pub entry_max_polls: u32,
    /// Polls allowed while waiting for either bracket to fill
    #[serde(default = "default_bracket_max_polls")]
    pub bracket_max_polls: u32,
    /// Backoff for transient adapter errors
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            entry_max_polls: default_entry_max_polls(),
            bracket_max_polls: default_bracket_max_polls(),
            retry: RetrySettings::default(),
        }
    }
}

impl StrategySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_entry_max_polls() -> u32 {
    150
}

fn default_bracket_max_polls() -> u32 {
    43_200
}

/// Retry settings for transient adapter errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive backoffs
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    250
}

fn default_max_backoff() -> u64 {
    5000
}

fn default_multiplier() -> u32 {
    2
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// API credentials for signed requests
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .finish()
    }
}
