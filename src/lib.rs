//! Trading Orchestrator Library
//!
//! Order placement and orchestration for Binance USDⓈ-M futures: simple
//! orders, one-cancels-other brackets, TWAP slicing and grid ladders,
//! against the live exchange or a deterministic simulation.

pub mod binance;
pub mod common;
pub mod config;
pub mod simulated;
pub mod strategy;

// Re-export commonly used types
pub use binance::{BinanceClient, BinanceRestClient};
pub use common::errors::{
    ExchangeError, ExchangeResult, OrchestrationError, Result, StrategyError, ValidationError,
};
pub use common::traits::{ExchangeClient, SharedExchange};
pub use common::types::{
    OrderHandle, OrderRequest, OrderStatus, OrderType, Side, SymbolFilters, TimeInForce,
};
pub use config::types::AppConfig;
pub use simulated::{SimulatedExchange, SimulatedFault};

// Strategy types
pub use strategy::{
    normalize, FailurePolicy, GridPlacer, GridReport, GridRequest, OcoReport, OcoRequest,
    OcoWatcher, OrderPlacer, Outcome, StopSignal, StrategyContext, TwapReport, TwapRequest,
    TwapScheduler,
};
