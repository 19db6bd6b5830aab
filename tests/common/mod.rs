//! Common test utilities and fixtures

#![allow(dead_code)]

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use trading_orchestrator::common::types::{OrderHandle, OrderStatus, OrderType, Side, SymbolFilters};
use trading_orchestrator::config::{RetrySettings, SimulationConfig, StrategySettings};
use trading_orchestrator::strategy::{RetryPolicy, StrategyContext};
use trading_orchestrator::{SharedExchange, SimulatedExchange};

/// Poll interval used by strategy tests
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Small polling budgets so timeouts are reached quickly
pub fn test_settings() -> StrategySettings {
    StrategySettings {
        poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
        entry_max_polls: 5,
        bracket_max_polls: 10,
        retry: RetrySettings {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            multiplier: 2,
        },
    }
}

/// BTCUSDT with a 0.1 tick, 0.001 step and 5 USDT minimum notional
pub fn btc_filters() -> SymbolFilters {
    SymbolFilters::new("BTCUSDT", dec!(0.1), dec!(0.001), dec!(5))
        .with_quantity_bounds(dec!(0.001), dec!(1000))
}

/// Simulated exchange with only BTCUSDT
pub fn simulation() -> SimulationConfig {
    SimulationConfig {
        symbols: vec![btc_filters()],
        ..SimulationConfig::default()
    }
}

/// Simulated exchange plus a context wired to it
pub fn simulated(config: SimulationConfig) -> (Arc<SimulatedExchange>, StrategyContext) {
    let exchange = Arc::new(SimulatedExchange::new(config));
    let shared: SharedExchange = exchange.clone();
    let ctx = StrategyContext::new(shared, &test_settings());
    (exchange, ctx)
}

/// Context over an arbitrary adapter (mocks)
pub fn context(exchange: SharedExchange) -> StrategyContext {
    StrategyContext::new(exchange, &test_settings()).with_retry(RetryPolicy::none())
}

/// Handle as an adapter would return it
pub fn handle(id: &str, order_type: OrderType, side: Side, status: OrderStatus) -> OrderHandle {
    OrderHandle {
        order_id: id.to_string(),
        symbol: "BTCUSDT".to_string(),
        side,
        order_type,
        quantity: dec!(0.01),
        price: None,
        stop_price: None,
        status,
        executed_qty: if status == OrderStatus::Filled {
            dec!(0.01)
        } else {
            dec!(0)
        },
    }
}

/// Same order with a new status
pub fn with_status(handle: &OrderHandle, status: OrderStatus) -> OrderHandle {
    let mut updated = handle.clone();
    updated.status = status;
    if status == OrderStatus::Filled {
        updated.executed_qty = updated.quantity;
    }
    updated
}

/// Binance API response samples
pub mod responses {
    pub const EXCHANGE_INFO: &str = r#"{
        "timezone": "UTC",
        "serverTime": 1565246363776,
        "symbols": [
            {
                "symbol": "BTCUSDT",
                "status": "TRADING",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "556.80", "maxPrice": "4529764", "tickSize": "0.10"},
                    {"filterType": "LOT_SIZE", "stepSize": "0.001", "maxQty": "1000", "minQty": "0.001"},
                    {"filterType": "MARKET_LOT_SIZE", "stepSize": "0.001", "maxQty": "120", "minQty": "0.001"},
                    {"filterType": "MAX_NUM_ORDERS", "limit": 200},
                    {"filterType": "MIN_NOTIONAL", "notional": "100"},
                    {"filterType": "PERCENT_PRICE", "multiplierUp": "1.0500", "multiplierDown": "0.9500", "multiplierDecimal": "4"}
                ]
            }
        ]
    }"#;

    pub const NEW_LIMIT_ORDER: &str = r#"{
        "clientOrderId": "x-1",
        "cumQty": "0",
        "cumQuote": "0",
        "executedQty": "0",
        "orderId": 4079151934,
        "avgPrice": "0.00",
        "origQty": "0.010",
        "price": "49000.00",
        "reduceOnly": false,
        "side": "BUY",
        "status": "NEW",
        "stopPrice": "0",
        "symbol": "BTCUSDT",
        "timeInForce": "GTC",
        "type": "LIMIT",
        "origType": "LIMIT",
        "updateTime": 1700000000000,
        "workingType": "CONTRACT_PRICE"
    }"#;

    pub const FILLED_LIMIT_ORDER: &str = r#"{
        "orderId": 4079151934,
        "avgPrice": "49000.00",
        "origQty": "0.010",
        "executedQty": "0.010",
        "price": "49000.00",
        "reduceOnly": false,
        "side": "BUY",
        "status": "FILLED",
        "stopPrice": "0",
        "symbol": "BTCUSDT",
        "timeInForce": "GTC",
        "type": "LIMIT",
        "origType": "LIMIT",
        "updateTime": 1700000005000
    }"#;

    pub const BALANCES: &str = r#"[
        {"accountAlias": "SgsR", "asset": "USDT", "balance": "1000.50", "crossWalletBalance": "1000.50",
         "crossUnPnl": "0", "availableBalance": "950.25", "maxWithdrawAmount": "950.25", "marginAvailable": true},
        {"accountAlias": "SgsR", "asset": "BNB", "balance": "0", "crossWalletBalance": "0",
         "crossUnPnl": "0", "availableBalance": "0", "maxWithdrawAmount": "0", "marginAvailable": true}
    ]"#;

    pub const PREMIUM_INDEX: &str = r#"{
        "symbol": "BTCUSDT",
        "markPrice": "64123.45000000",
        "indexPrice": "64110.00000000",
        "lastFundingRate": "0.00010000",
        "nextFundingTime": 1700000000000,
        "time": 1699999999000
    }"#;
}
