//! Simple orders against the simulated exchange

mod common;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use common::{simulated, simulation};
use trading_orchestrator::common::types::{OrderStatus, OrderType, Side, TimeInForce};
use trading_orchestrator::strategy::OrderPlacer;
use trading_orchestrator::{ExchangeError, StrategyError, ValidationError};

#[test_log::test(tokio::test)]
async fn test_market_quantity_is_floored_to_step() {
    let (exchange, ctx) = simulated(simulation());

    let handle = OrderPlacer::new(ctx)
        .place_market("BTCUSDT", Side::Buy, dec!(0.0129))
        .await
        .unwrap();

    assert_eq!(handle.order_type, OrderType::Market);
    assert_eq!(handle.quantity, dec!(0.012));

    let submitted = exchange.submitted_orders().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].request.price, None);
    assert_eq!(submitted[0].request.time_in_force, None);
}

#[tokio::test]
async fn test_limit_price_is_rounded_to_tick() {
    let (exchange, ctx) = simulated(simulation());

    let handle = OrderPlacer::new(ctx)
        .place_limit("BTCUSDT", Side::Sell, dec!(0.01), dec!(50000.04), TimeInForce::Ioc)
        .await
        .unwrap();

    assert_eq!(handle.price, Some(dec!(50000)));
    assert_eq!(handle.status, OrderStatus::New);

    let request = &exchange.submitted_orders().await[0].request;
    assert_eq!(request.order_type, OrderType::Limit);
    assert_eq!(request.side, Side::Sell);
    assert_eq!(request.time_in_force, Some(TimeInForce::Ioc));
}

#[tokio::test]
async fn test_stop_limit_rounds_both_prices() {
    let (exchange, ctx) = simulated(simulation());

    OrderPlacer::new(ctx)
        .place_stop_limit("BTCUSDT", Side::Sell, dec!(0.01), dec!(48999.95), dec!(49000.06))
        .await
        .unwrap();

    let request = &exchange.submitted_orders().await[0].request;
    assert_eq!(request.order_type, OrderType::StopLimit);
    assert_eq!(request.price, Some(dec!(49000)));
    assert_eq!(request.stop_price, Some(dec!(49000.1)));
}

#[tokio::test]
async fn test_notional_below_minimum_is_not_sent() {
    let (exchange, ctx) = simulated(simulation());

    // 0.001 * 1000 = 1 USDT, minimum is 5
    let err = OrderPlacer::new(ctx)
        .place_limit("BTCUSDT", Side::Buy, dec!(0.001), dec!(1000), TimeInForce::Gtc)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StrategyError::Validation(ValidationError::NotionalTooSmall {
            notional: dec!(1),
            min_notional: dec!(5),
        })
    );
    assert!(exchange.submitted_orders().await.is_empty());
}

#[tokio::test]
async fn test_quantity_below_step_is_rejected() {
    let (exchange, ctx) = simulated(simulation());

    let err = OrderPlacer::new(ctx)
        .place_market("BTCUSDT", Side::Buy, dec!(0.0004))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StrategyError::Validation(ValidationError::InvalidQuantity { .. })
    ));
    assert!(exchange.submitted_orders().await.is_empty());
}

#[tokio::test]
async fn test_unknown_symbol_surfaces_exchange_error() {
    let (_, ctx) = simulated(simulation());

    let err = OrderPlacer::new(ctx)
        .place_market("DOGEUSDT", Side::Buy, dec!(100))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StrategyError::Exchange(ExchangeError::NotFound(_))
    ));
}
