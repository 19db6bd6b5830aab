//! Grid placer against the simulated exchange

mod common;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

use common::{simulated, simulation};
use trading_orchestrator::common::types::{OrderHandle, OrderStatus, OrderType, Side};
use trading_orchestrator::strategy::{
    FailurePolicy, GridPlacer, GridRequest, LevelOutcome, Outcome, StopSignal,
};
use trading_orchestrator::{
    ExchangeClient, ExchangeError, GridReport, SimulatedFault, StrategyError, ValidationError,
};

fn request(reference_price: Option<Decimal>) -> GridRequest {
    GridRequest {
        symbol: "BTCUSDT".to_string(),
        lower_price: dec!(100),
        upper_price: dec!(200),
        num_grids: 4,
        quantity_per_grid: dec!(0.1),
        reference_price,
    }
}

fn sides(report: &GridReport) -> Vec<Option<Side>> {
    report.levels.iter().map(|l| l.side).collect()
}

fn placed_at(report: &GridReport, price: Decimal) -> OrderHandle {
    report
        .placed()
        .find(|handle| handle.price == Some(price))
        .cloned()
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn test_ladder_is_placed_around_reference() {
    let (exchange, ctx) = simulated(simulation());
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let report = grid.run(&request(Some(dec!(140)))).await.unwrap();

    let prices: Vec<Decimal> = report.levels.iter().map(|l| l.price).collect();
    assert_eq!(prices, vec![dec!(100), dec!(125), dec!(150), dec!(175), dec!(200)]);
    assert_eq!(
        sides(&report),
        vec![
            Some(Side::Buy),
            Some(Side::Buy),
            Some(Side::Sell),
            Some(Side::Sell),
            Some(Side::Sell)
        ]
    );
    assert_eq!(report.outcome(), Outcome::Success);

    let submitted = exchange.submitted_orders().await;
    assert_eq!(submitted.len(), 5);
    for order in &submitted {
        assert_eq!(order.request.order_type, OrderType::Limit);
        assert_eq!(order.request.quantity, dec!(0.1));
        let price = order.request.price.unwrap();
        let expected = if price < dec!(140) { Side::Buy } else { Side::Sell };
        assert_eq!(order.request.side, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_on_one_level_does_not_block_others() {
    let (exchange, ctx) = simulated(simulation());
    exchange
        .inject_fault_at_price(dec!(150), SimulatedFault::Transient)
        .await;
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let report = grid.run(&request(Some(dec!(140)))).await.unwrap();

    for level in &report.levels {
        if level.price == dec!(150) {
            assert!(matches!(
                level.outcome,
                LevelOutcome::Failed(StrategyError::Exchange(ExchangeError::Network(_)))
            ));
        } else {
            assert!(matches!(level.outcome, LevelOutcome::Placed(_)));
        }
    }
    assert_eq!(
        report.outcome(),
        Outcome::PartialSuccess {
            succeeded: 4,
            failed: 1
        }
    );
    assert_eq!(exchange.submitted_orders().await.len(), 4);
}

#[tokio::test]
async fn test_level_at_reference_is_skipped() {
    let (exchange, ctx) = simulated(simulation());
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let report = grid.run(&request(Some(dec!(150)))).await.unwrap();

    assert_eq!(report.levels[2].side, None);
    assert_eq!(report.levels[2].outcome, LevelOutcome::Skipped);
    assert_eq!(report.placed().count(), 4);
    assert_eq!(report.outcome(), Outcome::Success);
    assert!(exchange
        .submitted_orders()
        .await
        .iter()
        .all(|o| o.request.price != Some(dec!(150))));
}

#[tokio::test(start_paused = true)]
async fn test_reference_price_lookup_is_retried() {
    let (exchange, ctx) = simulated(simulation().with_reference_price(dec!(180)));
    exchange.fail_reference_price(1).await;
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let report = grid.run(&request(None)).await.unwrap();

    assert_eq!(report.reference_price, dec!(180));
    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(exchange.submitted_orders().await.len(), 5);
}

#[tokio::test]
async fn test_reference_price_defaults_to_exchange_price() {
    let (_, ctx) = simulated(simulation().with_reference_price(dec!(180)));
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let report = grid.run(&request(None)).await.unwrap();

    assert_eq!(report.reference_price, dec!(180));
    assert_eq!(
        sides(&report),
        vec![
            Some(Side::Buy),
            Some(Side::Buy),
            Some(Side::Buy),
            Some(Side::Buy),
            Some(Side::Sell)
        ]
    );
}

#[tokio::test]
async fn test_abort_policy_leaves_remaining_levels_unsubmitted() {
    let (exchange, ctx) = simulated(simulation());
    exchange
        .inject_fault_at_price(
            dec!(125),
            SimulatedFault::Rejected {
                code: -2019,
                message: "Margin is insufficient.".to_string(),
            },
        )
        .await;
    let grid = GridPlacer::new(ctx, FailurePolicy::AbortOnFirstFailure);

    let report = grid.run(&request(Some(dec!(140)))).await.unwrap();

    assert!(matches!(report.levels[0].outcome, LevelOutcome::Placed(_)));
    assert!(matches!(report.levels[1].outcome, LevelOutcome::Failed(_)));
    for level in &report.levels[2..] {
        assert_eq!(level.outcome, LevelOutcome::NotSubmitted);
    }
    assert_eq!(exchange.submitted_orders().await.len(), 1);
}

#[tokio::test]
async fn test_level_below_min_notional_fails_alone() {
    let (exchange, ctx) = simulated(simulation());
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    // 0.04 * 100 = 4 is under the 5 USDT minimum; the other levels pass
    let mut req = request(Some(dec!(140)));
    req.quantity_per_grid = dec!(0.04);
    let report = grid.run(&req).await.unwrap();

    assert!(matches!(
        report.levels[0].outcome,
        LevelOutcome::Failed(StrategyError::Validation(
            ValidationError::NotionalTooSmall { .. }
        ))
    ));
    assert_eq!(report.placed().count(), 4);
    assert_eq!(exchange.submitted_orders().await.len(), 4);
}

#[tokio::test]
async fn test_invalid_grid_is_rejected_up_front() {
    let (exchange, ctx) = simulated(simulation());
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let mut req = request(Some(dec!(140)));
    req.num_grids = 1;
    let err = grid.run(&req).await.unwrap_err();
    assert!(matches!(
        err,
        StrategyError::Validation(ValidationError::InvalidParameter(_))
    ));
    assert!(exchange.submitted_orders().await.is_empty());
}

#[tokio::test]
async fn test_cancel_placed_cancels_every_resting_level() {
    let (exchange, ctx) = simulated(simulation());
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let report = grid.run(&request(Some(dec!(150)))).await.unwrap();
    let canceled = grid.cancel_placed(&report).await;

    assert_eq!(canceled.len(), 4);
    for result in &canceled {
        assert!(result.result.is_ok());
        let order = exchange.order(&result.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
    }
}

#[tokio::test]
async fn test_cancel_orders_reports_price_and_already_closed_orders() {
    let (exchange, ctx) = simulated(simulation().with_limit_fill_after_polls(None));
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);

    let report = grid.run(&request(Some(dec!(150)))).await.unwrap();
    let filled = placed_at(&report, dec!(100));
    exchange.fill(&filled.order_id).await.unwrap();

    let canceled = grid.cancel_orders(report.placed()).await;

    assert_eq!(canceled.len(), 4);
    assert_eq!(canceled[0].price, Some(dec!(100)));
    assert!(matches!(
        canceled[0].result,
        Err(ExchangeError::AlreadyResolved(_))
    ));
    assert!(canceled[1..].iter().all(|c| c.result.is_ok()));
}

#[tokio::test(start_paused = true)]
async fn test_maintain_replaces_filled_levels_on_the_opposite_side() {
    let (exchange, ctx) = simulated(simulation().with_limit_fill_after_polls(None));
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);
    let report = grid.run(&request(Some(dec!(150)))).await.unwrap();
    assert_eq!(report.step, dec!(25));

    let bought = placed_at(&report, dec!(125));
    let sold = placed_at(&report, dec!(175));
    exchange.fill(&bought.order_id).await.unwrap();
    exchange.fill(&sold.order_id).await.unwrap();

    let maintenance = grid.maintain(&report, 3).await.unwrap();

    assert_eq!(maintenance.sweeps, 3);
    assert!(!maintenance.stopped);
    assert_eq!(maintenance.replacements.len(), 2);

    let first = &maintenance.replacements[0];
    assert_eq!(first.filled.order_id, bought.order_id);
    assert_eq!(first.side, Side::Sell);
    let placed = first.result.as_ref().unwrap();
    assert_eq!(placed.side, Side::Sell);
    assert_eq!(placed.price, Some(dec!(150)));
    assert_eq!(placed.quantity, dec!(0.1));

    let second = &maintenance.replacements[1];
    assert_eq!(second.filled.order_id, sold.order_id);
    assert_eq!(second.side, Side::Buy);
    assert_eq!(second.result.as_ref().unwrap().price, Some(dec!(150)));

    // 100 and 200 untouched, plus both replacements
    assert_eq!(maintenance.working.len(), 4);
    assert!(maintenance.working.iter().all(|o| !o.is_filled()));

    let submitted = exchange.submitted_orders().await;
    assert_eq!(submitted.len(), 6);
    assert_eq!(submitted[4].request.side, Side::Sell);
    assert_eq!(submitted[5].request.side, Side::Buy);
}

#[tokio::test(start_paused = true)]
async fn test_maintain_drops_orders_that_end_without_filling() {
    let (exchange, ctx) = simulated(simulation().with_limit_fill_after_polls(None));
    let grid = GridPlacer::new(ctx, FailurePolicy::ContinueOnError);
    let report = grid.run(&request(Some(dec!(150)))).await.unwrap();

    exchange
        .cancel_order(&placed_at(&report, dec!(200)))
        .await
        .unwrap();

    let maintenance = grid.maintain(&report, 2).await.unwrap();

    assert!(maintenance.replacements.is_empty());
    assert_eq!(maintenance.working.len(), 3);
    assert!(maintenance
        .working
        .iter()
        .all(|o| o.price != Some(dec!(200))));
    assert_eq!(exchange.submitted_orders().await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_maintain_ends_on_stop() {
    let stop = StopSignal::new();
    let (_, ctx) = simulated(simulation().with_limit_fill_after_polls(None));
    let grid = GridPlacer::new(ctx.with_stop(stop.clone()), FailurePolicy::ContinueOnError);
    let report = grid.run(&request(Some(dec!(150)))).await.unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        stop.stop();
    });
    let maintenance = grid.maintain(&report, 100).await.unwrap();

    assert!(maintenance.stopped);
    assert_eq!(maintenance.sweeps, 3);
    assert_eq!(maintenance.working.len(), 4);
}
