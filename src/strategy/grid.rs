//! Grid ladder of limit orders
//!
//! `num_grids + 1` evenly spaced levels between the bounds. Levels below
//! the reference price buy, levels above sell, a level exactly at the
//! reference is skipped.
//!
//! [`GridPlacer::maintain`] keeps the ladder stocked afterwards: a filled
//! buy is replaced by a sell one step higher, a filled sell by a buy one
//! step lower.

use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::common::errors::{ExchangeError, Result, StrategyError, ValidationError};
use crate::common::types::{OrderHandle, OrderRequest, Side, SymbolFilters};
use crate::strategy::poll::{poll_until, PollOutcome, PollSchedule};
use crate::strategy::quantize::{normalize, normalize_price};
use crate::strategy::types::{FailurePolicy, Outcome, StrategyContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRequest {
    pub symbol: String,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    /// Number of gaps between levels (at least 2)
    pub num_grids: u32,
    pub quantity_per_grid: Decimal,
    /// Defaults to the exchange's mark price
    pub reference_price: Option<Decimal>,
}

/// One rung of the ladder
#[derive(Debug, Clone, PartialEq)]
pub struct GridLevel {
    pub index: usize,
    pub price: Decimal,
    /// None when the level sits at the reference price
    pub side: Option<Side>,
    /// Normalized order, or why this level cannot be placed
    pub order: std::result::Result<OrderRequest, ValidationError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan {
    pub symbol: String,
    pub reference_price: Decimal,
    pub step: Decimal,
    pub levels: Vec<GridLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LevelOutcome {
    Placed(OrderHandle),
    Failed(StrategyError),
    /// At the reference price, nothing placed
    Skipped,
    /// Not attempted after an earlier failure
    NotSubmitted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLevelResult {
    pub index: usize,
    pub price: Decimal,
    pub side: Option<Side>,
    pub outcome: LevelOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridReport {
    pub symbol: String,
    pub reference_price: Decimal,
    /// Spacing between levels
    pub step: Decimal,
    pub levels: Vec<GridLevelResult>,
}

impl GridReport {
    pub fn placed(&self) -> impl Iterator<Item = &OrderHandle> {
        self.levels.iter().filter_map(|level| match &level.outcome {
            LevelOutcome::Placed(handle) => Some(handle),
            _ => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.levels
            .iter()
            .filter(|level| matches!(level.outcome, LevelOutcome::Failed(_)))
            .count()
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_counts(self.placed().count(), self.failed())
    }
}

/// Result of canceling one grid order
#[derive(Debug, Clone, PartialEq)]
pub struct CancelResult {
    pub order_id: String,
    pub price: Option<Decimal>,
    pub result: std::result::Result<OrderHandle, ExchangeError>,
}

/// A filled grid order and the opposite-side order sent in its place
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub filled: OrderHandle,
    pub side: Side,
    pub result: std::result::Result<OrderHandle, StrategyError>,
}

/// How a [`GridPlacer::maintain`] run ended
#[derive(Debug, Clone, PartialEq)]
pub struct GridMaintenance {
    /// Grid orders still resting
    pub working: Vec<OrderHandle>,
    pub replacements: Vec<Replacement>,
    /// Status sweeps performed
    pub sweeps: u32,
    /// The stop signal ended maintenance
    pub stopped: bool,
}

#[derive(Default)]
struct MaintainState {
    working: Vec<OrderHandle>,
    replacements: Vec<Replacement>,
    sweeps: u32,
}

/// Builds and submits a [`GridPlan`]
#[derive(Debug, Clone)]
pub struct GridPlacer {
    ctx: StrategyContext,
    policy: FailurePolicy,
}

impl GridPlacer {
    pub fn new(ctx: StrategyContext, policy: FailurePolicy) -> Self {
        Self { ctx, policy }
    }

    /// Compute the ladder; no I/O
    ///
    /// Plan-level problems fail the whole grid, per-level problems are kept
    /// on the level and reported as that level's failure.
    pub fn plan(
        request: &GridRequest,
        reference_price: Decimal,
        filters: &SymbolFilters,
    ) -> std::result::Result<GridPlan, ValidationError> {
        if request.num_grids < 2 {
            return Err(ValidationError::InvalidParameter(format!(
                "grid needs at least 2 grids, got {}",
                request.num_grids
            )));
        }
        if request.lower_price >= request.upper_price {
            return Err(ValidationError::InvalidParameter(format!(
                "lower price {} must be below upper price {}",
                request.lower_price, request.upper_price
            )));
        }
        if request.lower_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidParameter(format!(
                "lower price must be positive, got {}",
                request.lower_price
            )));
        }

        let step = (request.upper_price - request.lower_price) / Decimal::from(request.num_grids);
        if step < filters.tick_size {
            return Err(ValidationError::InvalidParameter(format!(
                "grid spacing {} is finer than tick size {}",
                step, filters.tick_size
            )));
        }
        let reference_price = normalize_price(reference_price, filters)?;

        let levels = (0..=request.num_grids)
            .map(|k| {
                let raw = request.lower_price + step * Decimal::from(k);
                let price = normalize_price(raw, filters).unwrap_or(raw);
                let side = if price < reference_price {
                    Some(Side::Buy)
                } else if price > reference_price {
                    Some(Side::Sell)
                } else {
                    None
                };
                let order = normalize(Some(raw), request.quantity_per_grid, filters).map(|params| {
                    OrderRequest::limit(
                        &request.symbol,
                        side.unwrap_or(Side::Buy),
                        params.quantity,
                        params.price.unwrap_or(price),
                    )
                });
                GridLevel {
                    index: k as usize,
                    price,
                    side,
                    order,
                }
            })
            .collect();

        Ok(GridPlan {
            symbol: request.symbol.clone(),
            reference_price,
            step,
            levels,
        })
    }

    /// Resolve the reference price, plan, and submit
    #[instrument(skip(self), fields(symbol = %request.symbol))]
    pub async fn run(&self, request: &GridRequest) -> Result<GridReport> {
        let filters = self.ctx.filters(&request.symbol).await?;
        let reference_price = match request.reference_price {
            Some(price) => price,
            None => self.ctx.reference_price(&request.symbol).await?,
        };
        let plan = Self::plan(request, reference_price, &filters)?;
        Ok(self.execute(&plan).await)
    }

    /// Submit every placeable level of `plan`
    pub async fn execute(&self, plan: &GridPlan) -> GridReport {
        info!(
            "Grid {}: {} levels, step {}, reference {}",
            plan.symbol,
            plan.levels.len(),
            plan.step,
            plan.reference_price
        );

        let levels = match self.policy {
            FailurePolicy::ContinueOnError => {
                join_all(plan.levels.iter().map(|level| self.place_level(level))).await
            }
            FailurePolicy::AbortOnFirstFailure => {
                let mut results = Vec::with_capacity(plan.levels.len());
                let mut aborted = false;
                for level in &plan.levels {
                    if aborted {
                        results.push(result_for(level, LevelOutcome::NotSubmitted));
                        continue;
                    }
                    let result = self.place_level(level).await;
                    if matches!(result.outcome, LevelOutcome::Failed(_)) {
                        warn!("Aborting grid after level {} failed", level.index);
                        aborted = true;
                    }
                    results.push(result);
                }
                results
            }
        };

        let report = GridReport {
            symbol: plan.symbol.clone(),
            reference_price: plan.reference_price,
            step: plan.step,
            levels,
        };
        info!(
            "Grid finished: {} ({} placed)",
            report.outcome(),
            report.placed().count()
        );
        report
    }

    async fn place_level(&self, level: &GridLevel) -> GridLevelResult {
        if level.side.is_none() {
            info!("Level {} at {} is at the reference price, skipping", level.index, level.price);
            return result_for(level, LevelOutcome::Skipped);
        }

        let outcome = match &level.order {
            Err(err) => {
                warn!("Level {} at {} invalid: {}", level.index, level.price, err);
                LevelOutcome::Failed(err.clone().into())
            }
            Ok(request) => match self.ctx.submit(request).await {
                Ok(handle) => LevelOutcome::Placed(handle),
                Err(err) => {
                    warn!("Level {} at {} failed: {}", level.index, level.price, err);
                    LevelOutcome::Failed(err.into())
                }
            },
        };
        result_for(level, outcome)
    }

    /// Replace filled orders until the sweep budget runs out, the stop
    /// signal fires, or nothing is left working
    ///
    /// One sweep refreshes every working order, then waits a poll interval.
    /// Orders that end without filling are dropped from the grid.
    #[instrument(skip(self, report), fields(symbol = %report.symbol))]
    pub async fn maintain(&self, report: &GridReport, max_sweeps: u32) -> Result<GridMaintenance> {
        let filters = self.ctx.filters(&report.symbol).await?;
        let schedule = PollSchedule::new(self.ctx.poll_interval, max_sweeps);
        let state = Mutex::new(MaintainState {
            working: report.placed().cloned().collect(),
            ..MaintainState::default()
        });

        let shared = &state;
        let filters = &filters;
        let step = report.step;
        let outcome = poll_until(&schedule, &self.ctx.stop, |_| async move {
            let mut state = shared.lock().await;
            state.sweeps += 1;
            for order in std::mem::take(&mut state.working) {
                match self.ctx.refresh(&order).await {
                    Ok(current) if current.is_filled() => {
                        let replacement = self.replace_filled(&current, step, filters).await;
                        if let Ok(placed) = &replacement.result {
                            state.working.push(placed.clone());
                        }
                        state.replacements.push(replacement);
                    }
                    Ok(current) if current.status.is_dead() => {
                        warn!("Grid order #{} ended {}, dropping it", current.order_id, current.status);
                    }
                    Ok(current) => state.working.push(current),
                    Err(err) => {
                        warn!("Could not refresh grid order #{}: {}", order.order_id, err);
                        state.working.push(order);
                    }
                }
            }
            Ok::<_, ExchangeError>(state.working.is_empty().then_some(()))
        })
        .await?;

        let state = state.into_inner();
        let stopped = outcome == PollOutcome::Stopped;
        info!(
            "Grid maintenance ended after {} sweeps: {} replacements, {} orders working",
            state.sweeps,
            state.replacements.len(),
            state.working.len()
        );
        Ok(GridMaintenance {
            working: state.working,
            replacements: state.replacements,
            sweeps: state.sweeps,
            stopped,
        })
    }

    async fn replace_filled(
        &self,
        filled: &OrderHandle,
        step: Decimal,
        filters: &SymbolFilters,
    ) -> Replacement {
        let side = filled.side.opposite();
        let base = filled.price.unwrap_or_default();
        let target = match side {
            Side::Sell => base.checked_add(step),
            Side::Buy => base.checked_sub(step),
        };

        let result: std::result::Result<OrderHandle, StrategyError> = match target {
            None => Err(ValidationError::InvalidParameter(format!(
                "replacement for #{} overflows",
                filled.order_id
            ))
            .into()),
            Some(price) => match normalize(Some(price), filled.quantity, filters) {
                Err(err) => Err(err.into()),
                Ok(params) => {
                    let request = OrderRequest::limit(
                        &filled.symbol,
                        side,
                        params.quantity,
                        params.price.unwrap_or(price),
                    );
                    self.ctx.submit(&request).await.map_err(StrategyError::from)
                }
            },
        };

        match &result {
            Ok(placed) => info!("Grid order #{} filled, replaced by {}", filled.order_id, placed),
            Err(err) => warn!("Could not replace filled grid order #{}: {}", filled.order_id, err),
        }
        Replacement {
            filled: filled.clone(),
            side,
            result,
        }
    }

    /// Cancel every order a previous run placed
    pub async fn cancel_placed(&self, report: &GridReport) -> Vec<CancelResult> {
        self.cancel_orders(report.placed()).await
    }

    /// Cancel the given grid orders concurrently
    pub async fn cancel_orders<'a>(
        &self,
        orders: impl IntoIterator<Item = &'a OrderHandle>,
    ) -> Vec<CancelResult> {
        let results = join_all(orders.into_iter().map(|handle| async move {
            let result = self.ctx.cancel(handle).await;
            if let Err(err) = &result {
                warn!("Could not cancel grid order #{}: {}", handle.order_id, err);
            }
            CancelResult {
                order_id: handle.order_id.clone(),
                price: handle.price,
                result,
            }
        }))
        .await;

        info!(
            "Canceled {}/{} grid orders",
            results.iter().filter(|r| r.result.is_ok()).count(),
            results.len()
        );
        results
    }
}

fn result_for(level: &GridLevel, outcome: LevelOutcome) -> GridLevelResult {
    GridLevelResult {
        index: level.index,
        price: level.price,
        side: level.side,
        outcome,
    }
}
