//! Time-weighted slicing of a parent order
//!
//! Slice `i` is released at `start + i * interval`; the last slice absorbs
//! the rounding remainder so the slices sum to the step-rounded total.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::common::errors::{Result, StrategyError, ValidationError};
use crate::common::types::{OrderHandle, OrderRequest, Side, SymbolFilters};
use crate::strategy::quantize::{floor_to_step, normalize, normalize_price, normalize_quantity};
use crate::strategy::types::{FailurePolicy, Outcome, StrategyContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwapRequest {
    pub symbol: String,
    pub side: Side,
    pub total_quantity: Decimal,
    /// At least 1
    pub num_slices: u32,
    pub duration: Duration,
    /// Send LIMIT children at this price instead of MARKET
    pub limit_price: Option<Decimal>,
}

/// Derived schedule for one TWAP run
#[derive(Debug, Clone, PartialEq)]
pub struct TwapPlan {
    pub symbol: String,
    pub side: Side,
    /// Step-rounded total
    pub total_quantity: Decimal,
    /// One entry per slice, in release order
    pub slice_quantities: Vec<Decimal>,
    pub interval: Duration,
    pub limit_price: Option<Decimal>,
}

impl TwapPlan {
    pub fn num_slices(&self) -> usize {
        self.slice_quantities.len()
    }

    fn request(&self, quantity: Decimal) -> OrderRequest {
        match self.limit_price {
            Some(price) => OrderRequest::limit(&self.symbol, self.side, quantity, price),
            None => OrderRequest::market(&self.symbol, self.side, quantity),
        }
    }
}

/// Result of one child order
#[derive(Debug, Clone, PartialEq)]
pub struct SliceResult {
    pub index: usize,
    pub quantity: Decimal,
    pub result: std::result::Result<OrderHandle, StrategyError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwapReport {
    /// Released slices, in order; unreleased slices are absent
    pub slices: Vec<SliceResult>,
    /// The stop signal ended the run early
    pub stopped: bool,
    /// A failure ended the run under [`FailurePolicy::AbortOnFirstFailure`]
    pub aborted: bool,
}

impl TwapReport {
    pub fn succeeded(&self) -> usize {
        self.slices.iter().filter(|s| s.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.slices.len() - self.succeeded()
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_counts(self.succeeded(), self.failed())
    }

    /// Total quantity of the slices that were accepted
    pub fn submitted_quantity(&self) -> Decimal {
        self.slices
            .iter()
            .filter(|s| s.result.is_ok())
            .map(|s| s.quantity)
            .sum()
    }
}

/// Whole minutes as a [`Duration`]
pub fn duration_from_minutes(minutes: u64) -> std::result::Result<Duration, ValidationError> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ValidationError::InvalidParameter(format!("{} minutes is too long", minutes)))
}

/// Releases the slices of a [`TwapPlan`] on schedule
#[derive(Debug, Clone)]
pub struct TwapScheduler {
    ctx: StrategyContext,
    policy: FailurePolicy,
}

impl TwapScheduler {
    pub fn new(ctx: StrategyContext, policy: FailurePolicy) -> Self {
        Self { ctx, policy }
    }

    /// Split the request into slices; no I/O
    pub fn plan(
        request: &TwapRequest,
        filters: &SymbolFilters,
    ) -> std::result::Result<TwapPlan, ValidationError> {
        if request.num_slices < 1 {
            return Err(ValidationError::InvalidParameter(
                "TWAP needs at least one slice".to_string(),
            ));
        }

        let total = normalize_quantity(request.total_quantity, filters)?;
        let n = Decimal::from(request.num_slices);
        let slice = floor_to_step(total / n, filters.step_size).ok_or_else(|| {
            ValidationError::InvalidParameter(format!(
                "slice of {} overflows on step {}",
                total, filters.step_size
            ))
        })?;
        if slice <= Decimal::ZERO {
            return Err(ValidationError::InvalidQuantity {
                requested: total / n,
                rounded: slice,
                step_size: filters.step_size,
            });
        }

        let limit_price = request
            .limit_price
            .map(|price| normalize_price(price, filters))
            .transpose()?;

        let mut slice_quantities = vec![slice; request.num_slices as usize];
        if let Some(last) = slice_quantities.last_mut() {
            *last = (total - slice * (n - Decimal::ONE)).normalize();
        }

        // Every child must pass the filters on its own
        for quantity in &slice_quantities {
            normalize(limit_price, *quantity, filters)?;
        }

        let gaps = request.num_slices.saturating_sub(1).max(1);
        Ok(TwapPlan {
            symbol: request.symbol.clone(),
            side: request.side,
            total_quantity: total,
            slice_quantities,
            interval: request.duration / gaps,
            limit_price,
        })
    }

    /// Fetch filters, plan, and execute
    #[instrument(skip(self), fields(symbol = %request.symbol))]
    pub async fn run(&self, request: &TwapRequest) -> Result<TwapReport> {
        let filters = self.ctx.filters(&request.symbol).await?;
        let plan = Self::plan(request, &filters)?;
        Ok(self.execute(&plan).await)
    }

    /// Release every slice of `plan`, pacing by `plan.interval`
    pub async fn execute(&self, plan: &TwapPlan) -> TwapReport {
        info!(
            "TWAP {} {} {} in {} slices every {:?}",
            plan.side,
            plan.total_quantity,
            plan.symbol,
            plan.num_slices(),
            plan.interval
        );

        let start = Instant::now();
        let mut report = TwapReport {
            slices: Vec::with_capacity(plan.num_slices()),
            stopped: false,
            aborted: false,
        };

        for (index, quantity) in plan.slice_quantities.iter().copied().enumerate() {
            if index > 0 {
                let release_at = start + plan.interval * index as u32;
                if !self.ctx.stop.sleep_until(release_at).await {
                    warn!("TWAP stopped before slice {}", index + 1);
                    report.stopped = true;
                    break;
                }
            } else if self.ctx.stop.is_stopped() {
                report.stopped = true;
                break;
            }

            let result = self
                .ctx
                .submit(&plan.request(quantity))
                .await
                .map_err(StrategyError::from);

            match &result {
                Ok(handle) => info!(
                    "Slice {}/{} placed: {}",
                    index + 1,
                    plan.num_slices(),
                    handle
                ),
                Err(err) => warn!("Slice {}/{} failed: {}", index + 1, plan.num_slices(), err),
            }

            let failed = result.is_err();
            report.slices.push(SliceResult {
                index,
                quantity,
                result,
            });

            if failed && self.policy == FailurePolicy::AbortOnFirstFailure {
                warn!("Aborting TWAP after slice {} failed", index + 1);
                report.aborted = true;
                break;
            }
        }

        info!(
            "TWAP finished: {} ({} of {} submitted)",
            report.outcome(),
            report.submitted_quantity(),
            plan.total_quantity
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn filters() -> SymbolFilters {
        SymbolFilters::new("BTCUSDT", dec!(0.1), dec!(0.001), dec!(0))
    }

    fn request(total: Decimal, slices: u32, secs: u64) -> TwapRequest {
        TwapRequest {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            total_quantity: total,
            num_slices: slices,
            duration: Duration::from_secs(secs),
            limit_price: None,
        }
    }

    #[test]
    fn test_slices_sum_to_rounded_total() {
        let plan = TwapScheduler::plan(&request(dec!(0.1), 5, 300), &filters()).unwrap();
        assert_eq!(plan.num_slices(), 5);
        assert_eq!(plan.slice_quantities.iter().copied().sum::<Decimal>(), dec!(0.1));
        assert_eq!(plan.interval, Duration::from_secs(75));
    }

    #[test]
    fn test_last_slice_absorbs_remainder() {
        let plan = TwapScheduler::plan(&request(dec!(0.0107), 3, 60), &filters()).unwrap();
        assert_eq!(plan.total_quantity, dec!(0.01));
        assert_eq!(
            plan.slice_quantities,
            vec![dec!(0.003), dec!(0.003), dec!(0.004)]
        );
    }

    #[test]
    fn test_single_slice_has_no_wait() {
        let plan = TwapScheduler::plan(&request(dec!(0.5), 1, 600), &filters()).unwrap();
        assert_eq!(plan.slice_quantities, vec![dec!(0.5)]);
        // One slice is released immediately; the interval is never slept
        assert_eq!(plan.interval, Duration::from_secs(600));
    }

    #[test]
    fn test_slice_below_step_is_rejected() {
        let err = TwapScheduler::plan(&request(dec!(0.002), 3, 60), &filters()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidQuantity { .. }));
    }

    #[test]
    fn test_zero_slices_is_rejected() {
        let err = TwapScheduler::plan(&request(dec!(1), 0, 60), &filters()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter(_)));
    }

    #[test]
    fn test_limit_price_is_rounded_to_tick() {
        let mut req = request(dec!(0.01), 2, 60);
        req.limit_price = Some(dec!(50000.04));
        let plan = TwapScheduler::plan(&req, &filters()).unwrap();
        assert_eq!(plan.limit_price, Some(dec!(50000)));
        assert_eq!(plan.request(dec!(0.005)).price, Some(dec!(50000)));
    }

    #[test]
    fn test_minutes_overflow_is_invalid() {
        assert_eq!(duration_from_minutes(10), Ok(Duration::from_secs(600)));
        let err = duration_from_minutes(u64::MAX).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter(_)));
    }
}
