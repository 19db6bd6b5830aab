//! Strategy module for order orchestration
//!
//! Everything above raw order placement: rounding inputs to the exchange's
//! filters, pacing and polling, and keeping linked orders consistent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    STRATEGIES                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  OrderPlacer     single market / limit / stop-limit orders  │
//! │  OcoWatcher      entry → TP + SL → cancel the loser         │
//! │  TwapScheduler   N slices released at fixed intervals       │
//! │  GridPlacer      ladder of limits, re-placed as levels fill  │
//! └─────────────────────────────────────────────────────────────┘
//!        │ normalize()             │ submit / refresh / cancel
//!        ▼                         ▼
//! ┌──────────────────┐   ┌──────────────────────────────────────┐
//! │  quantize        │   │  StrategyContext                     │
//! │  (pure, no I/O)  │   │    - with_retry() on transient errors│
//! └──────────────────┘   │    - poll_until() with StopSignal    │
//!                        │    - SharedExchange (live or dry-run)│
//!                        └──────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`normalize`]: Round and validate a price/quantity pair
//! - [`StrategyContext`]: Adapter, retry policy, polling budgets, stop signal
//! - [`poll_until`]: Bounded, cancellable poll loop
//! - [`OcoWatcher`], [`TwapScheduler`], [`GridPlacer`]: Composite strategies
//! - [`FailurePolicy`]: Continue or abort when a child order fails
//!
//! # Example
//!
//! ```ignore
//! let ctx = StrategyContext::new(exchange, &config.strategy);
//! let twap = TwapScheduler::new(ctx, FailurePolicy::ContinueOnError);
//!
//! let report = twap
//!     .run(&TwapRequest {
//!         symbol: "BTCUSDT".into(),
//!         side: Side::Buy,
//!         total_quantity: dec!(0.1),
//!         num_slices: 5,
//!         duration: Duration::from_secs(600),
//!         limit_price: None,
//!     })
//!     .await?;
//!
//! println!("{}", report.outcome());
//! ```

mod grid;
mod oco;
mod orders;
mod poll;
mod quantize;
mod retry;
mod twap;
mod types;

pub use quantize::{
    floor_to_step, normalize, normalize_price, normalize_quantity, round_to_tick,
    NormalizedOrderParams,
};

pub use retry::{with_retry, RetryPolicy};

pub use poll::{poll_until, PollOutcome, PollSchedule, StopSignal};

pub use types::{FailurePolicy, Outcome, StrategyContext};

pub use orders::OrderPlacer;

pub use oco::{
    BracketLeg, EntryKind, OcoPlan, OcoReport, OcoRequest, OcoState, OcoWatcher,
    SiblingResolution,
};

pub use twap::{
    duration_from_minutes, SliceResult, TwapPlan, TwapReport, TwapRequest, TwapScheduler,
};

pub use grid::{
    CancelResult, GridLevel, GridLevelResult, GridMaintenance, GridPlacer, GridPlan, GridReport,
    GridRequest, LevelOutcome, Replacement,
};
