//! One-cancels-other bracket orders
//!
//! ```text
//! PENDING_ENTRY ──► ENTRY_FILLED ──► BRACKETS_PLACED ──┬─► TP_FILLED ──► DONE
//!       │                 │                 │          └─► SL_FILLED ──► DONE
//!       └─────────────────┴─────────────────┴──────────────► FAILED
//! ```
//!
//! The take-profit and stop-loss are only submitted once the entry is
//! filled. Whichever bracket fills first cancels the other.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::common::errors::{
    ExchangeError, OrchestrationError, Result, StrategyError, ValidationError,
};
use crate::common::types::{OrderHandle, OrderRequest, OrderStatus, OrderType, Side, SymbolFilters};
use crate::strategy::poll::{poll_until, PollOutcome};
use crate::strategy::quantize::{normalize, normalize_price};
use crate::strategy::types::StrategyContext;

/// How the position is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Market,
    Limit { price: Decimal },
}

/// Caller's description of a bracketed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcoRequest {
    pub symbol: String,
    /// Side of the entry; both brackets use the opposite side
    pub side: Side,
    pub quantity: Decimal,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
    pub entry: EntryKind,
}

/// Lifecycle of one OCO plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcoState {
    PendingEntry,
    EntryFilled,
    BracketsPlaced,
    TakeProfitFilled,
    StopLossFilled,
    Done,
    Failed,
}

/// Which bracket filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BracketLeg {
    TakeProfit,
    StopLoss,
}

impl std::fmt::Display for BracketLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BracketLeg::TakeProfit => write!(f, "take-profit"),
            BracketLeg::StopLoss => write!(f, "stop-loss"),
        }
    }
}

/// What happened to the bracket that did not fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiblingResolution {
    /// Our cancel went through
    Canceled,
    /// The exchange had already resolved it; carries its refreshed status
    AlreadyResolved(OrderStatus),
}

/// Normalized requests and the handles they produced
#[derive(Debug, Clone, PartialEq)]
pub struct OcoPlan {
    pub entry: OrderRequest,
    /// LIMIT, reduce-only
    pub take_profit: OrderRequest,
    /// STOP_MARKET, reduce-only
    pub stop_loss: OrderRequest,
    pub entry_handle: Option<OrderHandle>,
    pub take_profit_handle: Option<OrderHandle>,
    pub stop_loss_handle: Option<OrderHandle>,
    pub state: OcoState,
}

impl OcoPlan {
    /// Attach an entry order that was placed elsewhere
    ///
    /// Execution then skips submitting the entry; a handle that is already
    /// FILLED also skips the entry poll.
    pub fn with_entry_handle(mut self, handle: OrderHandle) -> Self {
        self.entry_handle = Some(handle);
        self
    }

    fn transition(&mut self, next: OcoState) {
        info!("OCO {} {:?} -> {:?}", self.entry.symbol, self.state, next);
        self.state = next;
    }
}

/// Final result of a completed OCO run
#[derive(Debug, Clone, PartialEq)]
pub struct OcoReport {
    pub entry: OrderHandle,
    pub take_profit: OrderHandle,
    pub stop_loss: OrderHandle,
    pub filled_leg: BracketLeg,
    pub sibling: SiblingResolution,
}

impl OcoReport {
    /// Handle of the bracket that filled
    pub fn filled(&self) -> &OrderHandle {
        match self.filled_leg {
            BracketLeg::TakeProfit => &self.take_profit,
            BracketLeg::StopLoss => &self.stop_loss,
        }
    }

    /// Handle of the bracket that did not
    pub fn sibling_handle(&self) -> &OrderHandle {
        match self.filled_leg {
            BracketLeg::TakeProfit => &self.stop_loss,
            BracketLeg::StopLoss => &self.take_profit,
        }
    }
}

/// Drives an [`OcoPlan`] from entry to one filled bracket
#[derive(Debug, Clone)]
pub struct OcoWatcher {
    ctx: StrategyContext,
}

impl OcoWatcher {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }

    /// Validate and normalize a request into a plan; no I/O
    pub fn plan(
        &self,
        request: &OcoRequest,
        filters: &SymbolFilters,
    ) -> std::result::Result<OcoPlan, ValidationError> {
        let entry_price = match request.entry {
            EntryKind::Market => None,
            EntryKind::Limit { price } => Some(price),
        };
        let entry_params = normalize(entry_price, request.quantity, filters)?;
        let quantity = entry_params.quantity;

        let take_profit = normalize(Some(request.take_profit_price), quantity, filters)?
            .price
            .unwrap_or(request.take_profit_price);
        let stop_loss = normalize_price(request.stop_loss_price, filters)?;

        check_bracket(request.side, entry_params.price, take_profit, stop_loss)?;

        let exit = request.side.opposite();
        let entry = match entry_params.price {
            Some(price) => OrderRequest::limit(&request.symbol, request.side, quantity, price),
            None => OrderRequest::market(&request.symbol, request.side, quantity),
        };

        Ok(OcoPlan {
            entry,
            take_profit: OrderRequest::limit(&request.symbol, exit, quantity, take_profit)
                .reduce_only(),
            stop_loss: OrderRequest::stop_market(&request.symbol, exit, quantity, stop_loss)
                .reduce_only(),
            entry_handle: None,
            take_profit_handle: None,
            stop_loss_handle: None,
            state: OcoState::PendingEntry,
        })
    }

    /// Fetch filters, plan, and execute
    #[instrument(skip(self), fields(symbol = %request.symbol))]
    pub async fn run(&self, request: &OcoRequest) -> Result<OcoReport> {
        let filters = self.ctx.filters(&request.symbol).await?;
        let plan = self.plan(request, &filters)?;
        self.execute(plan).await
    }

    /// Execute a prepared plan
    pub async fn execute(&self, mut plan: OcoPlan) -> Result<OcoReport> {
        match self.drive(&mut plan).await {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!("OCO {} failed in {:?}: {}", plan.entry.symbol, plan.state, err);
                plan.transition(OcoState::Failed);
                Err(err)
            }
        }
    }

    async fn drive(&self, plan: &mut OcoPlan) -> Result<OcoReport> {
        let submitted = match plan.entry_handle.take() {
            Some(handle) => handle,
            None => self.ctx.submit(&plan.entry).await?,
        };
        let entry = self.await_entry(plan.entry.order_type, submitted).await?;
        plan.entry_handle = Some(entry.clone());
        plan.transition(OcoState::EntryFilled);

        let (take_profit, stop_loss) = self.place_brackets(plan).await?;
        plan.take_profit_handle = Some(take_profit.clone());
        plan.stop_loss_handle = Some(stop_loss.clone());
        plan.transition(OcoState::BracketsPlaced);

        let (filled_leg, filled) = self.monitor(&take_profit, &stop_loss).await?;
        plan.transition(match filled_leg {
            BracketLeg::TakeProfit => OcoState::TakeProfitFilled,
            BracketLeg::StopLoss => OcoState::StopLossFilled,
        });

        let sibling = match filled_leg {
            BracketLeg::TakeProfit => &stop_loss,
            BracketLeg::StopLoss => &take_profit,
        };
        let (sibling_handle, resolution) = self.cancel_sibling(sibling).await?;

        let (take_profit, stop_loss) = match filled_leg {
            BracketLeg::TakeProfit => (filled, sibling_handle),
            BracketLeg::StopLoss => (sibling_handle, filled),
        };
        plan.take_profit_handle = Some(take_profit.clone());
        plan.stop_loss_handle = Some(stop_loss.clone());
        plan.transition(OcoState::Done);

        Ok(OcoReport {
            entry,
            take_profit,
            stop_loss,
            filled_leg,
            sibling: resolution,
        })
    }

    /// Wait for the entry to fill
    async fn await_entry(&self, order_type: OrderType, handle: OrderHandle) -> Result<OrderHandle> {
        if handle.is_filled() {
            info!("Entry #{} already filled, skipping entry poll", handle.order_id);
            return Ok(handle);
        }
        if handle.status.is_dead() {
            return Err(entry_rejected(&handle));
        }

        if order_type == OrderType::Market {
            // Acceptance is the fill trigger; one poll confirms it did not die
            let confirmed = self.ctx.refresh(&handle).await?;
            if confirmed.status.is_dead() {
                return Err(entry_rejected(&confirmed));
            }
            if !confirmed.is_filled() {
                warn!(
                    "Market entry #{} reports {}, treating as filled",
                    confirmed.order_id, confirmed.status
                );
            }
            return Ok(confirmed);
        }

        let ctx = &self.ctx;
        let entry = &handle;
        let schedule = ctx.entry_schedule();
        let outcome = poll_until(&schedule, &ctx.stop, |_| async move {
            let refreshed = ctx.refresh(entry).await?;
            Ok::<_, ExchangeError>(match refreshed.status {
                OrderStatus::Filled => Some(Ok(refreshed)),
                status if status.is_dead() => Some(Err(refreshed)),
                _ => None,
            })
        })
        .await?;

        match outcome {
            PollOutcome::Ready(Ok(filled)) => Ok(filled),
            PollOutcome::Ready(Err(dead)) => Err(entry_rejected(&dead)),
            PollOutcome::TimedOut { attempts } => {
                // Leave nothing resting without brackets
                match ctx.cancel(&handle).await {
                    Ok(_) => Err(entry_timeout(&handle, attempts)),
                    // Filled or closed between the last poll and the cancel
                    Err(ExchangeError::AlreadyResolved(reason)) => {
                        let current = ctx.refresh(&handle).await?;
                        if current.is_filled() {
                            warn!(
                                "Entry #{} filled as it was being canceled ({}), placing brackets",
                                current.order_id, reason
                            );
                            Ok(current)
                        } else if current.status.is_dead() {
                            Err(entry_rejected(&current))
                        } else {
                            Err(entry_timeout(&current, attempts))
                        }
                    }
                    Err(err) => {
                        warn!("Could not cancel unfilled entry #{}: {}", handle.order_id, err);
                        Err(entry_timeout(&handle, attempts))
                    }
                }
            }
            PollOutcome::Stopped => Err(OrchestrationError::Stopped.into()),
        }
    }

    /// Submit both brackets concurrently; both or neither
    async fn place_brackets(&self, plan: &OcoPlan) -> Result<(OrderHandle, OrderHandle)> {
        let (take_profit, stop_loss) = tokio::join!(
            self.ctx.submit(&plan.take_profit),
            self.ctx.submit(&plan.stop_loss)
        );

        let (placed, failed_leg, err) = match (take_profit, stop_loss) {
            (Ok(tp), Ok(sl)) => return Ok((tp, sl)),
            (Err(tp_err), Err(sl_err)) => {
                return Err(OrchestrationError::BracketPlacementFailed {
                    reason: format!("take-profit: {}; stop-loss: {}", tp_err, sl_err),
                }
                .into());
            }
            (Ok(tp), Err(err)) => (tp, BracketLeg::StopLoss, err),
            (Err(err), Ok(sl)) => (sl, BracketLeg::TakeProfit, err),
        };

        warn!(
            "{} placement failed ({}), canceling #{}",
            failed_leg, err, placed.order_id
        );
        match self.ctx.cancel(&placed).await {
            Ok(_) | Err(ExchangeError::AlreadyResolved(_)) => {
                Err(OrchestrationError::BracketPlacementFailed {
                    reason: format!("{}: {}", failed_leg, err),
                }
                .into())
            }
            Err(cancel_err) => Err(OrchestrationError::CompensationFailed {
                order_id: placed.order_id,
                reason: format!(
                    "{} placement failed ({}) and cancel failed: {}",
                    failed_leg, err, cancel_err
                ),
            }
            .into()),
        }
    }

    /// Poll both brackets until one fills or one ends without filling
    async fn monitor(
        &self,
        take_profit: &OrderHandle,
        stop_loss: &OrderHandle,
    ) -> Result<(BracketLeg, OrderHandle)> {
        let ctx = &self.ctx;
        let schedule = ctx.bracket_schedule();
        let outcome = poll_until(&schedule, &ctx.stop, |_| async move {
            let tp = ctx.refresh(take_profit).await?;
            if tp.is_filled() {
                return Ok(Some(Ok((BracketLeg::TakeProfit, tp))));
            }
            let sl = ctx.refresh(stop_loss).await?;
            if sl.is_filled() {
                return Ok(Some(Ok((BracketLeg::StopLoss, sl))));
            }
            if tp.status.is_dead() {
                return Ok(Some(Err((tp, BracketLeg::StopLoss, stop_loss))));
            }
            if sl.status.is_dead() {
                return Ok(Some(Err((sl, BracketLeg::TakeProfit, take_profit))));
            }
            Ok::<_, ExchangeError>(None)
        })
        .await?;

        match outcome {
            PollOutcome::Ready(Ok((leg, filled))) => {
                info!("{} #{} filled", leg, filled.order_id);
                Ok((leg, filled))
            }
            PollOutcome::Ready(Err((dead, survivor_leg, survivor))) => {
                self.close_survivor(&dead, survivor_leg, survivor).await
            }
            PollOutcome::TimedOut { attempts } => Err(OrchestrationError::MonitorTimeout {
                take_profit_id: take_profit.order_id.clone(),
                stop_loss_id: stop_loss.order_id.clone(),
                attempts,
            }
            .into()),
            PollOutcome::Stopped => {
                warn!(
                    "Stopped while monitoring; #{} and #{} left working",
                    take_profit.order_id, stop_loss.order_id
                );
                Err(OrchestrationError::Stopped.into())
            }
        }
    }

    /// One bracket ended without filling: cancel the other one
    ///
    /// Succeeds only if the survivor turns out to have filled before the
    /// cancel reached it.
    async fn close_survivor(
        &self,
        dead: &OrderHandle,
        survivor_leg: BracketLeg,
        survivor: &OrderHandle,
    ) -> Result<(BracketLeg, OrderHandle)> {
        warn!(
            "Bracket #{} ended as {}, canceling {} #{}",
            dead.order_id, dead.status, survivor_leg, survivor.order_id
        );
        let closed = || -> StrategyError {
            OrchestrationError::BracketClosed {
                order_id: dead.order_id.clone(),
                status: dead.status,
            }
            .into()
        };

        match self.ctx.cancel(survivor).await {
            Ok(_) => Err(closed()),
            Err(ExchangeError::AlreadyResolved(_)) => {
                let current = self.ctx.refresh(survivor).await?;
                if current.is_filled() {
                    info!("{} #{} filled before the cancel", survivor_leg, current.order_id);
                    Ok((survivor_leg, current))
                } else {
                    Err(closed())
                }
            }
            Err(err) => Err(OrchestrationError::CompensationFailed {
                order_id: survivor.order_id.clone(),
                reason: format!(
                    "bracket #{} ended as {} and cancel failed: {}",
                    dead.order_id, dead.status, err
                ),
            }
            .into()),
        }
    }

    /// Cancel the bracket that did not fill
    async fn cancel_sibling(&self, sibling: &OrderHandle) -> Result<(OrderHandle, SiblingResolution)> {
        match self.ctx.cancel(sibling).await {
            Ok(canceled) => Ok((canceled, SiblingResolution::Canceled)),
            Err(ExchangeError::AlreadyResolved(reason)) => {
                let refreshed = match self.ctx.refresh(sibling).await {
                    Ok(handle) => handle,
                    Err(err) => {
                        warn!("Could not refresh #{} after race: {}", sibling.order_id, err);
                        sibling.clone()
                    }
                };
                if refreshed.is_filled() {
                    warn!(
                        "Both brackets filled: #{} resolved before cancel ({})",
                        refreshed.order_id, reason
                    );
                } else {
                    warn!(
                        "Cancel raced with exchange for #{}: {} (now {})",
                        refreshed.order_id, reason, refreshed.status
                    );
                }
                let status = refreshed.status;
                Ok((refreshed, SiblingResolution::AlreadyResolved(status)))
            }
            Err(err) => Err(OrchestrationError::CompensationFailed {
                order_id: sibling.order_id.clone(),
                reason: err.to_string(),
            }
            .into()),
        }
    }
}

fn entry_timeout(handle: &OrderHandle, attempts: u32) -> StrategyError {
    OrchestrationError::EntryTimeout {
        order_id: handle.order_id.clone(),
        attempts,
    }
    .into()
}

fn entry_rejected(handle: &OrderHandle) -> StrategyError {
    OrchestrationError::EntryRejected {
        order_id: handle.order_id.clone(),
        status: handle.status,
    }
    .into()
}

/// Take-profit must sit on the profitable side of the stop-loss (and of the
/// entry price, when known)
fn check_bracket(
    side: Side,
    entry_price: Option<Decimal>,
    take_profit: Decimal,
    stop_loss: Decimal,
) -> std::result::Result<(), ValidationError> {
    let valid = match (side, entry_price) {
        (Side::Buy, Some(entry)) => stop_loss < entry && entry < take_profit,
        (Side::Buy, None) => stop_loss < take_profit,
        (Side::Sell, Some(entry)) => take_profit < entry && entry < stop_loss,
        (Side::Sell, None) => take_profit < stop_loss,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidBracket(format!(
            "{} entry at {} needs take-profit {} and stop-loss {} on opposite sides",
            side,
            entry_price.map_or_else(|| "market".to_string(), |p| p.to_string()),
            take_profit,
            stop_loss
        )))
    }
}
