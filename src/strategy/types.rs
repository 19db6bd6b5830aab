use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::common::errors::ExchangeResult;
use crate::common::traits::SharedExchange;
use crate::common::types::{new_client_order_id, OrderHandle, OrderRequest, SymbolFilters};
use crate::config::StrategySettings;
use crate::strategy::poll::{PollSchedule, StopSignal};
use crate::strategy::retry::{with_retry, RetryPolicy};

/// What a batch strategy does when one child order fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the failure and keep going
    #[default]
    ContinueOnError,
    /// Stop releasing further child orders after the first failure
    AbortOnFirstFailure,
}

/// Overall result of a strategy run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Every attempted item succeeded
    Success,
    /// Some items succeeded, some failed
    PartialSuccess { succeeded: usize, failed: usize },
    /// Nothing succeeded
    Failure,
}

impl Outcome {
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => Outcome::Success,
            (0, _) => Outcome::Failure,
            (succeeded, failed) => Outcome::PartialSuccess { succeeded, failed },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::PartialSuccess { succeeded, failed } => {
                write!(f, "partial success ({} ok, {} failed)", succeeded, failed)
            }
            Outcome::Failure => write!(f, "failure"),
        }
    }
}

/// Shared handles and budgets every strategy runs with
///
/// Cloning is cheap; the adapter is shared, the budgets are copied.
#[derive(Clone)]
pub struct StrategyContext {
    /// Exchange adapter (live or simulated)
    pub exchange: SharedExchange,
    /// Retry policy for transient adapter errors
    pub retry: RetryPolicy,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Budget while waiting for a LIMIT entry
    pub entry_max_polls: u32,
    /// Budget while waiting for a bracket fill
    pub bracket_max_polls: u32,
    /// Cooperative stop flag
    pub stop: StopSignal,
}

impl StrategyContext {
    pub fn new(exchange: SharedExchange, settings: &StrategySettings) -> Self {
        Self {
            exchange,
            retry: RetryPolicy::from(&settings.retry),
            poll_interval: settings.poll_interval(),
            entry_max_polls: settings.entry_max_polls,
            bracket_max_polls: settings.bracket_max_polls,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn entry_schedule(&self) -> PollSchedule {
        PollSchedule::new(self.poll_interval, self.entry_max_polls)
    }

    pub fn bracket_schedule(&self) -> PollSchedule {
        PollSchedule::new(self.poll_interval, self.bracket_max_polls)
    }

    /// Fetch symbol filters, retrying transient failures
    pub async fn filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        with_retry(&self.retry, "get_symbol_filters", || {
            self.exchange.get_symbol_filters(symbol)
        })
        .await
    }

    /// Current reference (mark) price, retrying transient failures
    pub async fn reference_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        with_retry(&self.retry, "get_reference_price", || {
            self.exchange.get_reference_price(symbol)
        })
        .await
    }

    /// Submit an order, retrying transient failures
    ///
    /// Every attempt carries the same client order id. A timeout or dropped
    /// connection can hide an accepted order, so each retry first looks the
    /// id up and returns the existing order instead of placing a second one.
    pub async fn submit(&self, request: &OrderRequest) -> ExchangeResult<OrderHandle> {
        let client_order_id = request
            .client_order_id
            .clone()
            .unwrap_or_else(new_client_order_id);
        let request = &request.clone().with_client_order_id(client_order_id.clone());
        let client_order_id = client_order_id.as_str();
        let exchange = &self.exchange;
        let attempts = &AtomicU32::new(0);

        let handle = with_retry(&self.retry, "submit_order", || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) > 0 {
                if let Some(existing) = exchange.find_order(&request.symbol, client_order_id).await? {
                    warn!(
                        "Order {} reached the exchange before the error, not resending",
                        client_order_id
                    );
                    return Ok(existing);
                }
            }
            exchange.submit_order(request).await
        })
        .await?;
        info!("Order placed on {}: {}", self.exchange.name(), handle);
        Ok(handle)
    }

    /// Refresh an order's status, retrying transient failures
    pub async fn refresh(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle> {
        let refreshed = with_retry(&self.retry, "get_order_status", || {
            self.exchange.get_order_status(handle)
        })
        .await?;
        debug!("Order #{} is {}", refreshed.order_id, refreshed.status);
        Ok(refreshed)
    }

    /// Cancel an order, retrying transient failures
    pub async fn cancel(&self, handle: &OrderHandle) -> ExchangeResult<OrderHandle> {
        let canceled = with_retry(&self.retry, "cancel_order", || {
            self.exchange.cancel_order(handle)
        })
        .await?;
        info!("Order #{} canceled", canceled.order_id);
        Ok(canceled)
    }
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("exchange", &self.exchange.name())
            .field("retry", &self.retry)
            .field("poll_interval", &self.poll_interval)
            .field("entry_max_polls", &self.entry_max_polls)
            .field("bracket_max_polls", &self.bracket_max_polls)
            .finish()
    }
}
