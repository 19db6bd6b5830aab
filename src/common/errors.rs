//! Error types for the application
//!
//! Three families, matching how far a failure propagates:
//!
//! - [`ValidationError`]: local input problems, raised before any network call
//!   and never retried.
//! - [`ExchangeError`]: failures reported by (or on the way to) the exchange.
//!   Transient kinds are retried with backoff; the rest are terminal for the
//!   operation that raised them.
//! - [`OrchestrationError`]: terminal failures of a whole strategy run.

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::OrderStatus;

/// Result type alias using our StrategyError
pub type Result<T> = std::result::Result<T, StrategyError>;

/// Result type for exchange adapter calls
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Input rejected by the quantization and validation layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Quantity rounded down to the step size is not positive
    #[error("Invalid quantity: {requested} rounds to {rounded} with step size {step_size}")]
    InvalidQuantity {
        requested: Decimal,
        rounded: Decimal,
        step_size: Decimal,
    },

    /// Price rounded to the tick size is not positive
    #[error("Invalid price: {requested} rounds to {rounded} with tick size {tick_size}")]
    InvalidPrice {
        requested: Decimal,
        rounded: Decimal,
        tick_size: Decimal,
    },

    /// price * quantity is below the exchange minimum
    #[error("Notional {notional} below minimum {min_notional}")]
    NotionalTooSmall {
        notional: Decimal,
        min_notional: Decimal,
    },

    /// Quantity outside the LOT_SIZE bounds
    #[error("Quantity {quantity} outside allowed range [{min}, {max}]")]
    QuantityOutOfRange {
        quantity: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Price outside the PRICE_FILTER bounds
    #[error("Price {price} outside allowed range [{min}, {max}]")]
    PriceOutOfRange {
        price: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Symbol filters that cannot be used for rounding
    #[error("Invalid symbol filters: {0}")]
    InvalidFilters(String),

    /// Take-profit and stop-loss on the wrong sides for the entry
    #[error("Invalid bracket: {0}")]
    InvalidBracket(String),

    /// Strategy parameter out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Failure reported by an exchange adapter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded, retry after {retry_after_ms:?} ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Exchange-side 5xx or equivalent
    #[error("Exchange server error: {0}")]
    ServerError(String),

    /// Order or request refused by the exchange
    #[error("Rejected by exchange ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// Order already filled or canceled, so it cannot be canceled
    #[error("Order already resolved: {0}")]
    AlreadyResolved(String),

    /// Symbol or order unknown to the exchange
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Whether the call may succeed if simply repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_)
                | ExchangeError::Timeout(_)
                | ExchangeError::RateLimited { .. }
                | ExchangeError::ServerError(_)
        )
    }

    /// Server-suggested wait before retrying, if any
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ExchangeError::Network(err.to_string())
        } else if err.is_decode() {
            ExchangeError::InvalidResponse(err.to_string())
        } else {
            ExchangeError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::InvalidResponse(err.to_string())
    }
}

/// Terminal failure of a strategy run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    /// LIMIT entry did not fill within the polling budget
    #[error("Entry order {order_id} not filled after {attempts} polls")]
    EntryTimeout { order_id: String, attempts: u32 },

    /// Entry order ended without filling
    #[error("Entry order {order_id} ended as {status}")]
    EntryRejected {
        order_id: String,
        status: OrderStatus,
    },

    /// One of the bracket legs could not be placed
    #[error("Bracket placement failed: {reason}")]
    BracketPlacementFailed { reason: String },

    /// A sibling order could not be canceled
    #[error("Failed to cancel order {order_id}: {reason}")]
    CompensationFailed { order_id: String, reason: String },

    /// A bracket ended without filling; the other was canceled
    #[error("Bracket order {order_id} ended as {status} without filling")]
    BracketClosed {
        order_id: String,
        status: OrderStatus,
    },

    /// Neither bracket filled within the polling budget
    #[error(
        "No bracket filled after {attempts} polls (take-profit {take_profit_id}, stop-loss {stop_loss_id} left working)"
    )]
    MonitorTimeout {
        take_profit_id: String,
        stop_loss_id: String,
        attempts: u32,
    },

    /// Stopped by the caller
    #[error("Stopped before completion")]
    Stopped,
}

/// Any failure a strategy operation can surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}
