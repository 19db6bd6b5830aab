//! Bounded retry with exponential backoff for adapter calls
//!
//! | Retried | Not retried |
//! |---------|-------------|
//! | Network failures | Rejections |
//! | Timeouts | Already-resolved cancels |
//! | Rate limits (honoring the server's hint) | Unknown symbol/order |
//! | Exchange 5xx | Authentication |

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::common::errors::ExchangeResult;
use crate::config::RetrySettings;

/// How many times, and how patiently, to repeat a transient failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call (at least 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            multiplier: settings.multiplier.max(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Backoff before retry number `retry` (0-based), capped at `max_backoff`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `call` until it succeeds, fails terminally, or attempts run out
///
/// Only errors with [`is_transient`](crate::common::errors::ExchangeError::is_transient)
/// are retried; the last error is returned once the budget is spent.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt - 1);
                let delay = err
                    .retry_after_ms()
                    .map(|ms| Duration::from_millis(ms).min(policy.max_backoff).max(backoff))
                    .unwrap_or(backoff);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    operation, attempt, policy.max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
