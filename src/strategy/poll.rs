//! Poll-until-predicate primitive shared by every waiting strategy
//!
//! Each loop is bounded by a [`PollSchedule`] (attempts × interval) and can
//! be interrupted through a [`StopSignal`]; nothing waits forever.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::common::errors::ExchangeResult;

/// Cloneable stop flag observed by polling loops and the TWAP pacer
#[derive(Debug, Clone)]
pub struct StopSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Ask every holder of this signal to stop at its next suspension point
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`stop`](Self::stop) has been called
    pub async fn stopped(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns on stop
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration`; returns false if stopped first
    pub async fn sleep(&self, duration: Duration) -> bool {
        self.sleep_until(tokio::time::Instant::now() + duration).await
    }

    /// Sleep until `deadline`; returns false if stopped first
    pub async fn sleep_until(&self, deadline: tokio::time::Instant) -> bool {
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => true,
            _ = self.stopped() => false,
        }
    }
}

/// Bounded polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay between consecutive checks
    pub interval: Duration,
    /// Total checks allowed (at least 1)
    pub max_attempts: u32,
}

impl PollSchedule {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Upper bound on the time spent sleeping between checks
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The check produced a value
    Ready(T),
    /// Attempts exhausted without a value
    TimedOut { attempts: u32 },
    /// The stop signal fired
    Stopped,
}

/// Check immediately, then every `schedule.interval`, until `check` yields
/// `Some`, the attempts run out, or `stop` fires
///
/// The check receives the 1-based attempt number. A check error ends the
/// loop; checks should apply their own retry policy.
pub async fn poll_until<T, F, Fut>(
    schedule: &PollSchedule,
    stop: &StopSignal,
    mut check: F,
) -> ExchangeResult<PollOutcome<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ExchangeResult<Option<T>>>,
{
    for attempt in 1..=schedule.max_attempts {
        if stop.is_stopped() {
            return Ok(PollOutcome::Stopped);
        }

        if let Some(value) = check(attempt).await? {
            return Ok(PollOutcome::Ready(value));
        }

        debug!("poll {}/{} not ready", attempt, schedule.max_attempts);

        if attempt < schedule.max_attempts && !stop.sleep(schedule.interval).await {
            return Ok(PollOutcome::Stopped);
        }
    }

    Ok(PollOutcome::TimedOut {
        attempts: schedule.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ExchangeError;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_check() {
        let schedule = PollSchedule::new(Duration::from_secs(2), 10);
        let start = Instant::now();

        let outcome = assert_ok!(
            poll_until(&schedule, &StopSignal::new(), |attempt| async move {
                Ok((attempt == 3).then_some(attempt))
            })
            .await
        );

        assert_eq!(outcome, PollOutcome::Ready(3));
        // Two sleeps between three checks
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_budget() {
        let schedule = PollSchedule::new(Duration::from_secs(1), 5);
        let start = Instant::now();

        let outcome: PollOutcome<()> =
            poll_until(&schedule, &StopSignal::new(), |_| async { Ok(None) })
                .await
                .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 5 });
        assert_eq!(start.elapsed(), schedule.budget());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_ends_loop() {
        let schedule = PollSchedule::new(Duration::from_secs(1), 5);
        let result: ExchangeResult<PollOutcome<()>> =
            poll_until(&schedule, &StopSignal::new(), |_| async {
                Err(ExchangeError::NotFound("order".into()))
            })
            .await;

        let err = assert_err!(result);
        assert!(matches!(err, ExchangeError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_wait() {
        let schedule = PollSchedule::new(Duration::from_secs(60), 100);
        let stop = StopSignal::new();

        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(90)).await;
            stopper.stop();
        });

        let start = Instant::now();
        let outcome: PollOutcome<()> = poll_until(&schedule, &stop, |_| async { Ok(None) })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Stopped);
        assert!(start.elapsed() < Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_already_stopped_signal_skips_sleep() {
        let stop = StopSignal::new();
        stop.stop();
        assert!(stop.is_stopped());
        assert!(!stop.sleep(Duration::from_secs(3600)).await);
    }
}
