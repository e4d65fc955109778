//! Fibonacci backoff and retry

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{Channel, LookupError, LookupResult};
use crate::metrics::record_retry_backoff;
use crate::report::CallReporter;
use crate::transport::retry_formatter::RetryContext;

/// Backoff delay before retry number `attempt` (1-based): `fib(attempt) * unit`
///
/// The sequence is 1, 1, 2, 3, 5, 8, ... units and saturates instead of
/// overflowing.
pub fn fibonacci_delay(attempt: u32, unit: Duration) -> Duration {
    let (mut prev, mut current) = (0u64, 1u64);
    for _ in 1..attempt.max(1) {
        let next = prev.saturating_add(current);
        prev = current;
        current = next;
    }
    let factor = u32::try_from(current).unwrap_or(u32::MAX);
    unit.saturating_mul(factor)
}

/// Retries an operation on rate-limit and transient failures
#[derive(Debug, Clone)]
pub struct BackoffRetrier {
    channel: Channel,
    max_tries: u32,
    unit: Duration,
    max_delay: Option<Duration>,
}

impl BackoffRetrier {
    /// Create a retrier for `channel` allowing `max_tries` total attempts (at least 1)
    pub fn new(channel: Channel, max_tries: u32, unit: Duration) -> Self {
        Self {
            channel,
            max_tries: max_tries.max(1),
            unit,
            max_delay: None,
        }
    }

    /// Cap every individual backoff sleep
    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total attempts allowed per logical call
    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Delay slept after failed attempt number `attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = fibonacci_delay(attempt, self.unit);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `op` until it succeeds, fails non-retryably, or runs out of attempts
    ///
    /// # Errors
    /// Non-retryable failures are returned as-is on the attempt that produced
    /// them. After `max_tries` consecutive retryable failures the last one is
    /// wrapped in [`LookupError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, reporter: &CallReporter, mut op: F) -> LookupResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LookupResult<T>>,
    {
        let mut attempt = 1;
        let mut last_context: Option<RetryContext> = None;

        loop {
            match op().await {
                Ok(value) => {
                    if let Some(mut ctx) = last_context.take() {
                        ctx.attempt = attempt;
                        reporter.info(&ctx.format_success());
                    }
                    debug!(channel = %self.channel, attempt, "Request succeeded");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_tries {
                        let ctx =
                            RetryContext::new(attempt, self.max_tries, Duration::ZERO, self.channel, &err);
                        reporter.error(&ctx.format_failure());
                        return Err(LookupError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let delay = self.backoff_delay(attempt);
                    let ctx = RetryContext::new(attempt, self.max_tries, delay, self.channel, &err);
                    warn!(
                        channel = %self.channel,
                        attempt,
                        max_tries = self.max_tries,
                        backoff_ms = delay.as_millis(),
                        error = %err,
                        "Retryable lookup failure"
                    );
                    reporter.info(&ctx.format_retry());
                    record_retry_backoff(self.channel, delay, attempt);
                    last_context = Some(ctx);

                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
