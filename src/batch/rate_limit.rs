//! Rolling-window rate limiting
//!
//! Each request channel gets its own limiter enforcing "at most `calls`
//! invocations within the trailing `period`". Limiters are cheap to clone and
//! share one call-timestamp window across clones.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::{LookupError, LookupResult};
use crate::metrics::RateLimiterMetrics;

/// Request channel with an independent budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Single-place lookups
    Single,
    /// Bulk (batch) lookups
    Bulk,
}

impl Channel {
    /// Channel label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Single => "single",
            Channel::Bulk => "bulk",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour when the budget is used up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitMode {
    /// Wait until the window advances
    #[default]
    Block,
    /// Return [`LookupError::RateLimitExceeded`] immediately
    FailFast,
}

/// Rolling-window rate limiter for one channel
#[derive(Debug, Clone)]
pub struct RateLimiter {
    channel: Channel,
    calls: usize,
    period: Duration,
    mode: LimitMode,
    window: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a blocking limiter
    ///
    /// # Arguments
    /// * `channel` - Channel this limiter guards
    /// * `calls` - Maximum calls per window (at least 1)
    /// * `period` - Length of the rolling window
    pub fn new(channel: Channel, calls: usize, period: Duration) -> Self {
        let calls = calls.max(1);
        Self {
            channel,
            calls,
            period,
            mode: LimitMode::Block,
            window: Arc::new(Mutex::new(VecDeque::with_capacity(calls))),
        }
    }

    /// Switch between blocking and fail-fast behaviour
    pub fn with_mode(mut self, mode: LimitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Channel this limiter guards
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Maximum calls per window
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Length of the rolling window
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Configured limit mode
    pub fn mode(&self) -> LimitMode {
        self.mode
    }

    /// Acquire budget for one call
    ///
    /// In [`LimitMode::Block`] this suspends until the call fits in the window
    /// and never fails. In [`LimitMode::FailFast`] it returns
    /// [`LookupError::RateLimitExceeded`] when the window is full.
    pub async fn acquire(&self) -> LookupResult<()> {
        match self.mode {
            LimitMode::Block => {
                self.acquire_blocking().await;
                Ok(())
            }
            LimitMode::FailFast => self.try_acquire().await,
        }
    }

    /// Acquire budget for one call without waiting
    pub async fn try_acquire(&self) -> LookupResult<()> {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        prune(&mut window, now, self.period);

        if window.len() < self.calls {
            window.push_back(now);
            Ok(())
        } else {
            debug!(channel = %self.channel, calls = self.calls, "Rate limit window full");
            Err(LookupError::RateLimitExceeded { channel: self.channel })
        }
    }

    /// Number of calls recorded inside the current window
    pub async fn used(&self) -> usize {
        let mut window = self.window.lock().await;
        prune(&mut window, Instant::now(), self.period);
        window.len()
    }

    async fn acquire_blocking(&self) {
        let mut metrics = RateLimiterMetrics::new(self.channel);
        metrics.start_acquire();

        // The lock is held while sleeping so later callers queue FIFO behind us.
        let mut window = self.window.lock().await;
        loop {
            let now = Instant::now();
            prune(&mut window, now, self.period);

            if window.len() < self.calls {
                window.push_back(now);
                break;
            }

            // Window is full, so it is non-empty.
            let Some(&oldest) = window.front() else { continue };
            let ready_at = oldest + self.period;
            debug!(
                channel = %self.channel,
                wait_ms = ready_at.saturating_duration_since(now).as_millis(),
                "Waiting for rate limit window"
            );
            sleep_until(ready_at).await;
        }
        let used = window.len();
        drop(window);

        metrics.record_acquired();
        metrics.update_available_permits(self.calls.saturating_sub(used));
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&oldest) = window.front() {
        if now.saturating_duration_since(oldest) >= period {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// The per-channel limiters owned by one client
#[derive(Debug, Clone)]
pub struct RateLimits {
    single: RateLimiter,
    bulk: RateLimiter,
}

impl RateLimits {
    /// Bundle a single-channel and a bulk-channel limiter
    pub fn new(single: RateLimiter, bulk: RateLimiter) -> Self {
        Self { single, bulk }
    }

    /// Limiter guarding `channel`
    pub fn for_channel(&self, channel: Channel) -> &RateLimiter {
        match channel {
            Channel::Single => &self.single,
            Channel::Bulk => &self.bulk,
        }
    }

    /// Acquire budget for one call on `channel`
    pub async fn acquire(&self, channel: Channel) -> LookupResult<()> {
        self.for_channel(channel).acquire().await
    }
}
