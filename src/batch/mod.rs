//! Batch orchestration: rate limiting, retry, scheduling and aggregation
//!
//! This module is the engine behind [`crate::PlacekeyClient::lookup_placekeys`].
//!
//! # Overview
//!
//! A bulk lookup flows through four components:
//!
//! 1. **Scheduling**: [`scheduler::BatchScheduler`] validates the input, assigns
//!    default correlation ids and partitions it into chunks
//! 2. **Rate Limiting**: every request waits on a per-channel [`rate_limit::RateLimiter`]
//! 3. **Retry**: [`retry::BackoffRetrier`] retries rate-limited and transient failures
//!    with Fibonacci backoff
//! 4. **Aggregation**: [`aggregator::ResultAggregator`] merges chunk outcomes in input
//!    order and decides when a run must stop
//!
//! Requests themselves are performed by a [`crate::transport::RequestExecutor`].
//!
//! # Error Handling
//!
//! All operations return `Result<T, LookupError>`. Errors are categorized by type:
//! - Validation errors (raised before any request, never retried)
//! - Rate limit and transient service errors (retried with backoff)
//! - Exhausted retries and fatal service errors (stop the run, keep partial results)

pub mod aggregator;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;

pub use aggregator::{AggregateStep, ResultAggregator};
pub use rate_limit::{Channel, LimitMode, RateLimiter, RateLimits};
pub use retry::{fibonacci_delay, BackoffRetrier};
pub use scheduler::{BatchOptions, BatchScheduler, Chunk};

/// Lookup errors
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Malformed input, rejected before any network call
    #[error("validation error: {0}")]
    Validation(String),

    /// Request budget exhausted for a channel (HTTP 429 or fail-fast limiter)
    #[error("rate limit exceeded on {channel} channel")]
    RateLimitExceeded {
        /// Channel whose budget was exceeded
        channel: Channel,
    },

    /// Service temporarily unavailable (503, 504, timeout, connection failure)
    #[error("transient service error: {0}")]
    TransientService(String),

    /// Retry budget used up on retryable failures
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of calls attempted
        attempts: u32,
        /// The failure of the final attempt
        last: Box<LookupError>,
    },

    /// Whole-request failure that retrying cannot fix
    #[error("fatal service error: {0}")]
    FatalService(String),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LookupError {
    /// Whether the failure should trigger a backoff-and-retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LookupError::RateLimitExceeded { .. } | LookupError::TransientService(_)
        )
    }
}

/// Result type for lookup operations
pub type LookupResult<T> = Result<T, LookupError>;
