//! Client configuration and service constants

use std::time::Duration;

use crate::batch::{LimitMode, LookupError, LookupResult};
use crate::transport::shared_resources::{HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS};

/// Single-lookup endpoint
pub const SINGLE_LOOKUP_URL: &str = "https://api.placekey.io/v1/placekey";

/// Bulk-lookup endpoint
pub const BULK_LOOKUP_URL: &str = "https://api.placekey.io/v1/placekeys";

/// Single-lookup calls allowed per rate limit window
pub const SINGLE_CALLS_PER_WINDOW: usize = 1000;

/// Bulk-lookup calls allowed per rate limit window
pub const BULK_CALLS_PER_WINDOW: usize = 10;

/// Rate limit window length in seconds, shared by both channels
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Most queries the service accepts in one bulk request
pub const MAX_BATCH_SIZE: usize = 100;

/// Total attempts per logical call before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Base unit of the Fibonacci backoff in milliseconds
pub const BACKOFF_UNIT_MS: u64 = 1000; // 1 second

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "PLACEKEY_API_KEY";

/// User agent product token
pub const USER_AGENT_PRODUCT: &str = "placekey-rs";

/// Settings of one [`crate::PlacekeyClient`]
///
/// # Examples
///
/// ```
/// use placekey_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("my-api-key")
///     .with_max_retries(5)
///     .with_backoff_unit(Duration::from_millis(250))
///     .with_user_agent_comment("nightly-import");
///
/// assert_eq!(config.max_retries, 5);
/// assert!(config.user_agent().ends_with(" nightly-import"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Value of the `apikey` header
    pub api_key: String,
    /// Single-lookup endpoint URL
    pub single_url: String,
    /// Bulk-lookup endpoint URL
    pub bulk_url: String,
    /// Single-lookup calls per window
    pub single_calls: usize,
    /// Bulk-lookup calls per window
    pub bulk_calls: usize,
    /// Rate limit window length
    pub rate_window: Duration,
    /// Whether an exhausted budget blocks or fails fast
    pub limit_mode: LimitMode,
    /// Total attempts per logical call
    pub max_retries: u32,
    /// Fibonacci backoff unit
    pub backoff_unit: Duration,
    /// Optional cap on each backoff sleep
    pub max_backoff: Option<Duration>,
    /// Largest accepted bulk batch size
    pub max_batch_size: usize,
    /// HTTP connect timeout
    pub connect_timeout: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Text appended to the `User-Agent` header
    pub user_agent_comment: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            single_url: SINGLE_LOOKUP_URL.to_string(),
            bulk_url: BULK_LOOKUP_URL.to_string(),
            single_calls: SINGLE_CALLS_PER_WINDOW,
            bulk_calls: BULK_CALLS_PER_WINDOW,
            rate_window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            limit_mode: LimitMode::Block,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_millis(BACKOFF_UNIT_MS),
            max_backoff: None,
            max_batch_size: MAX_BATCH_SIZE,
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
            user_agent_comment: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration for `api_key`
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Default configuration with the key read from `PLACEKEY_API_KEY`
    ///
    /// # Errors
    /// Returns [`LookupError::Configuration`] if the variable is unset or empty.
    pub fn from_env() -> LookupResult<Self> {
        Self::from_env_var(API_KEY_ENV)
    }

    fn from_env_var(name: &str) -> LookupResult<Self> {
        match std::env::var(name) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(LookupError::Configuration(format!(
                "API key not found, set {name}"
            ))),
        }
    }

    /// Point both channels at other endpoints (mock servers, staging)
    pub fn with_endpoints(mut self, single_url: impl Into<String>, bulk_url: impl Into<String>) -> Self {
        self.single_url = single_url.into();
        self.bulk_url = bulk_url.into();
        self
    }

    /// Override the per-window budgets
    pub fn with_rate_limits(mut self, single_calls: usize, bulk_calls: usize, window: Duration) -> Self {
        self.single_calls = single_calls;
        self.bulk_calls = bulk_calls;
        self.rate_window = window;
        self
    }

    /// Fail fast instead of waiting when a budget is used up
    pub fn with_limit_mode(mut self, mode: LimitMode) -> Self {
        self.limit_mode = mode;
        self
    }

    /// Set the total attempts per logical call
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the Fibonacci backoff unit
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Cap every backoff sleep
    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = Some(cap);
        self
    }

    /// Lower the largest accepted bulk batch size (never above [`MAX_BATCH_SIZE`])
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Set the HTTP timeouts
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// Append `comment` to the `User-Agent` header
    pub fn with_user_agent_comment(mut self, comment: impl Into<String>) -> Self {
        self.user_agent_comment = Some(comment.into());
        self
    }

    /// `User-Agent` header value: `placekey-rs/<version>[ <comment>]`
    pub fn user_agent(&self) -> String {
        let base = format!("{USER_AGENT_PRODUCT}/{}", env!("CARGO_PKG_VERSION"));
        match self.user_agent_comment.as_deref().map(str::trim) {
            Some(comment) if !comment.is_empty() => format!("{base} {comment}"),
            _ => base,
        }
    }

    /// Whether the HTTP timeouts are the defaults shared by the global client
    pub fn uses_default_timeouts(&self) -> bool {
        self.connect_timeout == Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS)
            && self.request_timeout == Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS)
    }

    /// Check the configuration before a client is built
    ///
    /// # Errors
    /// Returns [`LookupError::Configuration`] for an empty API key or a zero
    /// rate limit window.
    pub fn validate(&self) -> LookupResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(LookupError::Configuration(format!(
                "API key is empty, pass one explicitly or set {API_KEY_ENV}"
            )));
        }
        if self.rate_window.is_zero() {
            return Err(LookupError::Configuration(
                "rate limit window must be longer than zero".to_string(),
            ));
        }
        Ok(())
    }
}
