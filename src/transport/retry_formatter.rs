//! Retry classification and message formatting.
//!
//! [`RetryErrorType`] names the failure behind a non-success HTTP exchange so the
//! executor can decide between retrying and giving up, and [`RetryContext`]
//! renders the retry, recovery and give-up messages sent to the reporter.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

use crate::batch::{Channel, LookupError};

/// Classification of request failures for retry decisions and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Request could not be built (bad URL, invalid header)
    InvalidRequest,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation presented after retries run out.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Consider lowering the batch count per minute or waiting longer",
            Self::ServerError(_) => "The Placekey API may be experiencing issues, try again later",
            Self::InvalidRequest => "Check the API key and endpoint configuration",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Whether the service is expected to accept the same request later.
    ///
    /// Only 503 and 504 count among server errors; other statuses carry a body
    /// describing a permanent problem.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServerError(code) => matches!(code, 503 | 504),
            Self::InvalidRequest => false,
            _ => true,
        }
    }

    /// Best-effort classification of an already-typed lookup failure.
    pub fn from_lookup_error(err: &LookupError) -> Self {
        match err {
            LookupError::RateLimitExceeded { .. } => Self::RateLimit,
            LookupError::TransientService(message) => {
                if message.contains(Self::ServerError(503).description()) {
                    Self::ServerError(503)
                } else if message.contains(Self::ServerError(504).description()) {
                    Self::ServerError(504)
                } else if message.contains(Self::NetworkTimeout.description()) {
                    Self::NetworkTimeout
                } else if message.contains(Self::NetworkOffline.description()) {
                    Self::NetworkOffline
                } else {
                    Self::NetworkGeneric
                }
            }
            LookupError::Configuration(_) | LookupError::Validation(_) => Self::InvalidRequest,
            _ => Self::NetworkGeneric,
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Channel the request was sent on
    pub channel: Channel,
    /// Original error message for details
    pub error_message: String,
}

impl RetryContext {
    /// Build the context for a failed attempt.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        backoff_duration: Duration,
        channel: Channel,
        error: &LookupError,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::from_lookup_error(error),
            backoff_duration,
            channel,
            error_message: error.to_string(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({} lookup)",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.channel
        )
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        format!(
            "Retry attempt {}/{} succeeded - resuming {} lookups",
            self.attempt, self.max_attempts, self.channel
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!(
                "[FAILED] {} lookup gave up after {} attempts",
                self.channel, self.attempt
            ),
            format!("  Last error: {}", self.error_message),
            "  Suggestions:".to_string(),
        ];
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        vec![
            self.error_type.suggestion().to_string(),
            format!("Try increasing --max-retries (current: {})", self.max_attempts),
        ]
    }
}

/// Extract a [`RetryErrorType`] from an HTTP status or reqwest error.
pub fn extract_error_type(
    status: Option<StatusCode>,
    err: Option<&ReqwestError>,
) -> RetryErrorType {
    if let Some(status) = status {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return RetryErrorType::RateLimit;
        }

        if status.is_server_error() {
            return RetryErrorType::ServerError(status.as_u16());
        }
    }

    if let Some(err) = err {
        if err.is_builder() {
            return RetryErrorType::InvalidRequest;
        }

        if err.is_timeout() {
            return RetryErrorType::NetworkTimeout;
        }

        if err.is_connect() {
            return RetryErrorType::NetworkOffline;
        }
    }

    RetryErrorType::NetworkGeneric
}
