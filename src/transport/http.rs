//! Placekey HTTP executor
//!
//! Sends lookup payloads to the single or bulk endpoint and classifies the
//! outcome:
//! - 429 → rate limited (retryable)
//! - 503 / 504, timeouts, connection failures → transient (retryable)
//! - parsed bodies → [`RequestOutcome`], whatever the status
//! - unparseable bodies → empty item list, reported as a decode failure

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::retry_formatter::extract_error_type;
use super::{decode_body, RequestExecutor, RequestOutcome};
use crate::batch::{Channel, LookupError, LookupResult};
use crate::metrics::{record_decode_failure, HttpRequestMetrics};
use crate::report::Reporter;

/// Longest body excerpt logged for undecodable responses
const BODY_EXCERPT_LEN: usize = 200;

/// Endpoint URLs for the two request channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Single-lookup endpoint
    pub single: String,
    /// Bulk-lookup endpoint
    pub bulk: String,
}

impl Endpoints {
    /// URL serving `channel`
    pub fn url(&self, channel: Channel) -> &str {
        match channel {
            Channel::Single => &self.single,
            Channel::Bulk => &self.bulk,
        }
    }
}

/// HTTP implementation of [`RequestExecutor`]
#[derive(Debug)]
pub struct HttpExecutor {
    client: Arc<Client>,
    endpoints: Endpoints,
    headers: HeaderMap,
    reporter: Arc<dyn Reporter>,
}

impl HttpExecutor {
    /// Create an executor
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (Arc for cheap cloning)
    /// * `endpoints` - Single and bulk endpoint URLs
    /// * `api_key` - Value of the `apikey` header
    /// * `user_agent` - Value of the `User-Agent` header
    /// * `reporter` - Receives decode failures
    ///
    /// # Errors
    /// Returns [`LookupError::Configuration`] if the key or user agent is not a
    /// valid header value.
    pub fn new(
        client: Arc<Client>,
        endpoints: Endpoints,
        api_key: &str,
        user_agent: &str,
        reporter: Arc<dyn Reporter>,
    ) -> LookupResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|e| LookupError::Configuration(format!("invalid API key: {e}")))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| LookupError::Configuration(format!("invalid user agent: {e}")))?,
        );

        Ok(Self {
            client,
            endpoints,
            headers,
            reporter,
        })
    }

    /// Endpoint URLs this executor posts to
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Headers sent with every request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn classify_body(&self, channel: Channel, status: StatusCode, body: &str) -> RequestOutcome {
        match decode_body(body) {
            Ok(decoded) => {
                for reason in &decoded.rejected {
                    record_decode_failure(channel);
                    self.reporter
                        .error(&format!("Skipping {channel} lookup result: {reason}"));
                }
                decoded.outcome
            }
            Err(err) => {
                record_decode_failure(channel);
                debug!(
                    channel = %channel,
                    status = status.as_u16(),
                    body = excerpt(body),
                    "Undecodable response body"
                );
                self.reporter.error(&format!(
                    "Failed to decode {channel} lookup response (HTTP {}: {err}), returning empty list",
                    status.as_u16()
                ));
                RequestOutcome::Items(Vec::new())
            }
        }
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, channel: Channel, payload: &Value) -> LookupResult<RequestOutcome> {
        let url = self.endpoints.url(channel);
        let metrics = HttpRequestMetrics::start(channel);
        debug!(channel = %channel, url = %url, "Sending lookup request");

        let response = match self
            .client
            .post(url)
            .headers(self.headers.clone())
            .json(payload)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                metrics.record_network_error();
                return Err(classify_transport_error(&e));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(channel = %channel, "Rate limit error (429)");
            return Err(LookupError::RateLimitExceeded { channel });
        }

        if matches!(
            status,
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            let kind = extract_error_type(Some(status), None);
            warn!(channel = %channel, status = status.as_u16(), "Transient service error");
            return Err(LookupError::TransientService(format!(
                "{} (HTTP {})",
                kind.description(),
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        Ok(self.classify_body(channel, status, &body))
    }
}

/// Map a reqwest failure to a retryable or fatal lookup error
fn classify_transport_error(err: &reqwest::Error) -> LookupError {
    let kind = extract_error_type(err.status(), Some(err));
    if kind.is_retryable() {
        LookupError::TransientService(format!("{}: {err}", kind.description()))
    } else {
        LookupError::FatalService(format!("{}: {err}", kind.description()))
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
