//! Shared HTTP client
//!
//! Clients built with the default timeouts share one connection pool. Rate
//! limiters are deliberately not shared here: each [`crate::PlacekeyClient`]
//! owns its own budgets.

use once_cell::sync::OnceCell;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::{LookupError, LookupResult};

/// HTTP connect timeout (seconds) - time to establish TCP connection
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

static GLOBAL_HTTP_CLIENT: OnceCell<Arc<Client>> = OnceCell::new();

/// Build an HTTP client with explicit timeouts
///
/// Timeouts surface as transient failures and are retried.
pub fn build_http_client(connect_timeout: Duration, request_timeout: Duration) -> LookupResult<Arc<Client>> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map(Arc::new)
        .map_err(|e| {
            LookupError::Configuration(format!(
                "failed to build HTTP client: {e}. Check system TLS configuration."
            ))
        })
}

/// Get the process-wide HTTP client configured with the default timeouts
///
/// Returns a clone of the Arc, which is cheap (just increments ref count)
pub fn global_http_client() -> LookupResult<Arc<Client>> {
    GLOBAL_HTTP_CLIENT
        .get_or_try_init(|| {
            build_http_client(
                Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
                Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
            )
        })
        .cloned()
}
