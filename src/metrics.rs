//! Observability metrics for the lookup client
//!
//! Tracks request outcomes, 429 responses, retry backoff, rate limiter waits,
//! decode failures and bulk run results.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter for a scrape endpoint (see [`init_metrics`])
//! - Without an installed recorder every call is a no-op

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::batch::Channel;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Request id generator for log correlation
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls return `Ok(())` without rebinding.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "placekey_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the Placekey API"
    );
    describe_counter!(
        "placekey_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit responses received"
    );
    describe_histogram!(
        "placekey_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "placekey_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "placekey_retry_backoff_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_histogram!(
        "placekey_rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limit budget"
    );
    describe_gauge!(
        "placekey_rate_limit_available",
        Unit::Count,
        "Calls left in the current rate limit window"
    );
    describe_counter!(
        "placekey_decode_failures_total",
        Unit::Count,
        "Responses that could not be decoded and were degraded to empty results"
    );
    describe_counter!(
        "placekey_chunks_total",
        Unit::Count,
        "Bulk chunks processed, labelled by outcome"
    );
    describe_counter!(
        "placekey_records_total",
        Unit::Count,
        "Result records returned from bulk runs"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new request id for log correlation
pub fn next_request_id() -> String {
    let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{n:08x}")
}

/// Timing and outcome of one HTTP request
pub struct HttpRequestMetrics {
    channel: Channel,
    start_time: Instant,
    request_id: String,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(channel: Channel) -> Self {
        let request_id = next_request_id();
        debug!(request_id = %request_id, channel = %channel, "Starting HTTP request");

        Self {
            channel,
            start_time: Instant::now(),
            request_id,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "placekey_requests_total",
            "channel" => self.channel.as_str(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "placekey_request_duration_seconds",
            "channel" => self.channel.as_str(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!("placekey_429_errors_total", "channel" => self.channel.as_str()).increment(1);
            warn!(
                request_id = %self.request_id,
                channel = %self.channel,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            request_id = %self.request_id,
            channel = %self.channel,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "placekey_requests_total",
            "channel" => self.channel.as_str(),
            "status" => "network_error",
        )
        .increment(1);

        warn!(
            request_id = %self.request_id,
            channel = %self.channel,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Request id used in this request's log lines
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(channel: Channel, duration: Duration, attempt: u32) {
    counter!("placekey_retries_total", "channel" => channel.as_str()).increment(1);
    histogram!("placekey_retry_backoff_seconds", "channel" => channel.as_str())
        .record(duration.as_secs_f64());

    debug!(
        channel = %channel,
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Record a response degraded to an empty result list
pub fn record_decode_failure(channel: Channel) {
    counter!("placekey_decode_failures_total", "channel" => channel.as_str()).increment(1);
}

/// Rate limiter wait-time helper
pub struct RateLimiterMetrics {
    channel: Channel,
    start_time: Option<Instant>,
}

impl RateLimiterMetrics {
    /// Create a metrics helper for `channel`
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            start_time: None,
        }
    }

    /// Start measuring queue wait time
    pub fn start_acquire(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Record budget acquisition
    pub fn record_acquired(&mut self) {
        if let Some(start) = self.start_time.take() {
            let wait_duration = start.elapsed();

            histogram!("placekey_rate_limit_wait_seconds", "channel" => self.channel.as_str())
                .record(wait_duration.as_secs_f64());

            if wait_duration.as_millis() > 100 {
                debug!(
                    channel = %self.channel,
                    wait_ms = wait_duration.as_millis(),
                    "Rate limit budget acquired after wait"
                );
            }
        }
    }

    /// Update the remaining-budget gauge
    pub fn update_available_permits(&self, available: usize) {
        gauge!("placekey_rate_limit_available", "channel" => self.channel.as_str())
            .set(available as f64);
    }
}

/// Bulk run metrics
pub struct BatchMetrics {
    total_queries: usize,
    start_time: Instant,
}

impl BatchMetrics {
    /// Start tracking a bulk run
    pub fn start(total_queries: usize, chunks: usize) -> Self {
        info!(total_queries, chunks, "Bulk lookup started");
        Self {
            total_queries,
            start_time: Instant::now(),
        }
    }

    /// Record the outcome label of one chunk (`items`, `error`, `malformed`, `failed`)
    pub fn record_chunk(&self, outcome: &'static str) {
        counter!("placekey_chunks_total", "outcome" => outcome).increment(1);
    }

    /// Record the end of the run
    pub fn record_finished(&self, records: usize, stopped_early: bool) {
        counter!("placekey_records_total").increment(records as u64);

        let duration = self.start_time.elapsed();
        if stopped_early {
            warn!(
                total_queries = self.total_queries,
                records,
                duration_secs = duration.as_secs(),
                "Bulk lookup stopped early, returning partial results"
            );
        } else {
            info!(
                total_queries = self.total_queries,
                records,
                duration_secs = duration.as_secs(),
                "Bulk lookup completed"
            );
        }
    }
}
