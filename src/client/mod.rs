//! Placekey client facade
//!
//! [`PlacekeyClient`] owns the configuration, the per-channel rate limiters,
//! the retry policy, the request executor and the reporter. Budgets and retry
//! state live as long as the client; clones share them.
//!
//! # Quick Start
//!
//! ```no_run
//! use placekey_client::{ClientConfig, PlacekeyClient, Query};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PlacekeyClient::new(ClientConfig::from_env()?)?;
//!
//! let query = Query::new()
//!     .with_field("latitude", 37.7371)
//!     .with_field("longitude", -122.44283);
//!
//! if let Some(record) = client.lookup_placekey(query, None).await? {
//!     println!("{:?}", record.placekey());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::{debug, info};

pub mod config;

pub use config::ClientConfig;

use crate::batch::aggregator::{single_record, ResultAggregator};
use crate::batch::scheduler::{assign_default_ids, Chunk};
use crate::batch::{
    BackoffRetrier, BatchOptions, BatchScheduler, Channel, LookupError, LookupResult, RateLimiter,
    RateLimits,
};
use crate::query::{validate_queries, validate_query};
use crate::report::{CallReporter, Reporter, TracingReporter, Verbosity};
use crate::transport::http::Endpoints;
use crate::transport::shared_resources::{build_http_client, global_http_client};
use crate::transport::{single_payload, HttpExecutor, RequestExecutor};
use crate::{CorrelationId, Query, ResultRecord};

/// Rate-limited Placekey lookup client
#[derive(Debug, Clone)]
pub struct PlacekeyClient {
    config: ClientConfig,
    executor: Arc<dyn RequestExecutor>,
    limits: RateLimits,
    single_retrier: BackoffRetrier,
    scheduler: BatchScheduler,
    reporter: Arc<dyn Reporter>,
}

impl PlacekeyClient {
    /// Create a client that reports through `tracing`
    ///
    /// # Errors
    /// Returns [`LookupError::Configuration`] if the configuration is invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> LookupResult<Self> {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    /// Create a client that reports through `reporter`
    ///
    /// # Errors
    /// Same as [`PlacekeyClient::new`].
    pub fn with_reporter(config: ClientConfig, reporter: Arc<dyn Reporter>) -> LookupResult<Self> {
        config.validate()?;

        let http = if config.uses_default_timeouts() {
            global_http_client()?
        } else {
            build_http_client(config.connect_timeout, config.request_timeout)?
        };
        let endpoints = Endpoints {
            single: config.single_url.clone(),
            bulk: config.bulk_url.clone(),
        };
        let executor = HttpExecutor::new(
            http,
            endpoints,
            &config.api_key,
            &config.user_agent(),
            reporter.clone(),
        )?;

        Ok(Self::with_executor(config, Arc::new(executor), reporter))
    }

    /// Create a client around a custom executor
    ///
    /// The configuration is used as-is; endpoint, key and timeout settings only
    /// matter to executors that read them.
    pub fn with_executor(
        config: ClientConfig,
        executor: Arc<dyn RequestExecutor>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let limits = RateLimits::new(
            RateLimiter::new(Channel::Single, config.single_calls, config.rate_window)
                .with_mode(config.limit_mode),
            RateLimiter::new(Channel::Bulk, config.bulk_calls, config.rate_window)
                .with_mode(config.limit_mode),
        );
        let retrier = |channel| {
            BackoffRetrier::new(channel, config.max_retries, config.backoff_unit)
                .with_max_delay(config.max_backoff)
        };
        let single_retrier = retrier(Channel::Single);
        let scheduler = BatchScheduler::new(
            executor.clone(),
            limits.for_channel(Channel::Bulk).clone(),
            retrier(Channel::Bulk),
            reporter.clone(),
        )
        .with_max_batch_size(config.max_batch_size);

        info!(
            single_calls = config.single_calls,
            bulk_calls = config.bulk_calls,
            window_secs = config.rate_window.as_secs(),
            max_retries = config.max_retries,
            "Placekey client created"
        );

        Self {
            config,
            executor,
            limits,
            single_retrier,
            scheduler,
            reporter,
        }
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The per-channel rate limiters
    pub fn rate_limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Look up the Placekey of one place
    ///
    /// Returns `Ok(None)` when the service answers with a fatal message or an
    /// undecodable body; both are reported. A whole-request error comes back as
    /// an error record.
    ///
    /// # Errors
    /// - [`LookupError::Validation`] for unknown fields, before any request
    /// - [`LookupError::RetriesExhausted`] when every attempt was rate limited
    ///   or hit a transient failure
    /// - [`LookupError::FatalService`] for non-retryable transport failures
    pub async fn lookup_placekey(
        &self,
        query: Query,
        fields: Option<&[String]>,
    ) -> LookupResult<Option<ResultRecord>> {
        self.lookup_placekey_with(query, fields, Verbosity::Quiet)
            .await
    }

    /// Look up one place, reporting at `verbosity`
    ///
    /// Verbose calls also report retry and recovery notices. Errors are as for
    /// [`PlacekeyClient::lookup_placekey`].
    pub async fn lookup_placekey_with(
        &self,
        query: Query,
        fields: Option<&[String]>,
        verbosity: Verbosity,
    ) -> LookupResult<Option<ResultRecord>> {
        validate_query(&query)?;

        let reporter = CallReporter::new(self.reporter.clone(), verbosity);
        let query_id = query.query_id.clone().unwrap_or_else(CorrelationId::single);
        let payload = single_payload(&query, fields);
        let payload = &payload;
        let limiter = self.limits.for_channel(Channel::Single);
        let executor = &self.executor;

        debug!(query_id = %query_id, "Single lookup");
        let outcome = self
            .single_retrier
            .run(&reporter, move || async move {
                limiter.acquire().await?;
                executor.execute(Channel::Single, payload).await
            })
            .await?;

        Ok(single_record(query_id, outcome, &reporter))
    }

    /// Look up many places with the default options
    ///
    /// See [`PlacekeyClient::lookup_placekeys_with`].
    pub async fn lookup_placekeys(&self, queries: Vec<Query>) -> LookupResult<Vec<ResultRecord>> {
        self.lookup_placekeys_with(queries, &BatchOptions::default())
            .await
    }

    /// Look up many places in batches, honouring the bulk budget
    ///
    /// Queries without a `query_id` get `place_<index>`. Records come back in
    /// input order. Service-side failures stop the run and the records gathered
    /// so far are returned.
    ///
    /// # Errors
    /// Only [`LookupError::Validation`], before any request is made.
    pub async fn lookup_placekeys_with(
        &self,
        queries: Vec<Query>,
        options: &BatchOptions,
    ) -> LookupResult<Vec<ResultRecord>> {
        self.scheduler.run_batch(queries, options).await
    }

    /// Send one bulk request of at most the maximum batch size
    ///
    /// Unlike [`PlacekeyClient::lookup_placekeys`] terminal failures are
    /// returned to the caller, which can then apply its own batching policy.
    /// A fatal service message is reported and yields no records.
    ///
    /// # Errors
    /// - [`LookupError::Validation`] for too many queries or unknown fields
    /// - [`LookupError::RetriesExhausted`] / [`LookupError::FatalService`] as
    ///   for single lookups
    pub async fn lookup_batch(
        &self,
        queries: Vec<Query>,
        fields: Option<&[String]>,
    ) -> LookupResult<Vec<ResultRecord>> {
        self.lookup_batch_with(queries, fields, Verbosity::Quiet)
            .await
    }

    /// Send one bulk request, reporting at `verbosity`
    ///
    /// Errors are as for [`PlacekeyClient::lookup_batch`].
    pub async fn lookup_batch_with(
        &self,
        mut queries: Vec<Query>,
        fields: Option<&[String]>,
        verbosity: Verbosity,
    ) -> LookupResult<Vec<ResultRecord>> {
        let max = self.scheduler.max_batch_size();
        if queries.len() > max {
            return Err(LookupError::Validation(format!(
                "{} places submitted, a batch can hold at most {max}",
                queries.len()
            )));
        }
        validate_queries(&queries)?;
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        assign_default_ids(&mut queries);
        let reporter = CallReporter::new(self.reporter.clone(), verbosity);
        let chunk = Chunk {
            index: 0,
            start: 0,
            queries,
        };
        let outcome = self.scheduler.lookup_chunk(&chunk, fields, &reporter).await?;

        let mut aggregator = ResultAggregator::new(chunk.len(), 1, reporter);
        aggregator.push(&chunk, outcome);
        Ok(aggregator.finish())
    }
}
