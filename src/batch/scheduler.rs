//! Bulk lookup scheduling
//!
//! A bulk run validates its input, tags every query with a correlation id,
//! splits the queries into chunks and sends each chunk to the bulk endpoint
//! through the rate limiter and the retrier. Outcomes are merged in chunk order
//! by a [`ResultAggregator`]; the first terminal failure stops the run and the
//! records gathered so far are returned.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use super::aggregator::{AggregateStep, ResultAggregator};
use super::rate_limit::{Channel, RateLimiter};
use super::retry::BackoffRetrier;
use super::{LookupError, LookupResult};
use crate::client::config::MAX_BATCH_SIZE;
use crate::query::validate_queries;
use crate::report::{CallReporter, Reporter, Verbosity};
use crate::transport::{bulk_payload, RequestExecutor, RequestOutcome};
use crate::{CorrelationId, Query, ResultRecord};

/// Per-call options of a bulk run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Extra result fields to request (e.g. `address_placekey`)
    pub fields: Option<Vec<String>>,
    /// Queries per request, at most the scheduler's maximum batch size
    pub batch_size: usize,
    /// Chunk requests allowed in flight at once
    pub concurrency: usize,
    /// Reporting level for this run
    pub verbosity: Verbosity,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            fields: None,
            batch_size: MAX_BATCH_SIZE,
            concurrency: 1,
            verbosity: Verbosity::Quiet,
        }
    }
}

impl BatchOptions {
    /// Request extra result fields
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Set the number of queries per request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Allow up to `concurrency` chunk requests in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the reporting level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

/// A contiguous slice of the input sent as one bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of the chunk in the run
    pub index: usize,
    /// Position of the chunk's first query in the full input
    pub start: usize,
    /// The chunk's queries
    pub queries: Vec<Query>,
}

impl Chunk {
    /// Position one past the chunk's last query in the full input
    pub fn end(&self) -> usize {
        self.start + self.queries.len()
    }

    /// Number of queries in the chunk
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether the chunk holds no queries
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Correlation ids of the chunk's queries, in order
    pub fn query_ids(&self) -> Vec<CorrelationId> {
        self.queries
            .iter()
            .enumerate()
            .map(|(offset, query)| {
                query
                    .query_id
                    .clone()
                    .unwrap_or_else(|| CorrelationId::for_index(self.start + offset))
            })
            .collect()
    }
}

/// Give every query without a correlation id the default `place_<index>`
///
/// Indices are positions in `queries`. Existing ids are left untouched, so the
/// operation is idempotent.
pub fn assign_default_ids(queries: &mut [Query]) {
    for (index, query) in queries.iter_mut().enumerate() {
        query.ensure_query_id(|| CorrelationId::for_index(index));
    }
}

/// Split `queries` into consecutive chunks of at most `batch_size` queries
pub fn partition(queries: Vec<Query>, batch_size: usize) -> Vec<Chunk> {
    let batch_size = batch_size.max(1);
    let mut chunks = Vec::with_capacity(queries.len().div_ceil(batch_size));
    let mut rest = queries.into_iter().peekable();
    let mut start = 0;

    while rest.peek().is_some() {
        let queries: Vec<Query> = rest.by_ref().take(batch_size).collect();
        let len = queries.len();
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            queries,
        });
        start += len;
    }
    chunks
}

/// Drives bulk runs against the bulk endpoint
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    executor: Arc<dyn RequestExecutor>,
    limiter: RateLimiter,
    retrier: BackoffRetrier,
    reporter: Arc<dyn Reporter>,
    max_batch_size: usize,
}

impl BatchScheduler {
    /// Create a scheduler
    ///
    /// `limiter` gates every bulk request, including retries.
    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        limiter: RateLimiter,
        retrier: BackoffRetrier,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            executor,
            limiter,
            retrier,
            reporter,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Lower the largest accepted batch size (never above [`MAX_BATCH_SIZE`])
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Largest accepted batch size
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Check options and queries before any request is made
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Validation`] if the batch size is zero or above
    /// the maximum, or a query names an unknown field.
    pub fn validate(&self, queries: &[Query], options: &BatchOptions) -> LookupResult<()> {
        if options.batch_size == 0 {
            return Err(LookupError::Validation(
                "batch size must be at least 1".to_string(),
            ));
        }
        if options.batch_size > self.max_batch_size {
            return Err(LookupError::Validation(format!(
                "batch size cannot exceed {}, got {}",
                self.max_batch_size, options.batch_size
            )));
        }
        validate_queries(queries)
    }

    /// Look up every query and return the records in input order
    ///
    /// Service-side failures never surface as `Err`: the run stops at the
    /// first chunk that exhausts its retries, fails fatally or gets a fatal
    /// message, and the records of earlier chunks are returned.
    ///
    /// # Errors
    ///
    /// Only validation failures, reported before any network activity.
    pub async fn run_batch(
        &self,
        mut queries: Vec<Query>,
        options: &BatchOptions,
    ) -> LookupResult<Vec<ResultRecord>> {
        self.validate(&queries, options)?;
        if queries.is_empty() {
            debug!("Empty bulk input, nothing to do");
            return Ok(Vec::new());
        }

        assign_default_ids(&mut queries);
        let total = queries.len();
        let chunks = partition(queries, options.batch_size);
        let concurrency = options.concurrency.max(1);
        info!(
            total_queries = total,
            chunks = chunks.len(),
            batch_size = options.batch_size,
            concurrency,
            "Starting bulk lookup"
        );

        let reporter = CallReporter::new(self.reporter.clone(), options.verbosity);
        let mut aggregator = ResultAggregator::new(total, chunks.len(), reporter.clone());

        let fields = options.fields.as_deref();
        let reporter = &reporter;
        let mut outcomes = stream::iter(chunks.iter())
            .map(move |chunk| async move { (chunk, self.lookup_chunk(chunk, fields, reporter).await) })
            .buffered(concurrency);

        while let Some((chunk, result)) = outcomes.next().await {
            let step = match result {
                Ok(outcome) => aggregator.push(chunk, outcome),
                Err(err) => aggregator.fail(chunk, &err),
            };
            if step == AggregateStep::Stop {
                break;
            }
        }

        Ok(aggregator.finish())
    }

    /// Send one chunk, waiting for bulk budget before every attempt
    pub async fn lookup_chunk(
        &self,
        chunk: &Chunk,
        fields: Option<&[String]>,
        reporter: &CallReporter,
    ) -> LookupResult<RequestOutcome> {
        debug!(chunk = chunk.index, start = chunk.start, queries = chunk.len(), "Sending chunk");
        let payload = bulk_payload(&chunk.queries, fields);
        let payload = &payload;
        let limiter = &self.limiter;
        let executor = &self.executor;

        self.retrier
            .run(reporter, move || async move {
                limiter.acquire().await?;
                executor.execute(Channel::Bulk, payload).await
            })
            .await
    }
}
