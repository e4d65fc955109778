//! Ordered merging of chunk outcomes

use tracing::{debug, warn};

use super::scheduler::Chunk;
use super::LookupError;
use crate::metrics::BatchMetrics;
use crate::report::CallReporter;
use crate::transport::RequestOutcome;
use crate::{CorrelationId, ResultRecord};

/// Progress is reported every this many chunks
const PROGRESS_EVERY_CHUNKS: usize = 10;

/// Whether the run may continue after a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStep {
    /// Schedule the next chunk
    Continue,
    /// Stop the run and keep what has been aggregated
    Stop,
}

/// Collects chunk outcomes into one result list in input order
///
/// Chunks must be pushed in chunk-index order. Once a chunk stops the run,
/// later outcomes are ignored.
pub struct ResultAggregator {
    records: Vec<ResultRecord>,
    total_queries: usize,
    next_chunk: usize,
    stopped: bool,
    reporter: CallReporter,
    metrics: BatchMetrics,
}

impl ResultAggregator {
    /// Create an aggregator for a run over `total_queries` queries in `chunks` chunks
    pub fn new(total_queries: usize, chunks: usize, reporter: CallReporter) -> Self {
        Self {
            records: Vec::with_capacity(total_queries),
            total_queries,
            next_chunk: 0,
            stopped: false,
            reporter,
            metrics: BatchMetrics::start(total_queries, chunks),
        }
    }

    /// Merge the outcome of `chunk`
    pub fn push(&mut self, chunk: &Chunk, outcome: RequestOutcome) -> AggregateStep {
        if self.stopped {
            return AggregateStep::Stop;
        }
        debug_assert_eq!(chunk.index, self.next_chunk, "chunks must arrive in order");
        self.next_chunk = chunk.index + 1;

        match outcome {
            RequestOutcome::Items(mut items) => {
                self.metrics.record_chunk("items");
                debug!(chunk = chunk.index, items = items.len(), "Chunk resolved");
                if items.len() > chunk.len() {
                    warn!(
                        chunk = chunk.index,
                        items = items.len(),
                        queries = chunk.len(),
                        "Service returned more items than queries, dropping the surplus"
                    );
                    items.truncate(chunk.len());
                }
                self.records.extend(items);
            }
            RequestOutcome::SingleError { error } => {
                self.metrics.record_chunk("error");
                self.reporter.info(&format!(
                    "All queries in batch ({}, {}) had errors",
                    chunk.start,
                    chunk.end()
                ));
                self.records.extend(
                    chunk
                        .query_ids()
                        .into_iter()
                        .map(|id| ResultRecord::error(id, error.clone())),
                );
            }
            RequestOutcome::Malformed { message } => {
                self.metrics.record_chunk("malformed");
                debug!(chunk = chunk.index, message = %message, "Service rejected bulk request");
                self.reporter.error(&message);
                self.reporter.error("Returning completed queries");
                self.stopped = true;
                return AggregateStep::Stop;
            }
        }

        if (chunk.index + 1) % PROGRESS_EVERY_CHUNKS == 0 {
            self.reporter.info(&format!("Processed {} items", chunk.end()));
        }
        AggregateStep::Continue
    }

    /// Record that `chunk` failed with a terminal error and stop the run
    pub fn fail(&mut self, chunk: &Chunk, err: &LookupError) -> AggregateStep {
        if !self.stopped {
            self.metrics.record_chunk("failed");
            debug!(chunk = chunk.index, error = %err, "Bulk chunk failed");
            self.reporter.error(&format!(
                "Fatal error encountered. Returning processed items at size {} of {}",
                chunk.start, self.total_queries
            ));
            self.stopped = true;
        }
        AggregateStep::Stop
    }

    /// Whether a stop condition has been hit
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Number of records aggregated so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records have been aggregated
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finish the run and return the records in input order
    pub fn finish(self) -> Vec<ResultRecord> {
        self.reporter.info(&format!("Processed {} items", self.records.len()));
        self.reporter.info("Done");
        self.metrics.record_finished(self.records.len(), self.stopped);
        self.records
    }
}

/// Turn the outcome of a single lookup into at most one record
///
/// A whole-request error becomes an error record for `query_id`; a malformed
/// outcome is reported and yields nothing.
pub fn single_record(
    query_id: CorrelationId,
    outcome: RequestOutcome,
    reporter: &CallReporter,
) -> Option<ResultRecord> {
    match outcome {
        RequestOutcome::Items(items) => {
            if items.len() > 1 {
                debug!(items = items.len(), "Single lookup returned several items, keeping the first");
            }
            items.into_iter().next()
        }
        RequestOutcome::SingleError { error } => Some(ResultRecord::error(query_id, error)),
        RequestOutcome::Malformed { message } => {
            reporter.error(&message);
            None
        }
    }
}
