//! # Placekey Client Library
//!
//! A rate-limited client for the Placekey lookup API. Resolves place descriptors
//! (coordinates or postal addresses) into Placekeys, one at a time or in bulk.
//!
//! ## Features
//!
//! - **Bulk Lookups**: Arbitrarily large query lists split into batches of at most 100
//! - **Rate Limiting**: Independent rolling-window budgets for the single and bulk endpoints
//! - **Backoff & Retry**: Fibonacci backoff on 429 / 503 / 504 and network failures
//! - **Partial Results**: Fatal errors stop the run but keep everything already resolved
//! - **Ordered Output**: Results come back in input order, tagged with their `query_id`
//!
//! ## Quick Start
//!
//! ```no_run
//! use placekey_client::{ClientConfig, PlacekeyClient, Query};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PlacekeyClient::new(ClientConfig::new("my-api-key"))?;
//!
//! let places = vec![
//!     Query::new()
//!         .with_field("latitude", 37.7371)
//!         .with_field("longitude", -122.44283),
//!     Query::new()
//!         .with_field("street_address", "598 Portola Dr")
//!         .with_field("city", "San Francisco")
//!         .with_field("region", "CA")
//!         .with_field("postal_code", "94131")
//!         .with_field("iso_country_code", "US"),
//! ];
//!
//! let results = client.lookup_placekeys(places).await?;
//! for record in &results {
//!     println!("{} -> {:?}", record.query_id, record.placekey());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - The [`PlacekeyClient`] facade and its [`ClientConfig`]
//! - [`batch`] - Rate limiting, retry, chunk scheduling and result aggregation
//! - [`transport`] - HTTP execution and response classification
//! - [`query`] - Query field validation
//! - [`report`] - Injected reporting interface with per-call verbosity
//! - [`metrics`] - Request, retry and rate limiter metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Rate limiting, retry, scheduling and aggregation
pub mod batch;

/// CLI command implementations
pub mod cli;

/// Client facade and configuration
pub mod client;

/// Metrics instrumentation
pub mod metrics;

/// Query field validation
pub mod query;

/// Reporting side channel
pub mod report;

/// HTTP execution and response classification
pub mod transport;

pub use batch::{LookupError, LookupResult};
pub use client::{ClientConfig, PlacekeyClient};
pub use report::{Reporter, TracingReporter, Verbosity};

/// Wire name of the correlation id field
pub const QUERY_ID_FIELD: &str = "query_id";

/// Wire name of the per-item and whole-request error field
pub const ERROR_FIELD: &str = "error";

/// Wire name of the fatal message field
pub const MESSAGE_FIELD: &str = "message";

/// Prefix of scheduler-assigned correlation ids in bulk lookups
pub const DEFAULT_QUERY_ID_PREFIX: &str = "place_";

/// Correlation id the service assigns to a single lookup
pub const SINGLE_QUERY_ID: &str = "0";

/// Identifier tying one result record back to its input query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap a caller-supplied id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Default id for the query at `index` of a bulk input (`place_<index>`)
    pub fn for_index(index: usize) -> Self {
        Self(format!("{DEFAULT_QUERY_ID_PREFIX}{index}"))
    }

    /// Default id of a single lookup
    pub fn single() -> Self {
        Self(SINGLE_QUERY_ID.to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single place descriptor to look up
///
/// The field map is opaque to the batching engine; [`query::validate_query`]
/// checks it against the fields the service accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Caller-supplied or scheduler-assigned correlation id
    #[serde(rename = "query_id", default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<CorrelationId>,
    /// Place fields (latitude, street_address, place_metadata, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Query {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from a JSON value
    ///
    /// # Errors
    /// Returns [`LookupError::Validation`] if the value is not a JSON object or
    /// its `query_id` is not a string.
    pub fn from_value(value: Value) -> LookupResult<Self> {
        if !value.is_object() {
            return Err(LookupError::Validation(format!(
                "query must be a JSON object, got {}",
                json_type_name(&value)
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| LookupError::Validation(format!("malformed query: {e}")))
    }

    /// Set a place field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the correlation id
    pub fn with_query_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.query_id = Some(id.into());
        self
    }

    /// Look up a place field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Assign `default` as the correlation id unless one is already present
    ///
    /// Returns the id the query carries afterwards.
    pub fn ensure_query_id(&mut self, default: impl FnOnce() -> CorrelationId) -> &CorrelationId {
        self.query_id.get_or_insert_with(default)
    }
}

/// One entry of the lookup output
///
/// Successful records carry `placekey` plus any requested extra fields; failed
/// records carry an `error` value instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Correlation id of the query this record answers
    pub query_id: CorrelationId,
    /// Result payload (`placekey`, requested fields, or `error`)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResultRecord {
    /// Create a record with the given payload fields
    pub fn new(query_id: CorrelationId, fields: Map<String, Value>) -> Self {
        Self { query_id, fields }
    }

    /// Create a per-item error record
    pub fn error(query_id: CorrelationId, error: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(ERROR_FIELD.to_string(), error);
        Self { query_id, fields }
    }

    /// The per-item error value, if the lookup failed for this query
    pub fn error_value(&self) -> Option<&Value> {
        self.fields.get(ERROR_FIELD)
    }

    /// Whether this record reports a per-item failure
    pub fn is_error(&self) -> bool {
        self.error_value().is_some()
    }

    /// The resolved Placekey, if present
    pub fn placekey(&self) -> Option<&str> {
        self.fields.get("placekey").and_then(Value::as_str)
    }

    /// Look up a payload field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
