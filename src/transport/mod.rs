//! Request execution and response classification

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::batch::{Channel, LookupError, LookupResult};
use crate::{json_type_name, Query, ResultRecord, ERROR_FIELD, MESSAGE_FIELD};

pub mod http;
pub mod retry_formatter;
pub mod shared_resources;

pub use http::HttpExecutor;

/// Decoded response of one lookup request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The service rejected the whole request with one error value
    SingleError {
        /// The shared error value
        error: Value,
    },
    /// The service answered with a fatal message; processing must stop
    Malformed {
        /// Message reported by the service
        message: String,
    },
    /// Per-item results, in service order
    Items(Vec<ResultRecord>),
}

/// Performs one lookup request
///
/// Implementations classify failures into [`LookupError`] variants:
/// rate limiting and transient unavailability must be retryable, everything
/// else must not.
#[async_trait]
pub trait RequestExecutor: Send + Sync + fmt::Debug {
    /// Send `payload` to the endpoint of `channel`
    async fn execute(&self, channel: Channel, payload: &Value) -> LookupResult<RequestOutcome>;
}

/// Body of a single lookup: `{"query": {...}, "options"?: {"fields": [...]}}`
pub fn single_payload(query: &Query, fields: Option<&[String]>) -> Value {
    let mut payload = Map::new();
    payload.insert("query".to_string(), json!(query));
    insert_options(&mut payload, fields);
    Value::Object(payload)
}

/// Body of a bulk lookup: `{"queries": [...], "options"?: {"fields": [...]}}`
pub fn bulk_payload(queries: &[Query], fields: Option<&[String]>) -> Value {
    let mut payload = Map::new();
    payload.insert("queries".to_string(), json!(queries));
    insert_options(&mut payload, fields);
    Value::Object(payload)
}

fn insert_options(payload: &mut Map<String, Value>, fields: Option<&[String]>) {
    if let Some(fields) = fields.filter(|f| !f.is_empty()) {
        payload.insert("options".to_string(), json!({ "fields": fields }));
    }
}

/// A classified response body
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBody {
    /// The classified outcome
    pub outcome: RequestOutcome,
    /// One reason per result item dropped from `outcome`
    pub rejected: Vec<String>,
}

impl From<RequestOutcome> for DecodedBody {
    fn from(outcome: RequestOutcome) -> Self {
        Self {
            outcome,
            rejected: Vec::new(),
        }
    }
}

/// Classify a response body
///
/// - an object with `error` applies to the whole request
/// - an object with `message` (and no item list) is fatal
/// - any other object is a single item (the single-lookup shape)
/// - an array is the per-item list
///
/// Items without a string `query_id` are left out of the outcome and listed
/// in [`DecodedBody::rejected`]; their siblings are kept.
///
/// # Errors
/// Returns [`LookupError::Decode`] when the body is not JSON, or is JSON but
/// neither an object nor an array.
pub fn decode_body(body: &str) -> LookupResult<DecodedBody> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| LookupError::Decode(format!("response is not valid JSON: {e}")))?;

    match value {
        Value::Object(mut map) => {
            if let Some(error) = map.remove(ERROR_FIELD) {
                return Ok(RequestOutcome::SingleError { error }.into());
            }
            if let Some(message) = map.get(MESSAGE_FIELD) {
                let message = match message {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Ok(RequestOutcome::Malformed { message }.into());
            }
            Ok(decode_items(vec![Value::Object(map)]))
        }
        Value::Array(items) => Ok(decode_items(items)),
        other => Err(LookupError::Decode(format!(
            "expected a JSON object or array, got {}",
            json_type_name(&other)
        ))),
    }
}

fn decode_items(items: Vec<Value>) -> DecodedBody {
    let mut records = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<ResultRecord>(item) {
            Ok(record) => records.push(record),
            Err(e) => rejected.push(format!("result item {index} is malformed: {e}")),
        }
    }
    DecodedBody {
        outcome: RequestOutcome::Items(records),
        rejected,
    }
}
