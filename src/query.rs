//! Query field validation
//!
//! The lookup service accepts a fixed set of place fields. A query naming any
//! other field is rejected locally, before a request is sent.

use serde_json::Value;

use crate::batch::{LookupError, LookupResult};
use crate::{json_type_name, Query};

/// Field holding the nested place metadata mapping
pub const PLACE_METADATA_FIELD: &str = "place_metadata";

/// Top-level fields a query may carry
pub const QUERY_FIELDS: &[&str] = &[
    "latitude",
    "longitude",
    "location_name",
    "street_address",
    "city",
    "region",
    "postal_code",
    "iso_country_code",
    crate::QUERY_ID_FIELD,
    PLACE_METADATA_FIELD,
];

/// Fields allowed inside `place_metadata`
pub const PLACE_METADATA_FIELDS: &[&str] =
    &["store_id", "phone_number", "website", "naics_code", "mcc_code"];

/// Check a query's field names against the accepted set
///
/// # Errors
///
/// Returns [`LookupError::Validation`] naming the first unknown field, or if
/// `place_metadata` is not a mapping.
///
/// # Examples
///
/// ```
/// use placekey_client::query::validate_query;
/// use placekey_client::Query;
///
/// let ok = Query::new().with_field("city", "San Francisco");
/// assert!(validate_query(&ok).is_ok());
///
/// let bad = Query::new().with_field("county", "San Francisco");
/// assert!(validate_query(&bad).is_err());
/// ```
pub fn validate_query(query: &Query) -> LookupResult<()> {
    for (name, value) in &query.fields {
        if !QUERY_FIELDS.contains(&name.as_str()) {
            return Err(LookupError::Validation(format!(
                "query contains unknown field '{name}', expected one of: {}",
                QUERY_FIELDS.join(", ")
            )));
        }
        if name == PLACE_METADATA_FIELD {
            validate_place_metadata(value)?;
        }
    }
    Ok(())
}

fn validate_place_metadata(value: &Value) -> LookupResult<()> {
    let metadata = value.as_object().ok_or_else(|| {
        LookupError::Validation(format!(
            "{PLACE_METADATA_FIELD} must be a JSON object, got {}",
            json_type_name(value)
        ))
    })?;

    match metadata
        .keys()
        .find(|key| !PLACE_METADATA_FIELDS.contains(&key.as_str()))
    {
        Some(key) => Err(LookupError::Validation(format!(
            "{PLACE_METADATA_FIELD} contains unknown field '{key}', expected one of: {}",
            PLACE_METADATA_FIELDS.join(", ")
        ))),
        None => Ok(()),
    }
}

/// Validate every query of a bulk input
///
/// # Errors
///
/// Returns the first failure, prefixed with the offending query's position.
pub fn validate_queries(queries: &[Query]) -> LookupResult<()> {
    for (index, query) in queries.iter().enumerate() {
        validate_query(query).map_err(|e| match e {
            LookupError::Validation(msg) => LookupError::Validation(format!("query {index}: {msg}")),
            other => other,
        })?;
    }
    Ok(())
}

/// Parse a JSON array of query objects
///
/// # Errors
///
/// Returns [`LookupError::Validation`] if `value` is not an array or any entry
/// is not a well-formed query object.
pub fn queries_from_value(value: Value) -> LookupResult<Vec<Query>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                Query::from_value(item).map_err(|e| match e {
                    LookupError::Validation(msg) => {
                        LookupError::Validation(format!("query {index}: {msg}"))
                    }
                    other => other,
                })
            })
            .collect(),
        other => Err(LookupError::Validation(format!(
            "expected a JSON array of queries, got {}",
            json_type_name(&other)
        ))),
    }
}
