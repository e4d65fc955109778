//! Unit tests for query validation and default correlation ids

use placekey_client::batch::scheduler::{assign_default_ids, partition};
use placekey_client::query::{validate_queries, validate_query, PLACE_METADATA_FIELDS, QUERY_FIELDS};
use placekey_client::{CorrelationId, LookupError, Query};
use serde_json::json;

#[test]
fn test_every_documented_field_is_accepted() {
    let mut query = Query::new();
    for field in QUERY_FIELDS.iter().filter(|f| **f != "place_metadata" && **f != "query_id") {
        query = query.with_field(*field, "x");
    }
    let metadata: serde_json::Map<String, serde_json::Value> = PLACE_METADATA_FIELDS
        .iter()
        .map(|f| (f.to_string(), json!("x")))
        .collect();
    query = query.with_field("place_metadata", serde_json::Value::Object(metadata));

    assert!(validate_query(&query).is_ok());
}

#[test]
fn test_unknown_fields_are_rejected() {
    let query = Query::new().with_field("country", "US");
    assert!(matches!(validate_query(&query), Err(LookupError::Validation(_))));

    let queries = vec![
        Query::new().with_field("city", "Sonora"),
        Query::new().with_field("place_metadata", json!({"hours": "24/7"})),
    ];
    let err = validate_queries(&queries).unwrap_err();
    assert!(err.to_string().contains("query 1"));
    assert!(err.to_string().contains("hours"));
}

#[test]
fn test_non_object_queries_are_rejected() {
    let err = Query::from_value(json!("598 Portola Dr")).unwrap_err();
    assert!(matches!(err, LookupError::Validation(_)));
}

#[test]
fn test_default_ids_use_position_in_full_input() {
    let mut queries: Vec<Query> = (0..250)
        .map(|_| Query::new().with_field("city", "Sonora"))
        .collect();
    queries[150] = queries[150].clone().with_query_id("mine");

    assign_default_ids(&mut queries);
    let chunks = partition(queries, 100);

    assert_eq!(chunks.len(), 3);
    let third = chunks[2].query_ids();
    assert_eq!(third.first(), Some(&CorrelationId::for_index(200)));
    assert_eq!(third.last(), Some(&CorrelationId::for_index(249)));
    assert_eq!(chunks[1].query_ids()[50], CorrelationId::from("mine"));
}
