//! Bulk lookups against a mock Placekey service

use mockito::{Matcher, Server};
use placekey_client::batch::BatchOptions;
use placekey_client::{LookupError, PlacekeyClient, Query, Verbosity};
use serde_json::json;
use std::sync::Arc;

use crate::common::{mock_client, mock_config, places, resolved, CapturingReporter};

#[tokio::test]
async fn test_default_and_custom_ids_in_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Json(json!({
            "queries": [
                {"query_id": "place_0", "city": "San Francisco", "region": "CA"},
                {"query_id": "thisqueryidaloneiscustom", "city": "Pinecrest", "region": "CA"},
                {"query_id": "place_2", "city": "Sonora", "region": "CA"}
            ]
        })))
        .with_status(200)
        .with_body(
            json!([
                {"query_id": "place_0", "placekey": "@5vg-82n-kzz"},
                {"query_id": "thisqueryidaloneiscustom", "placekey": "@5x4-4b9-5zz"},
                {"query_id": "place_2", "error": "Invalid address"}
            ])
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let queries = vec![
        Query::new().with_field("city", "San Francisco").with_field("region", "CA"),
        Query::new()
            .with_field("city", "Pinecrest")
            .with_field("region", "CA")
            .with_query_id("thisqueryidaloneiscustom"),
        Query::new().with_field("city", "Sonora").with_field("region", "CA"),
    ];

    let (client, _) = mock_client(&server.url());
    let records = client.lookup_placekeys(queries).await.unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.query_id.as_str()).collect();
    assert_eq!(ids, vec!["place_0", "thisqueryidaloneiscustom", "place_2"]);
    assert!(records[2].is_error());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_chunks_follow_batch_size() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_0""#.to_string()))
        .with_status(200)
        .with_body(resolved(0, 2).to_string())
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_2""#.to_string()))
        .with_status(200)
        .with_body(resolved(2, 4).to_string())
        .expect(1)
        .create_async()
        .await;
    let third = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_4""#.to_string()))
        .with_status(200)
        .with_body(resolved(4, 5).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, _) = mock_client(&server.url());
    let options = BatchOptions::default().with_batch_size(2);
    let records = client.lookup_placekeys_with(places(5), &options).await.unwrap();

    assert_eq!(records.len(), 5);
    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
}

#[tokio::test]
async fn test_whole_batch_error_fans_out() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/placekeys")
        .with_status(400)
        .with_body(r#"{"error":"All queries in the batch were invalid"}"#)
        .create_async()
        .await;

    let mut queries = places(3);
    queries[1] = queries[1].clone().with_query_id("thisqueryidaloneiscustom");

    let (client, _) = mock_client(&server.url());
    let records = client.lookup_placekeys(queries).await.unwrap();

    assert_eq!(records.len(), 3);
    let ids: Vec<&str> = records.iter().map(|r| r.query_id.as_str()).collect();
    assert_eq!(ids, vec!["place_0", "thisqueryidaloneiscustom", "place_2"]);
    assert!(records
        .iter()
        .all(|r| r.error_value() == Some(&json!("All queries in the batch were invalid"))));
}

#[tokio::test]
async fn test_fatal_third_chunk_keeps_first_two_hundred() {
    let mut server = Server::new_async().await;
    let _first = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_0""#.to_string()))
        .with_status(200)
        .with_body(resolved(0, 100).to_string())
        .create_async()
        .await;
    let _second = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_100""#.to_string()))
        .with_status(200)
        .with_body(resolved(100, 200).to_string())
        .create_async()
        .await;
    let third = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_200""#.to_string()))
        .with_status(503)
        .with_body("Service Unavailable")
        .expect(2)
        .create_async()
        .await;

    let reporter = Arc::new(CapturingReporter::default());
    let config = mock_config(&server.url()).with_max_retries(2);
    let client = PlacekeyClient::with_reporter(config, reporter.clone()).unwrap();
    let records = client.lookup_placekeys(places(250)).await.unwrap();

    assert_eq!(records.len(), 200);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.query_id.as_str(), format!("place_{i}"));
    }
    assert_eq!(
        reporter.errors().last().map(String::as_str),
        Some("Fatal error encountered. Returning processed items at size 200 of 250")
    );
    third.assert_async().await;
}

#[tokio::test]
async fn test_message_stops_run() {
    let mut server = Server::new_async().await;
    let _first = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_0""#.to_string()))
        .with_status(200)
        .with_body(resolved(0, 2).to_string())
        .create_async()
        .await;
    let _second = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_2""#.to_string()))
        .with_status(403)
        .with_body(r#"{"message":"Quota exceeded for this API key"}"#)
        .create_async()
        .await;
    let third = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_4""#.to_string()))
        .expect(0)
        .create_async()
        .await;

    let (client, reporter) = mock_client(&server.url());
    let options = BatchOptions::default().with_batch_size(2);
    let records = client.lookup_placekeys_with(places(6), &options).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(
        reporter.errors(),
        vec![
            "Quota exceeded for this API key".to_string(),
            "Returning completed queries".to_string()
        ]
    );
    third.assert_async().await;
}

#[tokio::test]
async fn test_undecodable_chunk_is_skipped() {
    let mut server = Server::new_async().await;
    let _first = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_0""#.to_string()))
        .with_status(200)
        .with_body("not json at all")
        .create_async()
        .await;
    let _second = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_2""#.to_string()))
        .with_status(200)
        .with_body(resolved(2, 4).to_string())
        .create_async()
        .await;

    let (client, reporter) = mock_client(&server.url());
    let options = BatchOptions::default().with_batch_size(2);
    let records = client.lookup_placekeys_with(places(4), &options).await.unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.query_id.as_str()).collect();
    assert_eq!(ids, vec!["place_2", "place_3"]);
    assert_eq!(reporter.errors().len(), 1);
}

#[tokio::test]
async fn test_html_error_page_chunk_is_skipped() {
    let mut server = Server::new_async().await;
    let _first = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_0""#.to_string()))
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;
    let second = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::Regex(r#""place_2""#.to_string()))
        .with_status(200)
        .with_body(resolved(2, 4).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, reporter) = mock_client(&server.url());
    let options = BatchOptions::default().with_batch_size(2);
    let records = client.lookup_placekeys_with(places(4), &options).await.unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.query_id.as_str()).collect();
    assert_eq!(ids, vec!["place_2", "place_3"]);
    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("HTTP 502"));
    second.assert_async().await;
}

#[tokio::test]
async fn test_item_without_id_does_not_drop_its_chunk() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/placekeys")
        .with_status(200)
        .with_body(r#"[{"query_id":"place_0","placekey":"@5vg-82n-kzz"},{"placekey":"@5x4-4b9-5zz"}]"#)
        .create_async()
        .await;

    let (client, reporter) = mock_client(&server.url());
    let records = client.lookup_placekeys(places(2)).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].query_id.as_str(), "place_0");
    assert_eq!(records[0].placekey(), Some("@5vg-82n-kzz"));
    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("result item 1 is malformed"));
}

#[tokio::test]
async fn test_oversized_batch_makes_no_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/placekeys")
        .expect(0)
        .create_async()
        .await;

    let (client, _) = mock_client(&server.url());
    let options = BatchOptions::default().with_batch_size(101);
    let err = client
        .lookup_placekeys_with(places(3), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, LookupError::Validation(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_input_makes_no_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/placekeys")
        .expect(0)
        .create_async()
        .await;

    let (client, _) = mock_client(&server.url());
    assert!(client.lookup_placekeys(Vec::new()).await.unwrap().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_verbose_run_reports_progress() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/placekeys")
        .with_status(200)
        .with_body(resolved(0, 3).to_string())
        .create_async()
        .await;

    let (client, reporter) = mock_client(&server.url());
    let options = BatchOptions::default().with_verbosity(Verbosity::Verbose);
    client.lookup_placekeys_with(places(3), &options).await.unwrap();

    assert_eq!(
        reporter.infos(),
        vec!["Processed 3 items".to_string(), "Done".to_string()]
    );
}

#[tokio::test]
async fn test_lookup_batch_sends_one_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/placekeys")
        .match_body(Matcher::PartialJson(json!({"options": {"fields": ["address_placekey"]}})))
        .with_status(200)
        .with_body(resolved(0, 3).to_string())
        .expect(1)
        .create_async()
        .await;

    let (client, _) = mock_client(&server.url());
    let fields = vec!["address_placekey".to_string()];
    let records = client.lookup_batch(places(3), Some(&fields)).await.unwrap();

    assert_eq!(records.len(), 3);
    mock.assert_async().await;
}
