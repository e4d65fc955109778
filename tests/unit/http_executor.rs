//! Unit tests for the HTTP executor's status classification

use mockito::{Matcher, Server};
use placekey_client::batch::{Channel, LookupError};
use placekey_client::transport::http::Endpoints;
use placekey_client::transport::shared_resources::build_http_client;
use placekey_client::transport::{bulk_payload, HttpExecutor, RequestExecutor, RequestOutcome};
use placekey_client::{Query, TracingReporter};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn executor(server_url: &str) -> HttpExecutor {
    let http = build_http_client(Duration::from_secs(2), Duration::from_secs(5)).unwrap();
    HttpExecutor::new(
        http,
        Endpoints {
            single: format!("{server_url}/v1/placekey"),
            bulk: format!("{server_url}/v1/placekeys"),
        },
        "unit-key",
        "placekey-rs/0.1.0 unit",
        Arc::new(TracingReporter),
    )
    .unwrap()
}

fn payload() -> serde_json::Value {
    bulk_payload(
        &[Query::new().with_field("city", "Sonora").with_query_id("place_0")],
        None,
    )
}

#[tokio::test]
async fn test_headers_and_body_are_sent() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/placekeys")
        .match_header("apikey", "unit-key")
        .match_header("user-agent", "placekey-rs/0.1.0 unit")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"queries": [{"query_id": "place_0", "city": "Sonora"}]})))
        .with_status(200)
        .with_body(r#"[{"query_id":"place_0","placekey":"@5vg-82n-kzz"}]"#)
        .expect(1)
        .create_async()
        .await;

    let outcome = executor(&server.url())
        .execute(Channel::Bulk, &payload())
        .await
        .unwrap();

    match outcome {
        RequestOutcome::Items(records) => assert_eq!(records[0].placekey(), Some("@5vg-82n-kzz")),
        other => panic!("expected items, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_429_is_rate_limited() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/placekeys")
        .with_status(429)
        .create_async()
        .await;

    let err = executor(&server.url())
        .execute(Channel::Bulk, &payload())
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::RateLimitExceeded { channel: Channel::Bulk }));
}

#[tokio::test]
async fn test_503_and_504_are_transient() {
    for status in [503, 504] {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/placekey")
            .with_status(status)
            .create_async()
            .await;

        let err = executor(&server.url())
            .execute(Channel::Single, &json!({"query": {"city": "Sonora"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::TransientService(_)), "status {status}");
        assert!(err.is_retryable());
        assert!(err.to_string().contains(&status.to_string()));
    }
}

#[tokio::test]
async fn test_502_with_html_degrades_to_empty_items() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/placekeys")
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let outcome = executor(&server.url())
        .execute(Channel::Bulk, &payload())
        .await
        .unwrap();
    assert_eq!(outcome, RequestOutcome::Items(Vec::new()));
}

#[tokio::test]
async fn test_error_object_is_single_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/placekeys")
        .with_status(400)
        .with_body(r#"{"error":"Invalid query"}"#)
        .create_async()
        .await;

    let outcome = executor(&server.url())
        .execute(Channel::Bulk, &payload())
        .await
        .unwrap();
    assert_eq!(outcome, RequestOutcome::SingleError { error: json!("Invalid query") });
}

#[tokio::test]
async fn test_request_timeout_is_transient() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/placekeys")
        .with_status(200)
        .with_chunked_body(|writer| {
            std::thread::sleep(Duration::from_millis(500));
            writer.write_all(b"[]")
        })
        .create_async()
        .await;

    let http = build_http_client(Duration::from_secs(1), Duration::from_millis(100)).unwrap();
    let executor = HttpExecutor::new(
        http,
        Endpoints {
            single: format!("{}/v1/placekey", server.url()),
            bulk: format!("{}/v1/placekeys", server.url()),
        },
        "unit-key",
        "placekey-rs/0.1.0",
        Arc::new(TracingReporter),
    )
    .unwrap();

    let err = executor.execute(Channel::Bulk, &payload()).await.unwrap_err();
    assert!(matches!(err, LookupError::TransientService(_)));
}
