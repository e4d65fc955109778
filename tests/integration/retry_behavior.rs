//! Integration tests for retry behaviour on rate-limited and transient responses

use mockito::Server;
use placekey_client::batch::BatchOptions;
use placekey_client::{LookupError, PlacekeyClient, Query, Verbosity};
use std::sync::Arc;

use crate::common::{mock_config, places, resolved, CapturingReporter};

#[tokio::test]
async fn test_bulk_retries_after_429() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("POST", "/v1/placekeys")
        .with_status(429)
        .with_body(r#"{"message":"Too Many Requests"}"#)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/v1/placekeys")
        .with_status(200)
        .with_body(resolved(0, 3).to_string())
        .expect(1)
        .create_async()
        .await;

    let reporter = Arc::new(CapturingReporter::default());
    let client = PlacekeyClient::with_reporter(mock_config(&server.url()), reporter.clone()).unwrap();
    let options = BatchOptions::default().with_verbosity(Verbosity::Verbose);
    let records = client.lookup_placekeys_with(places(3), &options).await.unwrap();

    assert_eq!(records.len(), 3);
    limited.assert_async().await;
    ok.assert_async().await;

    let infos = reporter.infos();
    assert!(infos[0].starts_with("Retrying (attempt 1/20) after rate limit exceeded"));
    assert!(infos[1].contains("Retry attempt 2/20 succeeded"));
    assert!(reporter.errors().is_empty());
}

#[tokio::test]
async fn test_bulk_gives_up_after_max_retries() {
    let mut server = Server::new_async().await;
    let unavailable = server
        .mock("POST", "/v1/placekeys")
        .with_status(503)
        .with_body("Service Unavailable")
        .expect(3)
        .create_async()
        .await;

    let reporter = Arc::new(CapturingReporter::default());
    let config = mock_config(&server.url()).with_max_retries(3);
    let client = PlacekeyClient::with_reporter(config, reporter.clone()).unwrap();
    let records = client.lookup_placekeys(places(3)).await.unwrap();

    assert!(records.is_empty());
    unavailable.assert_async().await;

    let errors = reporter.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("[FAILED] bulk lookup gave up after 3 attempts"));
    assert!(errors[0].contains("--max-retries (current: 3)"));
    assert_eq!(
        errors[1],
        "Fatal error encountered. Returning processed items at size 0 of 3"
    );
}

#[tokio::test]
async fn test_single_retries_gateway_timeout() {
    let mut server = Server::new_async().await;
    let timeout = server
        .mock("POST", "/v1/placekey")
        .with_status(504)
        .expect(2)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/v1/placekey")
        .with_status(200)
        .with_body(r#"{"query_id":"0","placekey":"@5vg-82n-kzz"}"#)
        .expect(1)
        .create_async()
        .await;

    let reporter = Arc::new(CapturingReporter::default());
    let client = PlacekeyClient::with_reporter(mock_config(&server.url()), reporter).unwrap();
    let query = Query::new()
        .with_field("latitude", 37.7371)
        .with_field("longitude", -122.44283);
    let record = client.lookup_placekey(query, None).await.unwrap().unwrap();

    assert_eq!(record.placekey(), Some("@5vg-82n-kzz"));
    timeout.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_single_exhaustion_is_an_error() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("POST", "/v1/placekey")
        .with_status(429)
        .expect(2)
        .create_async()
        .await;

    let config = mock_config(&server.url()).with_max_retries(2);
    let client = PlacekeyClient::with_reporter(config, Arc::new(CapturingReporter::default())).unwrap();
    let err = client
        .lookup_placekey(Query::new().with_field("city", "Sonora"), None)
        .await
        .unwrap_err();

    match err {
        LookupError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, LookupError::RateLimitExceeded { .. }));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    limited.assert_async().await;
}

#[tokio::test]
async fn test_connection_failure_is_retried() {
    // Nothing listens on the discard port of localhost.
    let config = mock_config("http://127.0.0.1:9").with_max_retries(2);
    let reporter = Arc::new(CapturingReporter::default());
    let client = PlacekeyClient::with_reporter(config, reporter.clone()).unwrap();

    let err = client
        .lookup_placekey(Query::new().with_field("city", "Sonora"), None)
        .await
        .unwrap_err();

    match err {
        LookupError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, LookupError::TransientService(_)));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(reporter.errors().len(), 1);
}
