//! Shared helpers for integration tests

#![allow(dead_code)]

use placekey_client::{ClientConfig, PlacekeyClient, Query, Reporter};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const API_KEY: &str = "test-api-key";

/// Reporter that keeps every message
#[derive(Debug, Default)]
pub struct CapturingReporter {
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl CapturingReporter {
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Reporter for CapturingReporter {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Config pointing at a mock server, with millisecond backoff
pub fn mock_config(server_url: &str) -> ClientConfig {
    ClientConfig::new(API_KEY)
        .with_endpoints(
            format!("{server_url}/v1/placekey"),
            format!("{server_url}/v1/placekeys"),
        )
        .with_backoff_unit(Duration::from_millis(5))
}

pub fn mock_client(server_url: &str) -> (PlacekeyClient, Arc<CapturingReporter>) {
    let reporter = Arc::new(CapturingReporter::default());
    let client = PlacekeyClient::with_reporter(mock_config(server_url), reporter.clone()).unwrap();
    (client, reporter)
}

/// `n` coordinate queries without ids
pub fn places(n: usize) -> Vec<Query> {
    (0..n)
        .map(|i| {
            Query::new()
                .with_field("latitude", 37.0 + i as f64 / 1000.0)
                .with_field("longitude", -122.0)
        })
        .collect()
}

/// Resolved records for `place_<start>..place_<end>`
pub fn resolved(start: usize, end: usize) -> Value {
    Value::Array(
        (start..end)
            .map(|i| json!({"query_id": format!("place_{i}"), "placekey": "@5vg-82n-kzz"}))
            .collect(),
    )
}
