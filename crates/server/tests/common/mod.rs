//! Common test utilities for API testing with a mock daemon.
//!
//! This module provides a test fixture that creates an in-process router
//! over a real `SyncEngine` backed by `MockTorrentClient`, so every endpoint
//! can be driven without a qBittorrent instance.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use qbdeck_core::testing::MockTorrentClient;
use qbdeck_core::{Config, QBittorrentConfig, ServerConfig, SyncConfig, SyncEngine};
use qbdeck_server::state::AppState;

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use qbdeck_core::testing::fixtures;

/// Test fixture for API testing with a mock daemon.
///
/// The engine is not started: tests call [`TestFixture::sync`] to run one
/// poll, which keeps every assertion deterministic.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_list() {
///     let fixture = TestFixture::new().await;
///     fixture.client.upsert("H1", fixtures::named("Debian")).await;
///     fixture.sync().await;
///
///     let response = fixture.get("/api/v1/torrents").await;
///     assert_eq!(response.body["total"], 1);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock daemon - seed torrents, inject failures, inspect calls
    pub client: Arc<MockTorrentClient>,
    /// The engine behind the router
    pub engine: Arc<SyncEngine>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let client = Arc::new(MockTorrentClient::new());

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
                ui_dir: None,
            },
            qbittorrent: QBittorrentConfig {
                url: "http://127.0.0.1:8081".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
                timeout_secs: 5,
            },
            sync: SyncConfig {
                delete_files_by_default: test_config.delete_files_by_default,
                ..Default::default()
            },
        };

        let engine = Arc::new(SyncEngine::new(config.sync.clone(), client.clone()));
        let state = Arc::new(AppState::new(config, Arc::clone(&engine)));
        let router = qbdeck_server::api::create_router(state);

        Self {
            router,
            client,
            engine,
        }
    }

    /// Run one poll against the mock daemon.
    pub async fn sync(&self) {
        self.engine.poll_once().await.expect("Poll failed");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// What a delete with `files: "default"` does
    pub delete_files_by_default: bool,
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
