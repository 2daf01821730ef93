//! Common test utilities for API testing with mocks.
//!
//! Builds an in-process router over real SQLite stores in a temp dir, with
//! the tracker and download backends replaced by controllable mocks.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use ptpilot_core::testing::{MockConnector, MockTracker};
use ptpilot_core::{
    load_config_from_str, BackendPool, Config, DirectoryStore, Engine, EngineSettings, JobContext,
    LifecycleStore, SqliteDirectoryStore, SqliteLifecycleStore,
};
use ptpilot_server::{create_router, AppState};

/// Re-export fixtures for test convenience
pub use ptpilot_core::testing::fixtures;

/// In-process server with mock tracker and backends.
pub struct TestFixture {
    pub router: Router,
    pub engine: Arc<Engine>,
    pub tracker: Arc<MockTracker>,
    pub connector: Arc<MockConnector>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_toml("").await
    }

    /// Build a fixture from extra TOML appended to a minimal config.
    pub async fn with_toml(extra: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let toml = format!(
            "[server]\nhost = \"127.0.0.1\"\nport = 8080\n\n[database]\npath = {:?}\n\n{}",
            db_path.display().to_string(),
            extra
        );
        let config: Config = load_config_from_str(&toml).expect("Failed to parse test config");

        let directory: Arc<dyn DirectoryStore> = Arc::new(
            SqliteDirectoryStore::new(&db_path).expect("Failed to create directory store"),
        );
        let lifecycle: Arc<dyn LifecycleStore> = Arc::new(
            SqliteLifecycleStore::new(&db_path).expect("Failed to create lifecycle store"),
        );

        let tracker = Arc::new(MockTracker::new());
        let connector = Arc::new(MockConnector::new());

        let ctx = Arc::new(JobContext::new(
            directory,
            lifecycle,
            Arc::clone(&tracker) as Arc<dyn ptpilot_core::TrackerClient>,
            Arc::new(BackendPool::new(
                Arc::clone(&connector) as Arc<dyn ptpilot_core::downloader::BackendConnector>
            )),
            EngineSettings::from_config(&config),
        ));
        // Loops are not started; jobs run through the API.
        let engine = Arc::new(Engine::new(ctx));

        let state = Arc::new(AppState::new(config, Arc::clone(&engine)));
        let router = create_router(state);

        Self {
            router,
            engine,
            tracker,
            connector,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Raw text body, for endpoints that are not JSON.
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
