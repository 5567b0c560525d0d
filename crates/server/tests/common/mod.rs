//! Common test utilities for API testing with a mock scheduler.
//!
//! The fixture runs the real orchestrator over a temporary SQLite database
//! with [`MockScheduler`] standing in for Condor, and drives the router
//! in-process.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use corral_core::{
    create_history_system, HistoryStore, Orchestrator, ResourceStore, Scheduler, SqliteStore,
};
use corral_server::{api::create_router, state::AppState};

pub use corral_core::testing::{fixtures, MockScheduler};

/// In-process server with a controllable scheduler.
pub struct TestFixture {
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<MockScheduler>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with a started orchestrator.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteStore::new(&temp_dir.path().join("corral.db"))
                .expect("Failed to create store"),
        );
        let scheduler = Arc::new(MockScheduler::new());
        let config = fixtures::config(&temp_dir.path().join("work"));

        let (history, writer) = create_history_system(store.clone(), 100);
        tokio::spawn(writer.run());

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(config.clone()),
            Arc::clone(&store) as Arc<dyn ResourceStore>,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            history,
            store as Arc<dyn HistoryStore>,
        ));
        if !test_config.stopped {
            orchestrator
                .start()
                .await
                .expect("Failed to start orchestrator");
        }

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = create_router(state);

        Self {
            router,
            orchestrator,
            scheduler,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Raw text of a GET response, for non-JSON endpoints.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
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
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
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

    /// Create a site through the API and return its id.
    pub async fn create_site(&self, name: &str) -> i64 {
        let response = self
            .post(
                "/api/v1/sites",
                serde_json::to_value(fixtures::site_request(name)).unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_i64().unwrap()
    }

    /// Poll a resource until its state matches.
    pub async fn wait_for_state(&self, path: &str, state: &str) -> Value {
        let mut last = Value::Null;
        for _ in 0..500 {
            last = self.get(path).await.body;
            if last["state"] == state {
                return last;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reached {}: {}", path, state, last);
    }

    /// Id of the most recent job submitted from a directory ending in `suffix`.
    pub async fn job_for(&self, suffix: &str) -> String {
        for _ in 0..500 {
            if let Some(job_id) = self.scheduler.last_job_in(suffix) {
                return job_id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("No job submitted from {}", suffix);
    }
}

/// Credential body valid for `secs` seconds.
pub fn credential_body(secs: i64) -> Value {
    json!({
        "credential": "-----BEGIN CERTIFICATE-----\nproxy\n-----END CERTIFICATE-----\n",
        "expires_at": (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339(),
    })
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Leave the orchestrator stopped
    pub stopped: bool,
}

impl TestConfig {
    pub fn stopped() -> Self {
        Self { stopped: true }
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
