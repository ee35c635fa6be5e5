//! Tests for the health and metrics endpoints

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::http::*;
use super::metrics::create_metrics;
use super::shutdown::{shutdown_channel, ShutdownController};
use crate::health::{CheckError, Checker, HealthRegistry};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct FailingChecker;

#[async_trait]
impl Checker for FailingChecker {
    fn name(&self) -> &str {
        "certificate"
    }

    async fn check(&self, _deadline: Instant) -> Result<(), CheckError> {
        Err(CheckError::Unhealthy("cert expired".to_string()))
    }
}

struct TestServer {
    addr: SocketAddr,
    controller: ShutdownController,
    handle: JoinHandle<Result<(), std::io::Error>>,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .expect("Failed to connect to health server")
    }
}

/// Start a server on an ephemeral port
///
/// The listener is bound before returning, so requests can be sent immediately.
async fn start_server(registry: Arc<HealthRegistry>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let metrics = create_metrics().unwrap();
    let state = ServerState::new(registry, metrics, Duration::from_secs(1));
    let (controller, signal) = shutdown_channel();

    let handle = tokio::spawn(serve(listener, state, signal));

    TestServer {
        addr,
        controller,
        handle,
        client: reqwest::Client::new(),
    }
}

/// Test that /healthz returns 200 and the JSON report when healthy
#[tokio::test]
async fn test_healthz_returns_200_when_healthy() {
    let registry = Arc::new(HealthRegistry::new());
    registry.set_ready(true);
    let server = start_server(registry).await;

    let response = server.get("/healthz").await;

    assert_eq!(response.status(), 200, "Liveness probe should return 200");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ready"], true);
    assert_eq!(body["shutting_down"], false);
    assert!(body["timestamp"].is_string());
    assert!(body["checks"].as_object().unwrap().is_empty());

    server.handle.abort();
}

/// Test that /healthz returns 503 with the report when a checker fails
#[tokio::test]
async fn test_healthz_returns_503_when_checker_fails() {
    let registry = Arc::new(HealthRegistry::new());
    registry.register(Arc::new(FailingChecker));
    let server = start_server(registry).await;

    let response = server.get("/healthz").await;

    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["certificate"]["error"], "cert expired");

    server.handle.abort();
}

/// Test that /healthz returns 503 while shutting down even if all checks pass
#[tokio::test]
async fn test_healthz_returns_503_when_shutting_down() {
    let registry = Arc::new(HealthRegistry::new());
    registry.set_shutting_down(true);
    let server = start_server(registry).await;

    let response = server.get("/healthz").await;

    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["shutting_down"], true);

    server.handle.abort();
}

/// Test that /readyz returns 503 "not ready" before startup completes
#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let registry = Arc::new(HealthRegistry::new());
    let server = start_server(registry).await;

    let response = server.get("/readyz").await;

    assert_eq!(
        response.status(),
        503,
        "Readiness probe should return 503 when not ready"
    );
    assert_eq!(response.text().await.unwrap(), "not ready");

    server.handle.abort();
}

/// Test that /readyz returns 200 "ready" once ready
#[tokio::test]
async fn test_readyz_returns_200_when_ready() {
    let registry = Arc::new(HealthRegistry::new());
    registry.set_ready(true);
    let server = start_server(registry).await;

    let response = server.get("/readyz").await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ready");

    server.handle.abort();
}

/// Test that /readyz reports "shutting down" regardless of readiness or checks
#[tokio::test]
async fn test_readyz_shutting_down_takes_precedence() {
    let registry = Arc::new(HealthRegistry::new());
    registry.register(Arc::new(FailingChecker));
    registry.set_ready(true);
    registry.set_shutting_down(true);
    let server = start_server(registry).await;

    let response = server.get("/readyz").await;

    assert_eq!(response.status(), 503);
    assert_eq!(response.text().await.unwrap(), "shutting down");

    server.handle.abort();
}

/// Test that /metrics exposes health gauges after a probe
#[tokio::test]
async fn test_metrics_endpoint_serves_prometheus_text() {
    let registry = Arc::new(HealthRegistry::new());
    let server = start_server(registry).await;
    server.get("/healthz").await;

    let response = server.get("/metrics").await;

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let body = response.text().await.unwrap();
    assert!(body.contains("tunnel_health_status 1"));

    server.handle.abort();
}

/// Test that the server stops when its shutdown signal fires
#[tokio::test]
async fn test_server_stops_on_shutdown_signal() {
    let registry = Arc::new(HealthRegistry::new());
    let server = start_server(registry).await;

    server.controller.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), server.handle)
        .await
        .expect("server should stop after shutdown signal")
        .unwrap();
    assert!(result.is_ok());
}
