//! Health and metrics endpoints
//!
//! - `/healthz` - Liveness: are all checkers passing and the instance not draining?
//! - `/readyz` - Readiness: should traffic be routed here?
//! - `/metrics` - Prometheus metrics in text format

use crate::health::HealthRegistry;
use crate::server::metrics::SharedMetrics;
use crate::server::shutdown::ShutdownSignal;
use crate::server::status::{self, ProbeResponse};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::info;

/// Shared state for the health and metrics endpoints
#[derive(Clone)]
pub struct ServerState {
    registry: Arc<HealthRegistry>,
    metrics: SharedMetrics,
    check_timeout: Duration,
}

impl ServerState {
    /// `check_timeout` bounds how long one `/healthz` request waits on checkers
    pub fn new(registry: Arc<HealthRegistry>, metrics: SharedMetrics, check_timeout: Duration) -> Self {
        Self {
            registry,
            metrics,
            check_timeout,
        }
    }
}

/// Liveness probe handler
///
/// Runs every checker; returns the full report as JSON with 200 or 503.
async fn healthz(State(state): State<ServerState>) -> ProbeResponse {
    let report = state
        .registry
        .check(Instant::now() + state.check_timeout)
        .await;
    state.metrics.observe_report(&report);

    status::liveness(report, state.registry.is_shutting_down())
}

/// Readiness probe handler
async fn readyz(State(state): State<ServerState>) -> ProbeResponse {
    let flags = state.registry.state();
    state.metrics.observe_flags(flags.ready, flags.shutting_down);

    status::readiness(flags.shutting_down, flags.ready)
}

/// Prometheus metrics handler
async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Build the router for health and metrics endpoints
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(self::metrics))
        .with_state(state)
}

/// Serve health and metrics on an already-bound listener
///
/// Returns once `shutdown` fires and in-flight requests have completed.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let app = build_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Health and metrics server listening (HTTP)");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.recv())
        .await
}

/// Bind `addr` and serve until `shutdown` fires
pub async fn run_health_server(
    addr: SocketAddr,
    state: ServerState,
    shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}
