//! HTTP server for health and metrics endpoints, and graceful shutdown
//!
//! Provides Kubernetes health probes:
//! - `/healthz` - Liveness probe (all checkers passing, not draining)
//! - `/readyz` - Readiness probe (instance should receive traffic)
//!
//! Also provides coordinated shutdown of long-running components on
//! SIGTERM/SIGINT.

pub mod component;
pub mod coordinator;
mod http;
pub mod metrics;
pub mod shutdown;
pub mod status;

pub use component::TaskComponent;
pub use coordinator::{
    ComponentError, Phase, Shutdown, ShutdownCoordinator, ShutdownError, ShutdownOutcome,
    ShutdownReport,
};
pub use http::{build_router, run_health_server, serve, ServerState};
pub use metrics::{create_metrics, Metrics, SharedMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};
pub use status::{liveness, readiness, ProbeBody, ProbeResponse};

#[cfg(test)]
#[path = "http_test.rs"]
mod http_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_tests;
