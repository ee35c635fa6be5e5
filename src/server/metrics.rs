//! Prometheus metrics served on `/metrics`
//!
//! All collectors live in a private `Registry` so tests can create as many
//! independent instances as they like.

use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::health::HealthReport;

/// Shared handle passed to the HTTP server and shutdown coordinator
pub type SharedMetrics = Arc<Metrics>;

/// Outcome label values for `tunnel_shutdown_outcomes_total`
pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_ERROR: &str = "error";
pub const OUTCOME_TIMEOUT: &str = "timeout";

pub struct Metrics {
    registry: Registry,
    health_status: IntGauge,
    ready: IntGauge,
    shutting_down: IntGauge,
    check_failures: IntCounterVec,
    certificate_expiry: Gauge,
    shutdown_outcomes: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let health_status = IntGauge::new(
            "tunnel_health_status",
            "Health status (1 = healthy, 0 = unhealthy)",
        )?;
        let ready = IntGauge::new("tunnel_ready", "Readiness flag (1 = ready)")?;
        let shutting_down = IntGauge::new(
            "tunnel_shutting_down",
            "Shutdown flag (1 = draining or stopped)",
        )?;
        let check_failures = IntCounterVec::new(
            Opts::new(
                "tunnel_health_check_failures_total",
                "Total failed health checks by checker",
            ),
            &["checker"],
        )?;
        let certificate_expiry = Gauge::new(
            "tunnel_certificate_expiry_timestamp",
            "Certificate expiry as a unix timestamp",
        )?;
        let shutdown_outcomes = IntCounterVec::new(
            Opts::new(
                "tunnel_shutdown_outcomes_total",
                "Component shutdown outcomes by result",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(health_status.clone()))?;
        registry.register(Box::new(ready.clone()))?;
        registry.register(Box::new(shutting_down.clone()))?;
        registry.register(Box::new(check_failures.clone()))?;
        registry.register(Box::new(certificate_expiry.clone()))?;
        registry.register(Box::new(shutdown_outcomes.clone()))?;

        Ok(Self {
            registry,
            health_status,
            ready,
            shutting_down,
            check_failures,
            certificate_expiry,
            shutdown_outcomes,
        })
    }

    /// Record the result of a `/healthz` aggregation
    pub fn observe_report(&self, report: &HealthReport) {
        self.health_status.set(i64::from(report.is_healthy()));
        for name in report.failing() {
            self.check_failures.with_label_values(&[name]).inc();
        }
    }

    /// Record the readiness/shutdown flags seen by a probe
    pub fn observe_flags(&self, ready: bool, shutting_down: bool) {
        self.ready.set(i64::from(ready));
        self.shutting_down.set(i64::from(shutting_down));
    }

    pub fn set_certificate_expiry(&self, unix_timestamp: f64) {
        self.certificate_expiry.set(unix_timestamp);
    }

    /// Count one component shutdown outcome (`OUTCOME_*`)
    pub fn record_shutdown_outcome(&self, outcome: &str) {
        self.shutdown_outcomes.with_label_values(&[outcome]).inc();
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Create a new shared metrics registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(Metrics::new()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckError, CheckResult};
    use chrono::Utc;

    #[test]
    fn test_encode_contains_all_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_shutdown_outcome(OUTCOME_OK);
        metrics.check_failures.with_label_values(&["certificate"]);

        let text = metrics.encode().unwrap();

        for name in [
            "tunnel_health_status",
            "tunnel_ready",
            "tunnel_shutting_down",
            "tunnel_health_check_failures_total",
            "tunnel_certificate_expiry_timestamp",
            "tunnel_shutdown_outcomes_total",
        ] {
            assert!(text.contains(name), "missing metric family {}", name);
        }
    }

    #[test]
    fn test_observe_report_tracks_failures() {
        let metrics = Metrics::new().unwrap();
        let report = HealthReport::from_results(
            Utc::now(),
            true,
            false,
            vec![
                CheckResult::unhealthy("certificate", &CheckError::TimedOut),
                CheckResult::healthy("tunnel_connections"),
            ],
        );

        metrics.observe_report(&report);
        metrics.observe_report(&report);

        assert_eq!(metrics.health_status.get(), 0);
        assert_eq!(
            metrics
                .check_failures
                .with_label_values(&["certificate"])
                .get(),
            2
        );
    }

    #[test]
    fn test_observe_flags() {
        let metrics = Metrics::new().unwrap();

        metrics.observe_flags(true, false);
        assert_eq!(metrics.ready.get(), 1);
        assert_eq!(metrics.shutting_down.get(), 0);

        metrics.observe_flags(false, true);
        assert_eq!(metrics.ready.get(), 0);
        assert_eq!(metrics.shutting_down.get(), 1);
    }

    #[test]
    fn test_shutdown_outcomes_are_labelled() {
        let metrics = Metrics::new().unwrap();
        metrics.record_shutdown_outcome(OUTCOME_TIMEOUT);
        metrics.record_shutdown_outcome(OUTCOME_TIMEOUT);
        metrics.record_shutdown_outcome(OUTCOME_ERROR);

        assert_eq!(
            metrics
                .shutdown_outcomes
                .with_label_values(&[OUTCOME_TIMEOUT])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .shutdown_outcomes
                .with_label_values(&[OUTCOME_ERROR])
                .get(),
            1
        );
    }
}
