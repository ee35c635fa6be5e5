//! Coordinated graceful shutdown
//!
//! `Running → Draining → Stopped`. Entering `Draining` first withdraws
//! readiness (`shutting_down = true`, then `ready = false`) and only then
//! starts tearing components down, all of them in parallel under one shared
//! deadline. Every registered component contributes exactly one outcome.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::metrics::{SharedMetrics, OUTCOME_ERROR, OUTCOME_OK, OUTCOME_TIMEOUT};
use crate::health::HealthRegistry;
use crate::logging::{Field, Logger};

/// Errors a component can report from its teardown
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("component panicked: {0}")]
    Panicked(String),
}

/// A long-running component that can be stopped
#[async_trait]
pub trait Shutdown: Send + Sync {
    fn name(&self) -> &str;

    /// Stop the component, finishing by `deadline` if at all possible
    async fn shutdown(&self, deadline: Instant) -> Result<(), ComponentError>;
}

/// How one component's teardown ended
#[derive(Debug)]
pub struct ShutdownOutcome {
    pub component: String,
    pub error: Option<ComponentError>,
    /// Still running when the shared deadline expired; it was left to finish
    /// (or be killed by process exit) on its own
    pub timed_out: bool,
}

impl ShutdownOutcome {
    fn completed(component: String) -> Self {
        Self {
            component,
            error: None,
            timed_out: false,
        }
    }

    fn failed(component: String, error: ComponentError) -> Self {
        Self {
            component,
            error: Some(error),
            timed_out: false,
        }
    }

    fn timed_out(component: String) -> Self {
        Self {
            component,
            error: None,
            timed_out: true,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && !self.timed_out
    }
}

/// Returned by `ShutdownReport::into_result` when any component did not stop cleanly
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("components did not stop cleanly: {}", failed.join(", "))]
    Incomplete { failed: Vec<String> },
}

/// All outcomes of one coordinated shutdown, in registration order
#[derive(Debug, Default)]
pub struct ShutdownReport {
    outcomes: Vec<ShutdownOutcome>,
}

impl ShutdownReport {
    pub fn outcomes(&self) -> &[ShutdownOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, component: &str) -> Option<&ShutdownOutcome> {
        self.outcomes.iter().find(|o| o.component == component)
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(ShutdownOutcome::is_ok)
    }

    pub fn failed_components(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.component.as_str())
            .collect()
    }

    pub fn into_result(self) -> Result<(), ShutdownError> {
        if self.is_clean() {
            return Ok(());
        }
        Err(ShutdownError::Incomplete {
            failed: self
                .failed_components()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }
}

/// Lifecycle phase of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Stopped,
}

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const STOPPED: u8 = 2;

pub struct ShutdownCoordinator {
    registry: Arc<HealthRegistry>,
    components: Vec<Arc<dyn Shutdown>>,
    timeout: Duration,
    logger: Logger,
    metrics: Option<SharedMetrics>,
    phase: AtomicU8,
}

impl ShutdownCoordinator {
    /// Create a coordinator that drains within `timeout` of being triggered
    pub fn new(registry: Arc<HealthRegistry>, timeout: Duration, logger: Logger) -> Self {
        Self {
            registry,
            components: Vec::new(),
            timeout,
            logger,
            metrics: None,
            phase: AtomicU8::new(RUNNING),
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add a component to be stopped on drain
    pub fn register(&mut self, component: Arc<dyn Shutdown>) {
        self.components.push(component);
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Acquire) {
            RUNNING => Phase::Running,
            DRAINING => Phase::Draining,
            _ => Phase::Stopped,
        }
    }

    /// Withdraw readiness, then stop every component under one deadline
    ///
    /// Only the first call does anything; later or concurrent calls return
    /// `None` immediately. The first call returns once every component has
    /// finished or the deadline has passed.
    pub async fn drain(&self) -> Option<ShutdownReport> {
        if self
            .phase
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.logger
                .debug("Shutdown already triggered, ignoring duplicate trigger", &[]);
            return None;
        }

        let deadline = Instant::now() + self.timeout;

        // Both flag writes must be visible before any teardown starts.
        self.registry.set_shutting_down(true);
        self.registry.set_ready(false);
        if let Some(metrics) = &self.metrics {
            metrics.observe_flags(false, true);
        }

        self.logger.info(
            "Readiness withdrawn, stopping components",
            &[
                Field::new("components", self.components.len()),
                Field::new("timeout", self.timeout),
            ],
        );

        let handles: Vec<_> = self
            .components
            .iter()
            .map(|component| {
                let component = Arc::clone(component);
                let name = component.name().to_string();
                let handle = tokio::spawn(async move { component.shutdown(deadline).await });
                (name, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            // A handle dropped on timeout detaches the task rather than aborting it.
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(Ok(()))) => ShutdownOutcome::completed(name),
                Ok(Ok(Err(e))) => ShutdownOutcome::failed(name, e),
                Ok(Err(e)) => ShutdownOutcome::failed(name, ComponentError::Panicked(e.to_string())),
                Err(_) => ShutdownOutcome::timed_out(name),
            };
            self.record(&outcome);
            outcomes.push(outcome);
        }

        self.phase.store(STOPPED, Ordering::Release);
        Some(ShutdownReport { outcomes })
    }

    fn record(&self, outcome: &ShutdownOutcome) {
        let label = match (&outcome.error, outcome.timed_out) {
            (_, true) => {
                self.logger.error(
                    "Component did not stop before shutdown deadline",
                    &[Field::new("component", outcome.component.as_str())],
                );
                OUTCOME_TIMEOUT
            }
            (Some(e), false) => {
                self.logger.error(
                    "Component shutdown failed",
                    &[
                        Field::new("component", outcome.component.as_str()),
                        Field::error(e),
                    ],
                );
                OUTCOME_ERROR
            }
            (None, false) => {
                self.logger.info(
                    "Component stopped",
                    &[Field::new("component", outcome.component.as_str())],
                );
                OUTCOME_OK
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_shutdown_outcome(label);
        }
    }
}
