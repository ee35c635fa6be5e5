//! Checker registry and readiness/shutdown flags
//!
//! One `RwLock` guards the checker set and both flags. Probes take the read
//! side; registration and flag updates take the write side. `check` snapshots
//! the checker set and the flags under a single read guard, then runs the
//! checkers with the lock released so a slow checker never delays a flag write.

use super::checker::{CheckError, Checker};
use super::clock::{Clock, SystemClock};
use super::report::{CheckResult, HealthReport};
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Readiness and shutdown flags read under one lock acquisition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthState {
    pub ready: bool,
    pub shutting_down: bool,
}

#[derive(Default)]
struct Inner {
    checkers: HashMap<String, Arc<dyn Checker>>,
    ready: bool,
    shutting_down: bool,
}

/// Process-wide health state shared by probes and the shutdown coordinator
///
/// Starts with no checkers, `ready = false` and `shutting_down = false`.
pub struct HealthRegistry {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a registry that stamps reports using the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    // Flag state is plain data that is never left half-written, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a checker under its name, replacing any previous one
    pub fn register(&self, checker: Arc<dyn Checker>) {
        let name = checker.name().to_string();
        debug!(checker = %name, "Registering health checker");
        self.write().checkers.insert(name, checker);
    }

    pub fn set_ready(&self, ready: bool) {
        self.write().ready = ready;
    }

    pub fn set_shutting_down(&self, shutting_down: bool) {
        self.write().shutting_down = shutting_down;
    }

    pub fn is_ready(&self) -> bool {
        self.read().ready
    }

    pub fn is_shutting_down(&self) -> bool {
        self.read().shutting_down
    }

    /// Both flags as one consistent snapshot
    pub fn state(&self) -> HealthState {
        let inner = self.read();
        HealthState {
            ready: inner.ready,
            shutting_down: inner.shutting_down,
        }
    }

    /// Names of all registered checkers, sorted
    pub fn checker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().checkers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run every registered checker and aggregate the results
    ///
    /// Checkers run concurrently. A checker that has not answered by `deadline`
    /// is recorded as timed out and its task is aborted; a checker that panics
    /// is recorded as failed. Neither affects the other results.
    pub async fn check(&self, deadline: Instant) -> HealthReport {
        let (checkers, ready, shutting_down) = {
            let inner = self.read();
            let checkers: Vec<(String, Arc<dyn Checker>)> = inner
                .checkers
                .iter()
                .map(|(name, checker)| (name.clone(), Arc::clone(checker)))
                .collect();
            (checkers, inner.ready, inner.shutting_down)
        };
        let timestamp = self.clock.now();

        let results = join_all(
            checkers
                .into_iter()
                .map(|(name, checker)| run_checker(name, checker, deadline)),
        )
        .await;

        HealthReport::from_results(timestamp, ready, shutting_down, results)
    }
}

async fn run_checker(name: String, checker: Arc<dyn Checker>, deadline: Instant) -> CheckResult {
    let mut handle = tokio::spawn(async move { checker.check(deadline).await });

    let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(checker = %name, error = %e, "Health checker panicked");
            Err(CheckError::Panicked)
        }
        Err(_) => {
            handle.abort();
            warn!(checker = %name, "Health checker did not respond before deadline");
            Err(CheckError::TimedOut)
        }
    };

    match outcome {
        Ok(()) => CheckResult::healthy(name),
        Err(e) => CheckResult::unhealthy(name, &e),
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        let mut names: Vec<&String> = inner.checkers.keys().collect();
        names.sort();
        f.debug_struct("HealthRegistry")
            .field("checkers", &names)
            .field("ready", &inner.ready)
            .field("shutting_down", &inner.shutting_down)
            .finish()
    }
}
