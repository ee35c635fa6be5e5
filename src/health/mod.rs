//! Health aggregation
//!
//! Checkers are registered once at startup. Every `/healthz` probe runs all of
//! them under a single deadline and folds the outcomes into a `HealthReport`.

pub mod checker;
pub mod clock;
mod registry;
pub mod report;

pub use checker::{CertificateChecker, CheckError, Checker, TunnelConnectionChecker};
pub use clock::{Clock, SystemClock};
pub use registry::{HealthRegistry, HealthState};
pub use report::{CheckResult, HealthReport, HealthStatus};

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_tests;
