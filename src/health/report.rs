//! Aggregated health report and its JSON wire shape
//!
//! ```json
//! {
//!   "status": "unhealthy",
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "ready": true,
//!   "shutting_down": false,
//!   "checks": { "certificate": { "status": "unhealthy", "error": "cert expired" } }
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::checker::CheckError;

/// Overall or per-checker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Outcome of one checker invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub healthy: bool,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            error: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, error: &CheckError) -> Self {
        Self {
            name: name.into(),
            healthy: false,
            error: Some(error.to_string()),
        }
    }

    pub fn status(&self) -> HealthStatus {
        if self.healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

// The name is the key in `checks`, so only status and error go on the wire.
impl Serialize for CheckResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.error.is_some() { 2 } else { 1 };
        let mut state = serializer.serialize_struct("CheckResult", len)?;
        state.serialize_field("status", &self.status())?;
        if let Some(error) = &self.error {
            state.serialize_field("error", error)?;
        } else {
            state.skip_field("error")?;
        }
        state.end()
    }
}

/// Snapshot of instance health, produced fresh by every `HealthRegistry::check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub ready: bool,
    pub shutting_down: bool,
    pub checks: BTreeMap<String, CheckResult>,
}

impl HealthReport {
    /// Fold individual results into a report; any failure makes it unhealthy
    pub fn from_results(
        timestamp: DateTime<Utc>,
        ready: bool,
        shutting_down: bool,
        results: impl IntoIterator<Item = CheckResult>,
    ) -> Self {
        let checks: BTreeMap<String, CheckResult> = results
            .into_iter()
            .map(|result| (result.name.clone(), result))
            .collect();

        let status = if checks.values().all(|r| r.healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        Self {
            status,
            timestamp,
            ready,
            shutting_down,
            checks,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Names of the checkers that failed, in key order
    pub fn failing(&self) -> impl Iterator<Item = &str> {
        self.checks
            .values()
            .filter(|r| !r.healthy)
            .map(|r| r.name.as_str())
    }
}

fn serialize_rfc3339<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}
