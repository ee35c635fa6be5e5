//! Mapping from health state to probe responses
//!
//! Pure functions: no locks, no I/O. The HTTP handlers gather the inputs and
//! render the result.

use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::health::HealthReport;

pub const BODY_READY: &str = "ready";
pub const BODY_NOT_READY: &str = "not ready";
pub const BODY_SHUTTING_DOWN: &str = "shutting down";

/// Body of a probe response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeBody {
    Report(HealthReport),
    Text(&'static str),
}

/// Status code and body for one probe endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub body: ProbeBody,
}

/// Liveness (`/healthz`)
///
/// 503 when any checker failed or the instance is shutting down, 200 otherwise.
/// The full report is returned either way.
pub fn liveness(report: HealthReport, shutting_down: bool) -> ProbeResponse {
    let status = if !report.is_healthy() || shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    ProbeResponse {
        status,
        body: ProbeBody::Report(report),
    }
}

/// Readiness (`/readyz`)
///
/// Shutting down takes precedence over not ready. Checker results are never
/// consulted.
pub fn readiness(shutting_down: bool, ready: bool) -> ProbeResponse {
    let (status, body) = if shutting_down {
        (StatusCode::SERVICE_UNAVAILABLE, BODY_SHUTTING_DOWN)
    } else if !ready {
        (StatusCode::SERVICE_UNAVAILABLE, BODY_NOT_READY)
    } else {
        (StatusCode::OK, BODY_READY)
    };

    ProbeResponse {
        status,
        body: ProbeBody::Text(body),
    }
}

impl IntoResponse for ProbeResponse {
    fn into_response(self) -> Response {
        match self.body {
            ProbeBody::Report(report) => (self.status, Json(report)).into_response(),
            ProbeBody::Text(text) => (
                self.status,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response(),
        }
    }
}
