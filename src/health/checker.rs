//! Health checker contract
//!
//! A checker is a named, pluggable probe. It reports its outcome only through
//! its return value and must give up promptly once `deadline` has passed.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::time::Instant;

/// Why a checker considers the instance unhealthy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckError {
    #[error("{0}")]
    Unhealthy(String),

    #[error("check timed out")]
    TimedOut,

    #[error("check panicked")]
    Panicked,
}

/// Point-in-time health probe
///
/// Implementations may be invoked concurrently with themselves and with
/// other checkers.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Stable, non-empty identifier used as the report key
    fn name(&self) -> &str;

    async fn check(&self, deadline: Instant) -> Result<(), CheckError>;
}

/// Certificate expiry checker
///
/// Currently reports healthy unconditionally; expiry inspection is not wired in.
#[derive(Debug, Clone)]
pub struct CertificateChecker {
    cert_file: Option<PathBuf>,
}

impl CertificateChecker {
    pub fn new(cert_file: Option<PathBuf>) -> Self {
        Self { cert_file }
    }

    pub fn cert_file(&self) -> Option<&PathBuf> {
        self.cert_file.as_ref()
    }
}

#[async_trait]
impl Checker for CertificateChecker {
    fn name(&self) -> &str {
        "certificate"
    }

    async fn check(&self, _deadline: Instant) -> Result<(), CheckError> {
        Ok(())
    }
}

/// Tunnel connection count checker
///
/// Currently reports healthy unconditionally; the tunnel does not yet publish
/// a connection count to compare against `min_connections`.
#[derive(Debug, Clone)]
pub struct TunnelConnectionChecker {
    min_connections: usize,
}

impl TunnelConnectionChecker {
    pub fn new(min_connections: usize) -> Self {
        Self { min_connections }
    }

    pub fn min_connections(&self) -> usize {
        self.min_connections
    }
}

#[async_trait]
impl Checker for TunnelConnectionChecker {
    fn name(&self) -> &str {
        "tunnel_connections"
    }

    async fn check(&self, _deadline: Instant) -> Result<(), CheckError> {
        Ok(())
    }
}
