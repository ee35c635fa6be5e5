//! Process configuration read from environment variables
//!
//! Every setting has a default so the server starts with no environment at all.
//! `Config::from_lookup` exists so tests can supply values without touching the
//! process environment (env vars race under parallel test execution).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default bind address for the health and metrics server
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Default shared deadline for coordinated shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default aggregation deadline for a single `/healthz` request
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_METRICS_ADDR: &str = "TUNNEL_METRICS_ADDR";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "TUNNEL_SHUTDOWN_TIMEOUT_SECS";
pub const ENV_CHECK_TIMEOUT: &str = "TUNNEL_CHECK_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "TUNNEL_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TUNNEL_LOG_FORMAT";
pub const ENV_ENVIRONMENT: &str = "TUNNEL_ENVIRONMENT";
pub const ENV_SERVICE_NAME: &str = "TUNNEL_SERVICE_NAME";
pub const ENV_CERT_FILE: &str = "TUNNEL_CERT_FILE";
pub const ENV_MIN_CONNECTIONS: &str = "TUNNEL_MIN_CONNECTIONS";

/// Errors that can occur while reading configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Output format for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Settings consumed by `logging::init_tracing` and `logging::Logger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub service_name: String,
    pub environment: String,
}

/// Full process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub metrics_addr: SocketAddr,
    pub shutdown_timeout: Duration,
    pub check_timeout: Duration,
    pub logging: LoggingConfig,
    /// Certificate watched by the certificate checker
    pub cert_file: Option<PathBuf>,
    /// Threshold for the tunnel connection checker
    pub min_connections: usize,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let metrics_addr = parse_or(&lookup, ENV_METRICS_ADDR, || {
            SocketAddr::from(([0, 0, 0, 0], 8080))
        })?;
        let shutdown_timeout = parse_secs(&lookup, ENV_SHUTDOWN_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT)?;
        let check_timeout = parse_secs(&lookup, ENV_CHECK_TIMEOUT, DEFAULT_CHECK_TIMEOUT)?;
        let format = parse_or(&lookup, ENV_LOG_FORMAT, || LogFormat::Text)?;
        let min_connections = parse_or(&lookup, ENV_MIN_CONNECTIONS, || 1usize)?;

        Ok(Self {
            metrics_addr,
            shutdown_timeout,
            check_timeout,
            logging: LoggingConfig {
                level: lookup(ENV_LOG_LEVEL).unwrap_or_else(|| "info".to_string()),
                format,
                service_name: lookup(ENV_SERVICE_NAME)
                    .unwrap_or_else(|| "tunnel-server".to_string()),
                environment: lookup(ENV_ENVIRONMENT)
                    .unwrap_or_else(|| "development".to_string()),
            },
            cert_file: lookup(ENV_CERT_FILE)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            min_connections,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: impl FnOnce() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default()),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_secs<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, || default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "timeout must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
