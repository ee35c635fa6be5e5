//! Structured logging
//!
//! `init_tracing` installs the process-wide subscriber. `Logger` is the handle
//! passed explicitly to the components that log: it stamps every record with the
//! service name and environment, and carries typed key/value fields.
//!
//! `Logger::fatal` records the event and hands back a `FatalError`; terminating
//! the process is left to whoever owns `main`.

use crate::config::{LogFormat, LoggingConfig};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// Parse a configured level name, falling back to `Info` for anything unknown
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }

    /// Directive understood by `EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error | Level::Fatal => "error",
        }
    }
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::parse(&config.level).as_filter()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Typed value of a structured log field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{:?}", s),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Duration(d) => write!(f, "{:?}", d),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::UInt(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

/// One key/value pair attached to a log record
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: &'static str,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: &'static str, value: impl Into<FieldValue>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Shorthand for the conventional `error` field
    pub fn error(err: &dyn fmt::Display) -> Self {
        Self::new("error", err.to_string())
    }
}

/// Renders an ordered field list as `key=value key=value`
struct Fields<'a>(&'a [Field]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", field.key, field.value)?;
        }
        Ok(())
    }
}

/// Request-scoped identifiers attached to every record from a logger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

/// Returned by `Logger::fatal`; the caller decides how to terminate
#[derive(Debug, Error)]
#[error("fatal: {message}")]
pub struct FatalError {
    pub message: String,
}

/// Logging handle passed to components that report through the log
#[derive(Debug, Clone)]
pub struct Logger {
    service: Arc<str>,
    environment: Arc<str>,
    context: LogContext,
}

impl Logger {
    pub fn new(service: &str, environment: &str) -> Self {
        Self {
            service: Arc::from(service),
            environment: Arc::from(environment),
            context: LogContext::default(),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(&config.service_name, &config.environment)
    }

    /// Copy of this logger whose records carry the given trace/span ids
    pub fn with_context(&self, context: LogContext) -> Self {
        Self {
            service: Arc::clone(&self.service),
            environment: Arc::clone(&self.environment),
            context,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn debug(&self, message: &str, fields: &[Field]) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: &[Field]) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: &str, fields: &[Field]) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: &str, fields: &[Field]) {
        self.log(Level::Error, message, fields);
    }

    /// Record a fatal event and return the error the caller should exit with
    #[must_use = "the caller is responsible for terminating after a fatal error"]
    pub fn fatal(&self, message: &str, fields: &[Field]) -> FatalError {
        self.log(Level::Fatal, message, fields);
        FatalError {
            message: message.to_string(),
        }
    }

    pub fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let fields = Fields(fields);
        let trace_id = self.context.trace_id.as_deref();
        let span_id = self.context.span_id.as_deref();

        macro_rules! emit {
            ($lvl:expr, $($extra:tt)*) => {
                tracing::event!(
                    $lvl,
                    service = %self.service,
                    environment = %self.environment,
                    trace_id,
                    span_id,
                    fields = %fields,
                    $($extra)*
                    "{}",
                    message
                )
            };
        }

        match level {
            Level::Debug => emit!(tracing::Level::DEBUG,),
            Level::Info => emit!(tracing::Level::INFO,),
            Level::Warn => emit!(tracing::Level::WARN,),
            Level::Error => emit!(tracing::Level::ERROR,),
            Level::Fatal => emit!(tracing::Level::ERROR, fatal = true,),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_falls_back_to_info() {
        assert_eq!(Level::parse("debug"), Level::Debug);
        assert_eq!(Level::parse("WARN"), Level::Warn);
        assert_eq!(Level::parse("error"), Level::Error);
        assert_eq!(Level::parse("verbose"), Level::Info);
        assert_eq!(Level::parse(""), Level::Info);
    }

    #[test]
    fn test_fatal_filters_as_error() {
        assert_eq!(Level::Fatal.as_filter(), "error");
    }

    #[test]
    fn test_fields_render_in_insertion_order() {
        let fields = [
            Field::new("component", "http"),
            Field::new("attempts", 3i64),
            Field::new("timed_out", false),
            Field::new("elapsed", Duration::from_millis(250)),
        ];

        assert_eq!(
            Fields(&fields).to_string(),
            r#"component="http" attempts=3 timed_out=false elapsed=250ms"#
        );
    }

    #[test]
    fn test_field_values_keep_their_type() {
        assert_eq!(Field::new("n", 7usize).value, FieldValue::UInt(7));
        assert_eq!(Field::new("n", -7i32).value, FieldValue::Int(-7));
        assert_eq!(Field::new("ratio", 0.5).value, FieldValue::Float(0.5));
        assert_eq!(
            Field::error(&"boom").value,
            FieldValue::Str("boom".to_string())
        );
    }

    #[test]
    fn test_fatal_returns_error_instead_of_exiting() {
        let logger = Logger::new("tunnel-server", "test");
        let err = logger.fatal("failed to load certificate", &[Field::new("path", "/tmp/x")]);

        assert_eq!(err.message, "failed to load certificate");
        assert_eq!(err.to_string(), "fatal: failed to load certificate");
    }

    #[test]
    fn test_with_context_keeps_identity() {
        let logger = Logger::new("tunnel-server", "staging");
        let scoped = logger.with_context(LogContext {
            trace_id: Some("abc".to_string()),
            span_id: None,
        });

        assert_eq!(scoped.service(), "tunnel-server");
        assert_eq!(scoped.environment(), "staging");
        assert_eq!(scoped.context().trace_id.as_deref(), Some("abc"));
        assert_eq!(logger.context(), &LogContext::default());
    }
}
