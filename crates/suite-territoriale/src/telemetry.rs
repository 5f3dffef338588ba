use crate::config::TelemetryConfig;
use serde_json::Value;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(
                    f,
                    "invalid log level/filter '{}': unable to build EnvFilter",
                    value
                )
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::EnvFilter {
                value: config.log_level.clone(),
                source,
            })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Severity attached to captured messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Warning,
    Error,
}

/// Error-tracking collaborator handed to the HTTP layer at startup.
///
/// `flush` is the teardown hook and runs once when the server shuts down.
pub trait ErrorReporter: Send + Sync {
    fn capture_message(&self, level: ReportLevel, message: &str, extra: &Value);
    fn capture_error(&self, error: &(dyn std::error::Error + 'static), extra: &Value);
    fn flush(&self) {}
}

/// Reporter forwarding captured events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn capture_message(&self, level: ReportLevel, message: &str, extra: &Value) {
        match level {
            ReportLevel::Warning => tracing::warn!(%extra, "{message}"),
            ReportLevel::Error => tracing::error!(%extra, "{message}"),
        }
    }

    fn capture_error(&self, error: &(dyn std::error::Error + 'static), extra: &Value) {
        tracing::error!(%extra, error = %error, "captured error");
    }

    fn flush(&self) {
        tracing::debug!("error reporter flushed");
    }
}
