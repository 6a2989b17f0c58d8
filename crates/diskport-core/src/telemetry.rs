//! Tracing subscriber setup

use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid RUST_LOG filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to set global default subscriber: {0}")]
    AlreadyInitialized(String),

    #[error("Unknown log format: {0}")]
    UnknownFormat(String),
}

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Filter used when `RUST_LOG` is not set: diskport crates at `level`,
/// noisy dependencies at warn
pub fn default_filter(level: &str) -> String {
    format!(
        "diskport_core={level},\
         diskport_import_types={level},\
         diskport_import={level},\
         hyper=warn,\
         h2=warn,\
         reqwest=warn,\
         rustls=warn",
        level = level
    )
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes full control when set; otherwise [`default_filter`] applies.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env()
            .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?
    } else {
        EnvFilter::new(default_filter(level))
    };

    let fmt_layer = match format {
        LogFormat::Full => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}
