//! Error types for the import pipeline

use crate::disk::{PersistentDisk, ShadowTestFields};
use diskport_core::WorkflowError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;

/// Error returned by a platform API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code, when the platform returned one
    pub code: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    /// 404 is the canonical "already gone" signal
    pub fn is_not_found(&self) -> bool {
        self.code == Some(404)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "API error {}: {}", code, self.message),
            None => write!(f, "API error: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Errors that can occur during import operations
#[derive(Error, Debug)]
pub enum ImportError {
    /// Source reference could not be resolved or is unusable
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Validation failed (pre-flight checks)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Processing plan could not be produced; the message is user-actionable
    #[error("{0}")]
    Planning(String),

    /// OS identifier not present in the registry
    #[error("os `{os}` is invalid. Allowed values: {allowed}")]
    InvalidOs { os: String, allowed: String },

    /// Inflation failed
    #[error("Inflation failed: {0}")]
    Inflation(String),

    /// A processor failed
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Deadline fired and the running step confirmed interruption
    #[error("Import did not complete within the specified timeout of {timeout:?}")]
    Timeout { timeout: Duration },

    /// Caller cancelled the import and the running step confirmed interruption
    #[error("Import was cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Invalid configuration detected
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failed inflation that may still have allocated a disk
///
/// `disk.uri` is non-empty when the platform resource exists and must be cleaned up.
#[derive(Debug)]
pub struct InflationFailure {
    pub disk: PersistentDisk,
    /// Telemetry gathered before the failure
    pub shadow_fields: ShadowTestFields,
    pub error: ImportError,
}

impl InflationFailure {
    pub fn new(error: impl Into<ImportError>) -> Self {
        Self::with_disk(PersistentDisk::default(), error)
    }

    pub fn with_disk(disk: PersistentDisk, error: impl Into<ImportError>) -> Self {
        Self {
            disk,
            shadow_fields: ShadowTestFields::default(),
            error: error.into(),
        }
    }

    pub fn with_shadow_fields(mut self, shadow_fields: ShadowTestFields) -> Self {
        self.shadow_fields = shadow_fields;
        self
    }
}

impl From<ImportError> for InflationFailure {
    fn from(error: ImportError) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for InflationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}
