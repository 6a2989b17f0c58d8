//! Core types and traits for the diskport import pipeline
//!
//! This crate provides the foundational abstractions shared by the import
//! orchestrator and anything that plugs into it.
//!
//! # Architecture
//!
//! - **Traits**: `ComputeClient`, `StorageClient` and `Inspector` describe the platform
//!   collaborators; `ImportValidationRule` describes a pre-flight check
//! - **Types**: `ImportArguments`, `PersistentDisk`, `ProcessingPlan`, `Loggable`, etc.
//! - **Errors**: Unified error handling across the pipeline

pub mod args;
pub mod clients;
pub mod disk;
pub mod error;
pub mod loggable;
pub mod plan;
pub mod validation;

pub use args::ImportArguments;
pub use clients::{
    ComputeClient, InspectionMetadata, Inspector, ObjectAttrs, OsRelease, StorageClient,
};
pub use disk::{Inflation, PersistentDisk, ShadowTestFields};
pub use error::{ApiError, ImportError, ImportResult, InflationFailure};
pub use loggable::{Loggable, LoggableBuilder};
pub use plan::ProcessingPlan;
pub use validation::{
    ImportValidationRule, ValidationLevel, ValidationReport, ValidationResult, ValidationStatus,
    ValidationSummary,
};
