//! Disk image import orchestrator
//!
//! Turns a source artifact (a disk file in object storage or an existing image) into
//! a platform disk, then runs the processing chain that makes it a usable image.
//!
//! # Architecture
//!
//! - **Source**: validated handle on the user's input reference
//! - **Inflaters**: workflow-based inflation, API-based inflation and the facade that
//!   runs the API path as a shadow of the workflow path
//! - **Planner**: OS detection, license and guest OS feature selection
//! - **Processors**: metadata tagging, OS translation and data-disk imaging
//! - **Importer**: the control loop that runs every stage under a shared deadline

pub mod importer;
pub mod inflater;
pub mod os_registry;
pub mod planner;
pub mod processor;
pub mod source;
pub mod step;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use importer::{CleanupOutcome, ImportServices, Importer};
pub use inflater::{new_inflater, ApiInflater, InflaterFacade, WorkflowInflater};
pub use planner::{DefaultProcessPlanner, ProcessPlanner};
pub use processor::{
    BootableDiskProcessor, DataDiskProcessor, DefaultProcessorProvider, MetadataProcessor,
    ProcessorKind, ProcessorProvider,
};
pub use source::{parse_storage_path, Source, SourceFactory};
pub use step::{Inflater, Processor, RunContext, Step};
pub use validation::{PreValidator, RulePreValidator};
