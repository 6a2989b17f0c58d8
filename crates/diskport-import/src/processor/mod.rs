//! Processing stages run on the inflated disk

mod bootable;
mod data_disk;
mod metadata;
mod provider;

pub use bootable::{BootableDiskProcessor, TRANSLATION_WORKFLOW_NAME};
pub use data_disk::{DataDiskProcessor, DATA_DISK_LICENSE};
pub use metadata::MetadataProcessor;
pub use provider::{DefaultProcessorProvider, ProcessorProvider};

use std::fmt;

/// Which stage a processor implements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    Metadata,
    BootableDisk,
    DataDisk,
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorKind::Metadata => write!(f, "metadata"),
            ProcessorKind::BootableDisk => write!(f, "bootable-disk"),
            ProcessorKind::DataDisk => write!(f, "data-disk"),
        }
    }
}
