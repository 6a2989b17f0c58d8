//! Platform collaborator traits
//!
//! The pipeline talks to the compute API, object storage and the OS inspector only
//! through these traits. Platform failures surface as [`ApiError`] so callers can
//! tell "already gone" (404) apart from real failures.

use crate::error::{ApiError, ImportResult};
use async_trait::async_trait;
use diskport_core::{Disk, DiskMetadataUpdate, Image};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Compute API: disk and image CRUD
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn create_disk(&self, project: &str, zone: &str, disk: &Disk) -> Result<(), ApiError>;

    async fn get_disk(&self, project: &str, zone: &str, name: &str) -> Result<Disk, ApiError>;

    /// Delete a disk by name or zonal URI
    async fn delete_disk(&self, project: &str, zone: &str, disk: &str) -> Result<(), ApiError>;

    /// Attach licenses and guest OS features to an existing disk
    async fn update_disk_metadata(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        update: &DiskMetadataUpdate,
    ) -> Result<(), ApiError>;

    async fn create_image(&self, project: &str, image: &Image) -> Result<(), ApiError>;

    async fn get_image(&self, project: &str, name: &str) -> Result<Image, ApiError>;
}

/// Object attributes relevant to inflation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectAttrs {
    pub size: u64,
}

/// Object storage access
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn open_reader(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, ApiError>;

    async fn object_attrs(&self, bucket: &str, object: &str) -> Result<ObjectAttrs, ApiError>;
}

/// Operating system found by inspection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRelease {
    /// Lowercase distro id (`debian`, `ubuntu`, `windows`, ...)
    pub distro: String,
    pub major_version: String,
    pub minor_version: String,
}

/// Best-effort inspection result for a disk or source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionMetadata {
    pub virtual_size_gb: i64,
    pub physical_size_gb: i64,
    pub os_release: Option<OsRelease>,
    pub uefi_bootable: bool,
    pub bios_bootable: bool,
    /// Number of candidate operating systems found
    pub os_count: u32,
    /// Virtual disk file format, for file inspections
    pub file_format: String,
}

/// OS inspector; a black box returning metadata about a disk or file
#[async_trait]
pub trait Inspector: Send + Sync {
    async fn inspect(&self, reference: &str) -> ImportResult<InspectionMetadata>;
}
