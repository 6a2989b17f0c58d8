//! Data-disk imaging

use crate::processor::ProcessorKind;
use crate::step::{Processor, Step};
use async_trait::async_trait;
use diskport_core::Image;
use diskport_import_types::{
    ComputeClient, ImportArguments, ImportResult, LoggableBuilder, PersistentDisk,
};
use std::sync::Arc;
use tracing::info;

pub const DATA_DISK_LICENSE: &str =
    "projects/compute-image-tools/global/licenses/virtual-disk-import";

/// Creates the final image straight from the inflated disk
pub struct DataDiskProcessor {
    args: Arc<ImportArguments>,
    compute: Arc<dyn ComputeClient>,
}

impl DataDiskProcessor {
    pub fn new(args: Arc<ImportArguments>, compute: Arc<dyn ComputeClient>) -> Self {
        Self { args, compute }
    }

    fn image_for(&self, disk: &PersistentDisk) -> Image {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        Image {
            name: self.args.image_name.clone(),
            source_disk: Some(disk.uri.clone()),
            family: non_empty(&self.args.family),
            description: non_empty(&self.args.description),
            labels: self.args.labels.clone(),
            licenses: vec![DATA_DISK_LICENSE.to_string()],
            guest_os_features: Vec::new(),
            storage_locations: non_empty(&self.args.storage_location).into_iter().collect(),
        }
    }
}

#[async_trait]
impl Step for DataDiskProcessor {
    async fn cancel(&self, _reason: &str) -> bool {
        false
    }

    fn trace_logs(&self) -> Vec<String> {
        Vec::new()
    }
}

#[async_trait]
impl Processor for DataDiskProcessor {
    async fn process(
        &self,
        disk: PersistentDisk,
        _loggable: &LoggableBuilder,
    ) -> ImportResult<PersistentDisk> {
        let image = self.image_for(&disk);
        self.compute.create_image(&self.args.project, &image).await?;
        info!("💾 Created image {} from data disk {}", image.name, disk.uri);
        Ok(disk)
    }

    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataDisk
    }
}
