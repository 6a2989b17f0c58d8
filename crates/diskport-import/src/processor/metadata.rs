//! License and guest OS feature tagging

use crate::processor::ProcessorKind;
use crate::step::{Processor, Step};
use async_trait::async_trait;
use diskport_core::{resource_name, DiskMetadataUpdate};
use diskport_import_types::{
    ComputeClient, ImportArguments, ImportResult, LoggableBuilder, PersistentDisk, ProcessingPlan,
};
use std::sync::Arc;
use tracing::info;

/// Attaches the plan's licenses and guest OS features to the disk with one API call
pub struct MetadataProcessor {
    args: Arc<ImportArguments>,
    compute: Arc<dyn ComputeClient>,
    plan: ProcessingPlan,
}

impl MetadataProcessor {
    pub fn new(
        args: Arc<ImportArguments>,
        compute: Arc<dyn ComputeClient>,
        plan: ProcessingPlan,
    ) -> Self {
        Self {
            args,
            compute,
            plan,
        }
    }
}

#[async_trait]
impl Step for MetadataProcessor {
    async fn cancel(&self, _reason: &str) -> bool {
        // A single API call; runs to completion
        false
    }

    fn trace_logs(&self) -> Vec<String> {
        Vec::new()
    }
}

#[async_trait]
impl Processor for MetadataProcessor {
    async fn process(
        &self,
        disk: PersistentDisk,
        _loggable: &LoggableBuilder,
    ) -> ImportResult<PersistentDisk> {
        let name = resource_name(&disk.uri);
        let current = self
            .compute
            .get_disk(&self.args.project, &self.args.zone, name)
            .await?;

        let mut update = DiskMetadataUpdate {
            licenses: current.licenses,
            guest_os_features: current.guest_os_features,
        };
        for license in &self.plan.required_licenses {
            if !update.licenses.contains(license) {
                update.licenses.push(license.clone());
            }
        }
        for feature in &self.plan.required_features {
            if !update.guest_os_features.contains(feature) {
                update.guest_os_features.push(feature.clone());
            }
        }

        self.compute
            .update_disk_metadata(&self.args.project, &self.args.zone, name, &update)
            .await?;
        info!(
            "🏷️ Tagged disk {} with {} licenses and {} guest OS features",
            disk.uri,
            update.licenses.len(),
            update.guest_os_features.len()
        );

        Ok(disk)
    }

    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockComputeClient;
    use diskport_core::{Disk, GuestOsFeature};
    use diskport_import_types::{ApiError, ImportError};

    fn args() -> Arc<ImportArguments> {
        Arc::new(ImportArguments {
            project: "proj".to_string(),
            zone: "us-west1-a".to_string(),
            ..Default::default()
        })
    }

    fn disk() -> PersistentDisk {
        PersistentDisk {
            uri: "zones/us-west1-a/disks/disk-abc".to_string(),
            size_gb: 10,
            source_gb: 2,
            source_type: "vmdk".to_string(),
        }
    }

    fn plan() -> ProcessingPlan {
        ProcessingPlan {
            required_licenses: vec!["projects/windows-cloud/global/licenses/windows-server-2019-dc".to_string()],
            required_features: vec![GuestOsFeature::uefi_compatible(), GuestOsFeature::windows()],
            translation_workflow_path: "windows/translate_windows_2019.wf.json".to_string(),
        }
    }

    #[tokio::test]
    async fn test_merges_metadata_into_existing_disk() {
        let mut compute = MockComputeClient::new();
        compute
            .expect_get_disk()
            .withf(|project, zone, name| project == "proj" && zone == "us-west1-a" && name == "disk-abc")
            .times(1)
            .returning(|_, _, name| {
                Ok(Disk {
                    name: name.to_string(),
                    guest_os_features: vec![GuestOsFeature::uefi_compatible()],
                    ..Default::default()
                })
            });
        compute
            .expect_update_disk_metadata()
            .withf(|_, _, name, update| {
                name == "disk-abc"
                    && update.licenses.len() == 1
                    && update.guest_os_features
                        == vec![GuestOsFeature::uefi_compatible(), GuestOsFeature::windows()]
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let processor = MetadataProcessor::new(args(), Arc::new(compute), plan());
        let result = processor
            .process(disk(), &LoggableBuilder::new())
            .await
            .unwrap();

        assert_eq!(result, disk());
        assert_eq!(processor.kind(), ProcessorKind::Metadata);
        assert!(!processor.cancel("timed-out").await);
    }

    #[tokio::test]
    async fn test_api_failure_propagates() {
        let mut compute = MockComputeClient::new();
        compute
            .expect_get_disk()
            .returning(|_, _, _| Ok(Disk::default()));
        compute
            .expect_update_disk_metadata()
            .returning(|_, _, _, _| Err(ApiError::new(403, "permission denied")));

        let processor = MetadataProcessor::new(args(), Arc::new(compute), plan());
        let err = processor
            .process(disk(), &LoggableBuilder::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Api(ref e) if e.code == Some(403)));
    }
}
