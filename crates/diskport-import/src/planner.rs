//! Processing plan selection
//!
//! Reconciles the user's hints with OS inspection of the inflated disk and decides
//! which licenses and guest OS features to attach and which translation workflow
//! to run.

use crate::os_registry;
use async_trait::async_trait;
use diskport_core::GuestOsFeature;
use diskport_import_types::{
    ImportArguments, ImportError, ImportResult, InspectionMetadata, Inspector, LoggableBuilder,
    PersistentDisk, ProcessingPlan,
};
use std::sync::Arc;
use tracing::{info, warn};

const DETECTION_FAILURE: &str = "Could not detect operating system. Please re-import with the operating system specified. For more information, see the list of supported operating systems.";

/// Decides the processing plan for an inflated disk
#[async_trait]
pub trait ProcessPlanner: Send + Sync {
    async fn plan(
        &self,
        disk: &PersistentDisk,
        loggable: &LoggableBuilder,
    ) -> ImportResult<ProcessingPlan>;
}

pub struct DefaultProcessPlanner {
    args: Arc<ImportArguments>,
    inspector: Arc<dyn Inspector>,
}

impl DefaultProcessPlanner {
    pub fn new(args: Arc<ImportArguments>, inspector: Arc<dyn Inspector>) -> Self {
        Self { args, inspector }
    }

    async fn inspect(
        &self,
        disk: &PersistentDisk,
        loggable: &LoggableBuilder,
    ) -> Option<InspectionMetadata> {
        if !self.args.inspect {
            return None;
        }
        match self.inspector.inspect(&disk.uri).await {
            Ok(metadata) => {
                loggable.set_inspection_results(&metadata);
                Some(metadata)
            }
            Err(e) => {
                warn!("⚠️ Disk inspection failed for {}: {}", disk.uri, e);
                None
            }
        }
    }

    /// OS to import as; a detected but unsupported OS is returned as-is and rejected
    /// by the registry lookup
    fn resolve_os(&self, inspection: Option<&InspectionMetadata>) -> ImportResult<String> {
        if !self.args.os.is_empty() {
            if let Some(detected) = inspection
                .and_then(|m| m.os_release.as_ref())
                .and_then(os_registry::candidate_id)
            {
                if detected != self.args.os {
                    info!(
                        "Using OS '{}' from arguments; inspection detected '{}'",
                        self.args.os, detected
                    );
                }
            }
            return Ok(self.args.os.clone());
        }

        let detected = inspection
            .filter(|m| m.os_count == 1)
            .and_then(|m| m.os_release.as_ref())
            .and_then(os_registry::candidate_id)
            .ok_or_else(|| ImportError::Planning(DETECTION_FAILURE.to_string()))?;
        if os_registry::lookup(&detected).is_none() {
            warn!("⚠️ Inspection detected unsupported OS '{}'", detected);
        }
        Ok(detected)
    }
}

fn invalid_os(os: &str) -> ImportError {
    ImportError::InvalidOs {
        os: os.to_string(),
        allowed: os_registry::allowed_values(),
    }
}

#[async_trait]
impl ProcessPlanner for DefaultProcessPlanner {
    async fn plan(
        &self,
        disk: &PersistentDisk,
        loggable: &LoggableBuilder,
    ) -> ImportResult<ProcessingPlan> {
        if !self.args.custom_workflow.is_empty() {
            info!("📋 Using custom workflow {}", self.args.custom_workflow);
            return Ok(ProcessingPlan {
                translation_workflow_path: self.args.custom_workflow.clone(),
                ..Default::default()
            });
        }

        let inspection = self.inspect(disk, loggable).await;
        let os = self.resolve_os(inspection.as_ref())?;

        let mut entry = os_registry::lookup(&os).ok_or_else(|| invalid_os(&os))?;
        if self.args.byol {
            let byol = os_registry::byol_variant(&os);
            entry = os_registry::lookup(&byol).ok_or_else(|| invalid_os(&byol))?;
        }

        let uefi_detected = inspection
            .as_ref()
            .map(|m| m.uefi_bootable && !m.bios_bootable)
            .unwrap_or(false);
        loggable.set_uefi(self.args.uefi_compatible, uefi_detected);

        let mut required_features = Vec::new();
        if self.args.uefi_compatible || uefi_detected {
            required_features.push(GuestOsFeature::uefi_compatible());
        }
        if os_registry::is_windows(entry.id) {
            required_features.push(GuestOsFeature::windows());
        }

        info!("📋 Planned import for OS '{}' using {}", entry.id, entry.workflow);
        Ok(ProcessingPlan {
            required_licenses: vec![entry.license.to_string()],
            required_features,
            translation_workflow_path: entry.workflow.to_string(),
        })
    }
}
