//! Processor chain selection

use crate::planner::ProcessPlanner;
use crate::processor::{BootableDiskProcessor, DataDiskProcessor, MetadataProcessor};
use crate::step::Processor;
use async_trait::async_trait;
use diskport_core::WorkflowRunner;
use diskport_import_types::{
    ComputeClient, ImportArguments, ImportResult, LoggableBuilder, PersistentDisk,
};
use std::sync::Arc;
use tracing::info;

/// Resolves the ordered processor chain for an inflated disk
#[async_trait]
pub trait ProcessorProvider: Send + Sync {
    async fn provide(
        &self,
        disk: &PersistentDisk,
        loggable: &LoggableBuilder,
    ) -> ImportResult<Vec<Arc<dyn Processor>>>;
}

pub struct DefaultProcessorProvider {
    args: Arc<ImportArguments>,
    compute: Arc<dyn ComputeClient>,
    runner: Arc<dyn WorkflowRunner>,
    planner: Arc<dyn ProcessPlanner>,
}

impl DefaultProcessorProvider {
    pub fn new(
        args: Arc<ImportArguments>,
        compute: Arc<dyn ComputeClient>,
        runner: Arc<dyn WorkflowRunner>,
        planner: Arc<dyn ProcessPlanner>,
    ) -> Self {
        Self {
            args,
            compute,
            runner,
            planner,
        }
    }
}

#[async_trait]
impl ProcessorProvider for DefaultProcessorProvider {
    async fn provide(
        &self,
        disk: &PersistentDisk,
        loggable: &LoggableBuilder,
    ) -> ImportResult<Vec<Arc<dyn Processor>>> {
        if self.args.data_disk {
            info!("📦 Data-disk import, skipping planning");
            return Ok(vec![Arc::new(DataDiskProcessor::new(
                Arc::clone(&self.args),
                Arc::clone(&self.compute),
            ))]);
        }

        let plan = self.planner.plan(disk, loggable).await?;

        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if plan.requires_metadata_update() {
            processors.push(Arc::new(MetadataProcessor::new(
                Arc::clone(&self.args),
                Arc::clone(&self.compute),
                plan.clone(),
            )));
        }
        if plan.requires_translation() {
            processors.push(Arc::new(BootableDiskProcessor::new(
                Arc::clone(&self.args),
                Arc::clone(&self.runner),
                plan.translation_workflow_path.clone(),
            )));
        }

        info!(
            "Processor chain: [{}]",
            processors
                .iter()
                .map(|p| p.kind().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(processors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorKind;
    use crate::test_support::{MockComputeClient, MockProcessPlanner, MockWorkflowRunner};
    use diskport_core::GuestOsFeature;
    use diskport_import_types::{ImportError, ProcessingPlan};

    fn provider(args: ImportArguments, planner: MockProcessPlanner) -> DefaultProcessorProvider {
        DefaultProcessorProvider::new(
            Arc::new(args),
            Arc::new(MockComputeClient::new()),
            Arc::new(MockWorkflowRunner::new()),
            Arc::new(planner),
        )
    }

    fn kinds(processors: &[Arc<dyn Processor>]) -> Vec<ProcessorKind> {
        processors.iter().map(|p| p.kind()).collect()
    }

    #[tokio::test]
    async fn test_data_disk_skips_planner() {
        let mut planner = MockProcessPlanner::new();
        planner.expect_plan().never();
        let provider = provider(
            ImportArguments {
                data_disk: true,
                ..Default::default()
            },
            planner,
        );

        let processors = provider
            .provide(&PersistentDisk::default(), &LoggableBuilder::new())
            .await
            .unwrap();
        assert_eq!(kinds(&processors), vec![ProcessorKind::DataDisk]);
    }

    #[tokio::test]
    async fn test_metadata_then_translation() {
        let mut planner = MockProcessPlanner::new();
        planner.expect_plan().times(1).returning(|_, _| {
            Ok(ProcessingPlan {
                required_licenses: vec!["license".to_string()],
                required_features: vec![GuestOsFeature::windows()],
                translation_workflow_path: "windows/translate_windows_2019.wf.json".to_string(),
            })
        });

        let processors = provider(ImportArguments::default(), planner)
            .provide(&PersistentDisk::default(), &LoggableBuilder::new())
            .await
            .unwrap();
        assert_eq!(
            kinds(&processors),
            vec![ProcessorKind::Metadata, ProcessorKind::BootableDisk]
        );
    }

    #[tokio::test]
    async fn test_custom_workflow_plan_has_only_translation() {
        let mut planner = MockProcessPlanner::new();
        planner.expect_plan().returning(|_, _| {
            Ok(ProcessingPlan {
                translation_workflow_path: "custom.wf.json".to_string(),
                ..Default::default()
            })
        });

        let processors = provider(ImportArguments::default(), planner)
            .provide(&PersistentDisk::default(), &LoggableBuilder::new())
            .await
            .unwrap();
        assert_eq!(kinds(&processors), vec![ProcessorKind::BootableDisk]);
    }

    #[tokio::test]
    async fn test_metadata_only_plan() {
        let mut planner = MockProcessPlanner::new();
        planner.expect_plan().returning(|_, _| {
            Ok(ProcessingPlan {
                required_features: vec![GuestOsFeature::uefi_compatible()],
                ..Default::default()
            })
        });

        let processors = provider(ImportArguments::default(), planner)
            .provide(&PersistentDisk::default(), &LoggableBuilder::new())
            .await
            .unwrap();
        assert_eq!(kinds(&processors), vec![ProcessorKind::Metadata]);
    }

    #[tokio::test]
    async fn test_planning_errors_propagate() {
        let mut planner = MockProcessPlanner::new();
        planner
            .expect_plan()
            .returning(|_, _| Err(ImportError::Planning("Could not detect operating system.".to_string())));

        let result = provider(ImportArguments::default(), planner)
            .provide(&PersistentDisk::default(), &LoggableBuilder::new())
            .await;
        assert!(matches!(result, Err(ImportError::Planning(_))));
    }
}
