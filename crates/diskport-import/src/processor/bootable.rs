//! OS translation
//!
//! Runs the translation workflow selected by the planner against the inflated disk.
//! The workflow boots the disk on a worker, installs the guest environment and
//! creates the final image.

use crate::processor::ProcessorKind;
use crate::step::{Processor, Step};
use async_trait::async_trait;
use diskport_core::{SerialConsole, Workflow, WorkflowRunner};
use diskport_import_types::{
    ImportArguments, ImportResult, LoggableBuilder, PersistentDisk,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const TRANSLATION_WORKFLOW_NAME: &str = "image-import";

pub struct BootableDiskProcessor {
    args: Arc<ImportArguments>,
    runner: Arc<dyn WorkflowRunner>,
    workflow_path: String,
    token: CancellationToken,
    console: Arc<SerialConsole>,
}

impl BootableDiskProcessor {
    pub fn new(
        args: Arc<ImportArguments>,
        runner: Arc<dyn WorkflowRunner>,
        workflow_path: impl Into<String>,
    ) -> Self {
        Self {
            args,
            runner,
            workflow_path: workflow_path.into(),
            token: CancellationToken::new(),
            console: Arc::new(SerialConsole::new()),
        }
    }

    /// Load the translation workflow and bind it to `disk`
    fn prepare_workflow(&self, disk: &PersistentDisk) -> ImportResult<Workflow> {
        let path = self.args.workflow_dir.join(&self.workflow_path);
        let mut workflow = Workflow::from_path(&path)?;

        workflow.name = TRANSLATION_WORKFLOW_NAME.to_string();
        workflow.project = Some(self.args.project.clone());
        workflow.zone = Some(self.args.zone.clone());
        if let Some(timeout) = self.args.timeout() {
            workflow.default_timeout = Some(diskport_core::format_duration(timeout));
        }
        workflow.labels.extend(self.args.labels.clone());
        if !self.args.storage_location.is_empty() {
            workflow.storage_location = Some(self.args.storage_location.clone());
        }

        workflow.add_var("source_disk", disk.uri.clone());
        let optional_vars = [
            ("image_name", self.args.image_name.clone()),
            (
                "install_gce_packages",
                (!self.args.no_guest_environment).to_string(),
            ),
            ("sysprep", self.args.sysprep_windows.to_string()),
            ("family", self.args.family.clone()),
            ("description", self.args.description.clone()),
            ("import_network", self.args.network.clone()),
            ("import_subnet", self.args.subnet.clone()),
            (
                "compute_service_account",
                self.args.compute_service_account.clone(),
            ),
        ];
        for (name, value) in optional_vars {
            // Only variables the workflow declares
            if workflow.vars.contains_key(name) {
                workflow.add_var(name, value);
            }
        }

        workflow.validate()?;
        workflow.check_includes()?;
        Ok(workflow)
    }
}

#[async_trait]
impl Step for BootableDiskProcessor {
    async fn cancel(&self, reason: &str) -> bool {
        info!("Cancelling translation workflow: {}", reason);
        self.token.cancel();
        true
    }

    fn trace_logs(&self) -> Vec<String> {
        self.console.logs()
    }
}

#[async_trait]
impl Processor for BootableDiskProcessor {
    async fn process(
        &self,
        disk: PersistentDisk,
        _loggable: &LoggableBuilder,
    ) -> ImportResult<PersistentDisk> {
        let workflow = self.prepare_workflow(&disk)?;
        info!(
            "🔧 Translating disk {} with {}",
            disk.uri, self.workflow_path
        );

        self.runner
            .run(&workflow, self.token.clone(), Arc::clone(&self.console))
            .await?;

        info!("✅ Translation finished for {}", disk.uri);
        Ok(disk)
    }

    fn kind(&self) -> ProcessorKind {
        ProcessorKind::BootableDisk
    }
}
