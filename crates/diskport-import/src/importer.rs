//! Import control loop
//!
//! One [`Importer`] drives one import: pre-flight validation, inflation, then the
//! processor chain, each stage run as a guarded step under the import deadline. The
//! inflated disk is deleted on the way out whatever the outcome.

use crate::inflater::new_inflater;
use crate::planner::DefaultProcessPlanner;
use crate::processor::{DefaultProcessorProvider, ProcessorProvider};
use crate::source::SourceFactory;
use crate::step::{run_step, Inflater, RunContext};
use crate::validation::{PreValidator, RulePreValidator};
use diskport_core::WorkflowRunner;
use diskport_import_types::{
    ComputeClient, ImportArguments, ImportResult, Inflation, Inspector, Loggable,
    LoggableBuilder, PersistentDisk, StorageClient,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Platform collaborators an import talks to
#[derive(Clone)]
pub struct ImportServices {
    pub compute: Arc<dyn ComputeClient>,
    pub storage: Arc<dyn StorageClient>,
    pub inspector: Arc<dyn Inspector>,
    pub workflow_runner: Arc<dyn WorkflowRunner>,
}

/// What happened to the inflated disk at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// No disk was ever created
    Skipped,
    Deleted,
    /// The disk was already gone (404)
    AlreadyGone,
    Failed,
}

pub struct Importer {
    args: Arc<ImportArguments>,
    compute: Arc<dyn ComputeClient>,
    inflater: Arc<dyn Inflater>,
    provider: Arc<dyn ProcessorProvider>,
    validator: Arc<dyn PreValidator>,
}

impl Importer {
    pub fn new(
        args: Arc<ImportArguments>,
        compute: Arc<dyn ComputeClient>,
        inflater: Arc<dyn Inflater>,
        provider: Arc<dyn ProcessorProvider>,
        validator: Arc<dyn PreValidator>,
    ) -> Self {
        Self {
            args,
            compute,
            inflater,
            provider,
            validator,
        }
    }

    /// Resolve the source and wire the default pipeline for `args`
    pub async fn assemble(args: ImportArguments, services: ImportServices) -> ImportResult<Self> {
        let args = Arc::new(args);
        let source = SourceFactory::new(Arc::clone(&services.storage))
            .init(&args.source_file, &args.source_image)
            .await?;
        info!(
            "📥 Import {} from {}",
            args.execution_id,
            source.path()
        );

        let inflater = new_inflater(Arc::clone(&args), &source, &services).await;
        let planner = Arc::new(DefaultProcessPlanner::new(
            Arc::clone(&args),
            Arc::clone(&services.inspector),
        ));
        let provider = Arc::new(DefaultProcessorProvider::new(
            Arc::clone(&args),
            Arc::clone(&services.compute),
            Arc::clone(&services.workflow_runner),
            planner,
        ));
        let validator = Arc::new(RulePreValidator::with_default_rules(Arc::clone(
            &services.compute,
        )));

        Ok(Self::new(
            args,
            services.compute,
            inflater,
            provider,
            validator,
        ))
    }

    /// Run the import.
    ///
    /// The returned [`Loggable`] is always populated with whatever was collected,
    /// including trace logs of the steps that ran before a failure.
    pub async fn run(&self, token: CancellationToken) -> (Loggable, ImportResult<()>) {
        let ctx = RunContext::new(token, self.args.timeout());

        if let Err(e) = self.validator.validate(&self.args).await {
            return (Loggable::default(), Err(e));
        }

        let loggable = LoggableBuilder::new();
        let mut disk = PersistentDisk::default();
        let mut trace_logs = Vec::new();

        let result = self
            .run_stages(&ctx, &loggable, &mut disk, &mut trace_logs)
            .await;
        // Not bound to the deadline; cleanup also runs after a timeout
        self.cleanup_disk(&disk).await;

        match &result {
            Ok(()) => info!("✅ Import {} finished", self.args.execution_id),
            Err(e) => error!("❌ Import {} failed: {}", self.args.execution_id, e),
        }

        loggable
            .set_disk_attributes(&disk)
            .set_trace_logs(trace_logs);
        (loggable.build(), result)
    }

    async fn run_stages(
        &self,
        ctx: &RunContext,
        loggable: &LoggableBuilder,
        disk: &mut PersistentDisk,
        trace_logs: &mut Vec<String>,
    ) -> ImportResult<()> {
        // The worker records disk and telemetry even when a cancel discards its outcome
        let recorded = Arc::new(Mutex::new(Inflation::default()));
        let slot = Arc::clone(&recorded);
        let (inflated, logs) = run_step(ctx, Arc::clone(&self.inflater), move |inflater| async move {
            let result = inflater.inflate().await;
            *slot.lock().await = match &result {
                Ok(inflation) => inflation.clone(),
                Err(failure) => Inflation {
                    disk: failure.disk.clone(),
                    shadow_fields: failure.shadow_fields.clone(),
                },
            };
            result
        })
        .await;
        trace_logs.extend(logs);

        let recorded = recorded.lock().await.clone();
        if !recorded.shadow_fields.inflation_type.is_empty() {
            loggable.set_inflation_attributes(&recorded.shadow_fields);
        }
        *disk = recorded.disk;

        let inflation = inflated.map_err(|failure| failure.error)?;
        *disk = inflation.disk;
        info!(
            "💿 Inflated {} ({} GB, source {} GB {})",
            disk.uri, disk.size_gb, disk.source_gb, disk.source_type
        );

        let processors = self.provider.provide(disk, loggable).await?;
        for processor in processors {
            let input = disk.clone();
            let stage_loggable = loggable.clone();
            let (processed, logs) = run_step(ctx, processor, move |processor| async move {
                processor.process(input, &stage_loggable).await
            })
            .await;
            trace_logs.extend(logs);
            *disk = processed?;
        }

        Ok(())
    }

    /// Delete the inflated disk, if one was created
    pub async fn cleanup_disk(&self, disk: &PersistentDisk) -> CleanupOutcome {
        if !disk.is_allocated() {
            return CleanupOutcome::Skipped;
        }

        match self
            .compute
            .delete_disk(&self.args.project, &self.args.zone, &disk.uri)
            .await
        {
            Ok(()) => {
                info!("🧹 Removed temporary disk {}", disk.uri);
                CleanupOutcome::Deleted
            }
            Err(e) if e.is_not_found() => {
                debug!("Temporary disk {} already gone", disk.uri);
                CleanupOutcome::AlreadyGone
            }
            Err(e) => {
                error!("Failed to remove temporary disk {}: {}", disk.uri, e);
                CleanupOutcome::Failed
            }
        }
    }
}
