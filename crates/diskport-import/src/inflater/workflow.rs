//! Workflow-based inflation
//!
//! Image sources become a single disk-creation step. File sources are converted on a
//! worker VM: the worker boots with a scratch disk holding the downloaded file and
//! writes the converted contents into the inflated disk, reporting sizes, the detected
//! format and a content checksum on its serial console.

use crate::source::Source;
use crate::step::{Inflater, Step};
use async_trait::async_trait;
use diskport_core::{
    zonal_disk_uri, AttachedDisk, DeleteResources, Disk, GuestOsFeature, InstanceSignal,
    SerialConsole, SerialOutputSignal, Workflow, WorkflowBuilder, WorkflowDisk, WorkflowInstance,
    WorkflowRunner, WorkflowStep,
};
use diskport_import_types::{
    ImportArguments, ImportResult, Inflation, InflationFailure, InspectionMetadata,
    PersistentDisk, ShadowTestFields,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const INFLATION_TYPE_QEMU: &str = "qemu";
/// `source_type` of disks created from an image; there is no source file
pub const SOURCE_TYPE_IMAGE: &str = "image";

const MIN_DISK_SIZE_GB: i64 = 10;
const SCRATCH_DISK_OVERHEAD: f64 = 1.1;
pub(crate) const WORKER_IMAGE: &str = "projects/compute-image-tools/global/images/family/debian-11-worker";
const WORKER_MACHINE_TYPE: &str = "n1-standard-4";

/// Size of the inflated disk: at least the guest's virtual size
pub fn inflated_disk_size_gb(inspection: Option<&InspectionMetadata>) -> i64 {
    inspection
        .map(|m| m.virtual_size_gb)
        .unwrap_or(0)
        .max(MIN_DISK_SIZE_GB)
}

/// Size of the scratch disk: room for the source file plus headroom
pub fn scratch_disk_size_gb(inspection: Option<&InspectionMetadata>) -> i64 {
    let physical = inspection.map(|m| m.physical_size_gb).unwrap_or(0);
    let padded = (physical as f64 * SCRATCH_DISK_OVERHEAD).ceil() as i64;
    padded.max(MIN_DISK_SIZE_GB)
}

pub struct WorkflowInflater {
    args: Arc<ImportArguments>,
    source: Source,
    inspection: Option<InspectionMetadata>,
    runner: Arc<dyn WorkflowRunner>,
    token: CancellationToken,
    console: Arc<SerialConsole>,
    finished: AtomicBool,
}

impl WorkflowInflater {
    /// `inspection` of a file source only sizes the disks; `None` uses defaults
    pub fn new(
        args: Arc<ImportArguments>,
        source: Source,
        inspection: Option<InspectionMetadata>,
        runner: Arc<dyn WorkflowRunner>,
    ) -> Self {
        Self {
            args,
            source,
            inspection,
            runner,
            token: CancellationToken::new(),
            console: Arc::new(SerialConsole::new()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn disk_name(&self) -> String {
        format!("disk-{}", self.args.execution_id)
    }

    pub fn disk_uri(&self) -> String {
        zonal_disk_uri(&self.args.zone, &self.disk_name())
    }

    fn guest_os_features(&self) -> Vec<GuestOsFeature> {
        let mut features = Vec::new();
        if self.args.uefi_compatible {
            features.push(GuestOsFeature::uefi_compatible());
        }
        if self.args.os.contains("windows") {
            features.push(GuestOsFeature::windows());
        }
        features
    }

    fn builder(&self, name: &str) -> WorkflowBuilder {
        let mut builder = WorkflowBuilder::new(name)
            .with_project(self.args.project.clone())
            .with_zone(self.args.zone.clone())
            .with_labels(self.args.labels.clone());
        if let Some(timeout) = self.args.timeout() {
            builder = builder.with_default_timeout(timeout);
        }
        builder
    }

    /// Declarative workflow that produces the inflated disk
    pub fn build_workflow(&self) -> ImportResult<Workflow> {
        let workflow = match &self.source {
            Source::Image(image) => self
                .builder("inflate-image")
                .with_step(
                    "create-disk",
                    WorkflowStep::CreateDisks(vec![WorkflowDisk {
                        disk: Disk {
                            name: self.disk_name(),
                            source_image: Some(image.clone()),
                            disk_type: Some("pd-ssd".to_string()),
                            guest_os_features: self.guest_os_features(),
                            ..Default::default()
                        },
                        no_cleanup: true,
                        fallback_to_pd_standard: true,
                    }]),
                )
                .build()?,
            Source::File(file) => self.file_workflow(file)?,
        };
        Ok(workflow)
    }

    fn file_workflow(&self, file: &str) -> ImportResult<Workflow> {
        let exec = &self.args.execution_id;
        let boot_disk = format!("disk-importer-{}", exec);
        let scratch_disk = format!("disk-importer-scratch-{}", exec);
        let instance = format!("inst-importer-{}", exec);
        let inflated_size = inflated_disk_size_gb(self.inspection.as_ref());
        let scratch_size = scratch_disk_size_gb(self.inspection.as_ref());

        let mut metadata = BTreeMap::from([
            ("source_disk_file".to_string(), "${source_disk_file}".to_string()),
            ("disk_name".to_string(), "${disk_name}".to_string()),
            ("scratch_disk_name".to_string(), scratch_disk.clone()),
        ]);
        if !self.args.scratch_bucket_gcs_path.is_empty() {
            metadata.insert(
                "scratch_bucket_gcs_path".to_string(),
                self.args.scratch_bucket_gcs_path.clone(),
            );
        }

        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        let workflow = self
            .builder("inflate-file")
            .with_var("source_disk_file", file)
            .with_var("disk_name", self.disk_name())
            .force_cleanup_on_error(true)
            .with_step(
                "setup-disks",
                WorkflowStep::CreateDisks(vec![
                    WorkflowDisk {
                        disk: Disk {
                            name: boot_disk.clone(),
                            source_image: Some(WORKER_IMAGE.to_string()),
                            disk_type: Some("pd-ssd".to_string()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    WorkflowDisk {
                        disk: Disk {
                            name: scratch_disk.clone(),
                            size_gb: Some(scratch_size),
                            disk_type: Some("pd-ssd".to_string()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    WorkflowDisk {
                        disk: Disk {
                            name: self.disk_name(),
                            size_gb: Some(inflated_size),
                            disk_type: Some("pd-ssd".to_string()),
                            guest_os_features: self.guest_os_features(),
                            ..Default::default()
                        },
                        no_cleanup: true,
                        fallback_to_pd_standard: true,
                    },
                ]),
            )
            .with_step(
                "inflate-instance",
                WorkflowStep::CreateInstances(vec![WorkflowInstance {
                    name: instance.clone(),
                    disks: vec![
                        AttachedDisk::read_write(boot_disk),
                        AttachedDisk::read_write(scratch_disk),
                        AttachedDisk::read_write(self.disk_name()),
                    ],
                    machine_type: Some(WORKER_MACHINE_TYPE.to_string()),
                    metadata,
                    startup_script: Some("import_image.sh".to_string()),
                    network: non_empty(&self.args.network),
                    subnetwork: non_empty(&self.args.subnet),
                    ..Default::default()
                }]),
            )
            .with_step(
                "wait-for-signal",
                WorkflowStep::WaitForInstancesSignal(vec![InstanceSignal {
                    name: instance.clone(),
                    serial_output: SerialOutputSignal {
                        port: 1,
                        success_match: Some("ImportSuccess:".to_string()),
                        failure_match: Some("ImportFailed:".to_string()),
                        status_match: Some("Import:".to_string()),
                    },
                }]),
            )
            .with_step(
                "cleanup",
                WorkflowStep::DeleteResources(DeleteResources {
                    instances: vec![instance],
                    ..Default::default()
                }),
            )
            .with_dependency("inflate-instance", &["setup-disks"])
            .with_dependency("wait-for-signal", &["inflate-instance"])
            .with_dependency("cleanup", &["wait-for-signal"])
            .build()?;
        Ok(workflow)
    }

    fn serial_gb(&self, key: &str) -> Option<i64> {
        self.console
            .output_value(key)
            .and_then(|value| value.trim().parse().ok())
    }

    /// Disk described by the worker's serial output.
    ///
    /// Image sources have no worker and no source file: the size falls back to the
    /// minimum, `source_gb` stays 0 and `source_type` is [`SOURCE_TYPE_IMAGE`].
    fn inflated_disk(&self, uri: String) -> PersistentDisk {
        let size_gb = self
            .serial_gb("target-size-gb")
            .unwrap_or_else(|| inflated_disk_size_gb(self.inspection.as_ref()));
        match &self.source {
            Source::Image(_) => PersistentDisk {
                uri,
                size_gb,
                source_gb: 0,
                source_type: SOURCE_TYPE_IMAGE.to_string(),
            },
            Source::File(_) => PersistentDisk {
                uri,
                size_gb,
                source_gb: self.serial_gb("source-size-gb").unwrap_or(0),
                source_type: self
                    .console
                    .output_value("import-file-format")
                    .unwrap_or_default(),
            },
        }
    }
}

#[async_trait]
impl Step for WorkflowInflater {
    async fn cancel(&self, reason: &str) -> bool {
        if self.finished.load(Ordering::SeqCst) {
            debug!("Inflation already finished, ignoring cancel: {}", reason);
            return false;
        }
        info!("Cancelling inflation workflow: {}", reason);
        self.token.cancel();
        true
    }

    fn trace_logs(&self) -> Vec<String> {
        self.console.logs()
    }
}

#[async_trait]
impl Inflater for WorkflowInflater {
    async fn inflate(&self) -> Result<Inflation, InflationFailure> {
        let started = Instant::now();
        let workflow = self.build_workflow()?;
        let allocated = PersistentDisk {
            uri: self.disk_uri(),
            ..Default::default()
        };

        info!("🚀 Inflating {} into {}", self.source.path(), allocated.uri);
        let run = self
            .runner
            .run(&workflow, self.token.clone(), Arc::clone(&self.console))
            .await;
        self.finished.store(true, Ordering::SeqCst);

        let mut shadow_fields = ShadowTestFields {
            inflation_type: INFLATION_TYPE_QEMU.to_string(),
            inflation_time: started.elapsed(),
            ..Default::default()
        };
        if let Err(e) = run {
            return Err(InflationFailure::with_disk(allocated, e).with_shadow_fields(shadow_fields));
        }

        let disk = self.inflated_disk(allocated.uri);
        shadow_fields.checksum = self
            .console
            .output_value("disk-checksum")
            .unwrap_or_default();
        debug!("Inflated disk {:?} in {:?}", disk, shadow_fields.inflation_time);

        Ok(Inflation {
            disk,
            shadow_fields,
        })
    }
}
