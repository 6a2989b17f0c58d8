//! API-based inflation
//!
//! Creates the disk straight from the storage object with one compute call, then
//! boots a small worker that checksums four fixed windows of the disk so the result
//! can be compared with the workflow path. The disk is always deleted again before
//! `inflate` returns; this inflater only ever runs as a shadow.

use crate::inflater::workflow::WORKER_IMAGE;
use crate::source::parse_storage_path;
use crate::step::{Inflater, Step};
use async_trait::async_trait;
use diskport_core::{
    bytes_to_gib_ceil, zonal_disk_uri, AttachedDisk, Disk, InstanceSignal, SerialConsole,
    SerialOutputSignal, Workflow, WorkflowBuilder, WorkflowDisk, WorkflowInstance, WorkflowRunner,
    WorkflowStep,
};
use diskport_import_types::{
    ComputeClient, ImportArguments, ImportError, ImportResult, Inflation, InflationFailure,
    PersistentDisk, ShadowTestFields, StorageClient,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const INFLATION_TYPE_API: &str = "api";
pub const CHECKSUM_WORKFLOW_NAME: &str = "shadow-disk-checksum";
pub const CHECKSUM_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Prints `H1-H2-H3-H4`, the md5 digests of four 100MB windows of the attached disk
const CHECKSUM_SCRIPT: &str = r#"#!/bin/bash
exec > /dev/ttyS0 2>&1
DEVICE=/dev/sdb
SIZE_MB=$(( $(blockdev --getsize64 "$DEVICE") / 1048576 ))
window() {
  local skip=$(( $1 < 0 ? 0 : $1 ))
  dd if="$DEVICE" bs=1M skip="$skip" count=100 2>/dev/null | md5sum | awk '{print $1}' | tr -d '[:space:]'
}
H1=$(window 0)
H2=$(window $(( SIZE_MB / 2 - 50 )))
H3=$(window $(( SIZE_MB - 1024 )))
H4=$(window $(( SIZE_MB - 100 )))
echo "Checksum: <serial-output key:'disk-checksum' value:'$H1-$H2-$H3-$H4'>"
echo "Checksum calculated."
"#;

pub struct ApiInflater {
    args: Arc<ImportArguments>,
    source_file: String,
    compute: Arc<dyn ComputeClient>,
    storage: Arc<dyn StorageClient>,
    runner: Arc<dyn WorkflowRunner>,
    cancel_tx: mpsc::Sender<String>,
    /// Held for the whole of `inflate`; `cancel` waits on it
    in_flight: tokio::sync::Mutex<mpsc::Receiver<String>>,
    checksum_token: CancellationToken,
    console: Arc<SerialConsole>,
    trace: Mutex<Vec<String>>,
}

impl ApiInflater {
    pub fn new(
        args: Arc<ImportArguments>,
        source_file: impl Into<String>,
        compute: Arc<dyn ComputeClient>,
        storage: Arc<dyn StorageClient>,
        runner: Arc<dyn WorkflowRunner>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        Self {
            args,
            source_file: source_file.into(),
            compute,
            storage,
            runner,
            cancel_tx,
            in_flight: tokio::sync::Mutex::new(cancel_rx),
            checksum_token: CancellationToken::new(),
            console: Arc::new(SerialConsole::new()),
            trace: Mutex::new(Vec::new()),
        }
    }

    pub fn disk_name(&self) -> String {
        format!("shadow-disk-{}", self.args.execution_id)
    }

    fn push_trace(&self, line: String) {
        match self.trace.lock() {
            Ok(mut trace) => trace.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }

    /// Worker workflow that checksums the shadow disk
    pub fn checksum_workflow(&self) -> ImportResult<Workflow> {
        let exec = &self.args.execution_id;
        let boot_disk = format!("disk-shadow-checker-{}", exec);
        let instance = format!("inst-shadow-checker-{}", exec);
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());

        let workflow = WorkflowBuilder::new(CHECKSUM_WORKFLOW_NAME)
            .with_project(self.args.project.clone())
            .with_zone(self.args.zone.clone())
            .with_default_timeout(CHECKSUM_TIMEOUT)
            .with_labels(self.args.labels.clone())
            .force_cleanup_on_error(true)
            .with_step(
                "create-checker-disk",
                WorkflowStep::CreateDisks(vec![WorkflowDisk {
                    disk: Disk {
                        name: boot_disk.clone(),
                        source_image: Some(WORKER_IMAGE.to_string()),
                        disk_type: Some("pd-ssd".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }]),
            )
            .with_step(
                "create-checker",
                WorkflowStep::CreateInstances(vec![WorkflowInstance {
                    name: instance.clone(),
                    disks: vec![
                        AttachedDisk::read_write(boot_disk),
                        AttachedDisk::read_only(self.disk_name()),
                    ],
                    machine_type: Some("n1-standard-2".to_string()),
                    metadata: BTreeMap::from([(
                        "startup-script".to_string(),
                        CHECKSUM_SCRIPT.to_string(),
                    )]),
                    network: non_empty(&self.args.network),
                    subnetwork: non_empty(&self.args.subnet),
                    ..Default::default()
                }]),
            )
            .with_step(
                "wait-for-checksum",
                WorkflowStep::WaitForInstancesSignal(vec![InstanceSignal {
                    name: instance,
                    serial_output: SerialOutputSignal {
                        port: 1,
                        success_match: Some("Checksum calculated.".to_string()),
                        failure_match: None,
                        status_match: Some("Checksum:".to_string()),
                    },
                }]),
            )
            .with_dependency("create-checker", &["create-checker-disk"])
            .with_dependency("wait-for-checksum", &["create-checker"])
            .build()?;
        Ok(workflow)
    }

    async fn create_and_checksum(
        &self,
        cancel_rx: &mut mpsc::Receiver<String>,
    ) -> Result<Inflation, InflationFailure> {
        let started = Instant::now();
        let request = Disk {
            name: self.disk_name(),
            source_storage_object: Some(self.source_file.clone()),
            disk_type: Some("pd-ssd".to_string()),
            ..Default::default()
        };
        self.compute
            .create_disk(&self.args.project, &self.args.zone, &request)
            .await
            .map_err(InflationFailure::new)?;

        // Checksumming takes minutes; skip it when already cancelled
        if let Ok(reason) = cancel_rx.try_recv() {
            debug!("Shadow inflation cancelled before checksum: {}", reason);
            return Ok(Inflation::default());
        }

        let (bucket, object) = parse_storage_path(&self.source_file)?;
        let attrs = self
            .storage
            .object_attrs(&bucket, &object)
            .await
            .map_err(InflationFailure::new)?;
        let size_gb = bytes_to_gib_ceil(attrs.size);
        let disk = PersistentDisk {
            uri: zonal_disk_uri(&self.args.zone, &self.disk_name()),
            size_gb,
            source_gb: size_gb,
            source_type: "vmdk".to_string(),
        };

        let workflow = self.checksum_workflow()?;
        let run = self.runner.run(
            &workflow,
            self.checksum_token.clone(),
            Arc::clone(&self.console),
        );
        let outcome = tokio::time::timeout(CHECKSUM_TIMEOUT, run).await;
        let mut shadow_fields = ShadowTestFields {
            inflation_type: INFLATION_TYPE_API.to_string(),
            inflation_time: started.elapsed(),
            ..Default::default()
        };
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(ImportError::from(e)),
            Err(_) => Some(ImportError::Inflation(format!(
                "checksum workflow did not finish within {:?}",
                CHECKSUM_TIMEOUT
            ))),
        };
        if let Some(error) = error {
            return Err(InflationFailure::with_disk(disk, error).with_shadow_fields(shadow_fields));
        }

        shadow_fields.checksum = self
            .console
            .output_value("disk-checksum")
            .unwrap_or_default();
        Ok(Inflation {
            disk,
            shadow_fields,
        })
    }

    async fn delete_shadow_disk(&self) {
        let name = self.disk_name();
        match self
            .compute
            .delete_disk(&self.args.project, &self.args.zone, &name)
            .await
        {
            Ok(()) => debug!("Deleted shadow disk {}", name),
            Err(e) if e.is_not_found() => debug!("Shadow disk {} already gone", name),
            Err(e) => warn!("⚠️ Failed to delete shadow disk {}: {}", name, e),
        }
    }
}

#[async_trait]
impl Step for ApiInflater {
    async fn cancel(&self, reason: &str) -> bool {
        // A full buffer means a cancellation is already pending
        let _ = self.cancel_tx.try_send(reason.to_string());
        self.checksum_token.cancel();

        let _in_flight = self.in_flight.lock().await;
        let name = self.disk_name();
        match self
            .compute
            .get_disk(&self.args.project, &self.args.zone, &name)
            .await
        {
            Err(e) if e.is_not_found() => {
                self.push_trace(format!("apiInflater.inflate is canceled: {}", reason));
                true
            }
            Ok(_) => {
                self.push_trace(format!(
                    "apiInflater.inflate is canceled, cleanup is failed: {}",
                    reason
                ));
                false
            }
            Err(e) => {
                debug!("Could not verify shadow disk cleanup: {}", e);
                self.push_trace(format!(
                    "apiInflater.inflate is canceled, cleanup failed to verify: {}",
                    reason
                ));
                false
            }
        }
    }

    fn trace_logs(&self) -> Vec<String> {
        let mut logs = match self.trace.lock() {
            Ok(trace) => trace.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        logs.extend(self.console.logs());
        logs
    }
}

#[async_trait]
impl Inflater for ApiInflater {
    async fn inflate(&self) -> Result<Inflation, InflationFailure> {
        let mut cancel_rx = self.in_flight.lock().await;
        info!("⚡ Creating shadow disk {} from {}", self.disk_name(), self.source_file);

        let result = self.create_and_checksum(&mut cancel_rx).await;
        self.delete_shadow_disk().await;
        result
    }
}
