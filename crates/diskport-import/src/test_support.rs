//! Mocks and fakes shared by the unit tests

use crate::planner::ProcessPlanner;
use crate::processor::{ProcessorKind, ProcessorProvider};
use crate::step::{Inflater, Processor, Step};
use crate::validation::PreValidator;
use async_trait::async_trait;
use diskport_core::{
    Disk, DiskMetadataUpdate, Image, SerialConsole, Workflow, WorkflowError, WorkflowRunner,
};
use diskport_import_types::{
    ApiError, ComputeClient, ImportArguments, ImportError, ImportResult, Inflation,
    InflationFailure, InspectionMetadata, Inspector, LoggableBuilder, ObjectAttrs,
    PersistentDisk, ProcessingPlan, ShadowTestFields, StorageClient,
};
use mockall::mock;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

mock! {
    pub ComputeClient {}

    #[async_trait]
    impl ComputeClient for ComputeClient {
        async fn create_disk(&self, project: &str, zone: &str, disk: &Disk) -> Result<(), ApiError>;
        async fn get_disk(&self, project: &str, zone: &str, name: &str) -> Result<Disk, ApiError>;
        async fn delete_disk(&self, project: &str, zone: &str, disk: &str) -> Result<(), ApiError>;
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
}

mock! {
    pub StorageClient {}

    #[async_trait]
    impl StorageClient for StorageClient {
        async fn open_reader(
            &self,
            bucket: &str,
            object: &str,
        ) -> Result<Box<dyn AsyncRead + Send + Unpin>, ApiError>;
        async fn object_attrs(&self, bucket: &str, object: &str) -> Result<ObjectAttrs, ApiError>;
    }
}

mock! {
    pub Inspector {}

    #[async_trait]
    impl Inspector for Inspector {
        async fn inspect(&self, reference: &str) -> ImportResult<InspectionMetadata>;
    }
}

mock! {
    pub WorkflowRunner {}

    #[async_trait]
    impl WorkflowRunner for WorkflowRunner {
        async fn run(
            &self,
            workflow: &Workflow,
            cancel: CancellationToken,
            console: Arc<SerialConsole>,
        ) -> Result<(), WorkflowError>;
    }
}

mock! {
    pub ProcessPlanner {}

    #[async_trait]
    impl ProcessPlanner for ProcessPlanner {
        async fn plan(
            &self,
            disk: &PersistentDisk,
            loggable: &LoggableBuilder,
        ) -> ImportResult<ProcessingPlan>;
    }
}

mock! {
    pub ProcessorProvider {}

    #[async_trait]
    impl ProcessorProvider for ProcessorProvider {
        async fn provide(
            &self,
            disk: &PersistentDisk,
            loggable: &LoggableBuilder,
        ) -> ImportResult<Vec<Arc<dyn Processor>>>;
    }
}

mock! {
    pub PreValidator {}

    #[async_trait]
    impl PreValidator for PreValidator {
        async fn validate(&self, args: &ImportArguments) -> ImportResult<()>;
    }
}

/// `tracing` writer that keeps everything formatted into memory
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Subscriber writing plain DEBUG-and-up lines into this capture
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

pub struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Boxed reader over `bytes`
pub fn reader(bytes: &[u8]) -> Box<dyn AsyncRead + Send + Unpin> {
    Box::new(std::io::Cursor::new(bytes.to_vec()))
}

/// Inflater that sleeps for `delay`, then yields `disk`
pub struct FakeInflater {
    pub disk: PersistentDisk,
    pub shadow_fields: ShadowTestFields,
    pub delay: Duration,
    pub cancellable: bool,
    pub fail: bool,
    pub logs: Vec<String>,
    pub inflate_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    token: CancellationToken,
}

impl FakeInflater {
    pub fn new(uri: &str) -> Self {
        Self {
            disk: PersistentDisk {
                uri: uri.to_string(),
                size_gb: 10,
                source_gb: 2,
                source_type: "vmdk".to_string(),
            },
            shadow_fields: ShadowTestFields {
                inflation_type: "qemu".to_string(),
                inflation_time: Duration::from_secs(3),
                ..Default::default()
            },
            delay: Duration::ZERO,
            cancellable: true,
            fail: false,
            logs: Vec::new(),
            inflate_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            token: CancellationToken::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_logs(mut self, logs: &[&str]) -> Self {
        self.logs = logs.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Step for FakeInflater {
    async fn cancel(&self, _reason: &str) -> bool {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.cancellable {
            self.token.cancel();
        }
        self.cancellable
    }

    fn trace_logs(&self) -> Vec<String> {
        self.logs.clone()
    }
}

#[async_trait]
impl Inflater for FakeInflater {
    async fn inflate(&self) -> Result<Inflation, InflationFailure> {
        self.inflate_calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = self.token.cancelled() => {
                return Err(InflationFailure::with_disk(
                    self.disk.clone(),
                    ImportError::Cancelled("inflation interrupted".to_string()),
                )
                .with_shadow_fields(self.shadow_fields.clone()));
            }
        }
        if self.fail {
            return Err(InflationFailure::with_disk(
                self.disk.clone(),
                ImportError::Inflation("worker reported ImportFailed".to_string()),
            )
            .with_shadow_fields(self.shadow_fields.clone()));
        }
        Ok(Inflation {
            disk: self.disk.clone(),
            shadow_fields: self.shadow_fields.clone(),
        })
    }
}

/// Processor that sleeps for `delay`; not interruptible unless `cancellable`
pub struct FakeProcessor {
    pub delay: Duration,
    pub cancellable: bool,
    pub fail: bool,
    pub logs: Vec<String>,
    pub process_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    token: CancellationToken,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            cancellable: false,
            fail: false,
            logs: Vec::new(),
            process_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            token: CancellationToken::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_logs(mut self, logs: &[&str]) -> Self {
        self.logs = logs.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Step for FakeProcessor {
    async fn cancel(&self, _reason: &str) -> bool {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.cancellable {
            self.token.cancel();
        }
        self.cancellable
    }

    fn trace_logs(&self) -> Vec<String> {
        self.logs.clone()
    }
}

#[async_trait]
impl Processor for FakeProcessor {
    async fn process(
        &self,
        disk: PersistentDisk,
        _loggable: &LoggableBuilder,
    ) -> ImportResult<PersistentDisk> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = self.token.cancelled() => {
                return Err(ImportError::Processing("processing interrupted".to_string()));
            }
        }
        if self.fail {
            return Err(ImportError::Processing("translation failed".to_string()));
        }
        Ok(disk)
    }

    fn kind(&self) -> ProcessorKind {
        ProcessorKind::BootableDisk
    }
}
