//! Import metrics summary
//!
//! [`LoggableBuilder`] is a write-only sink handed explicitly to every stage that
//! reports metrics. Clones share the same state so a stage running on another task
//! can record into it. [`Loggable`] is the frozen result returned by the importer.

use crate::clients::InspectionMetadata;
use crate::disk::{PersistentDisk, ShadowTestFields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Metrics collected over one import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loggable {
    pub source_type: String,
    pub source_size_gb: i64,
    pub target_size_gb: i64,

    pub inflation_type: String,
    pub inflation_time_ms: u64,
    pub shadow_inflation_time_ms: u64,
    pub shadow_disk_match_result: String,

    pub inspection_distro: String,
    pub inspection_major_version: String,
    pub inspection_minor_version: String,
    pub inspection_os_count: u32,
    pub inspection_uefi_bootable: bool,
    pub inspection_bios_bootable: bool,

    pub uefi_requested: bool,
    pub uefi_detected: bool,

    pub trace_logs: Vec<String>,
    pub generated_at: Option<DateTime<Utc>>,
}

impl Loggable {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Shared, cloneable builder for [`Loggable`]
#[derive(Debug, Clone, Default)]
pub struct LoggableBuilder {
    inner: Arc<Mutex<Loggable>>,
}

impl LoggableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Loggable> {
        match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_disk_attributes(&self, disk: &PersistentDisk) -> &Self {
        let mut state = self.state();
        state.source_type = disk.source_type.clone();
        state.source_size_gb = disk.source_gb;
        state.target_size_gb = disk.size_gb;
        drop(state);
        self
    }

    pub fn set_inflation_attributes(&self, fields: &ShadowTestFields) -> &Self {
        let mut state = self.state();
        state.inflation_type = fields.inflation_type.clone();
        state.inflation_time_ms = fields.inflation_time.as_millis() as u64;
        if let Some(result) = &fields.match_result {
            state.shadow_disk_match_result = result.clone();
        }
        if let Some(shadow_time) = fields.shadow_inflation_time {
            state.shadow_inflation_time_ms = shadow_time.as_millis() as u64;
        }
        drop(state);
        self
    }

    pub fn set_inspection_results(&self, inspection: &InspectionMetadata) -> &Self {
        let mut state = self.state();
        if let Some(release) = &inspection.os_release {
            state.inspection_distro = release.distro.clone();
            state.inspection_major_version = release.major_version.clone();
            state.inspection_minor_version = release.minor_version.clone();
        }
        state.inspection_os_count = inspection.os_count;
        state.inspection_uefi_bootable = inspection.uefi_bootable;
        state.inspection_bios_bootable = inspection.bios_bootable;
        drop(state);
        self
    }

    pub fn set_uefi(&self, requested: bool, detected: bool) -> &Self {
        let mut state = self.state();
        state.uefi_requested = requested;
        state.uefi_detected = detected;
        drop(state);
        self
    }

    pub fn set_trace_logs(&self, logs: Vec<String>) -> &Self {
        self.state().trace_logs = logs;
        self
    }

    /// Snapshot the collected metrics
    pub fn build(&self) -> Loggable {
        let mut loggable = self.state().clone();
        loggable.generated_at = Some(Utc::now());
        loggable
    }
}
