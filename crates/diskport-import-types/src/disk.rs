//! Persistent disk state threaded through the pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Platform disk produced by inflation and replaced by each processor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentDisk {
    /// Zonal disk resource path; empty until an inflater creates the disk
    pub uri: String,
    pub size_gb: i64,
    pub source_gb: i64,
    /// Detected format of the source file (`vmdk`, `qcow2`, ...)
    pub source_type: String,
}

impl PersistentDisk {
    pub fn is_allocated(&self) -> bool {
        !self.uri.is_empty()
    }
}

/// Inflation telemetry carried next to the disk; never affects control flow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowTestFields {
    /// Which inflation path produced the disk (`qemu` or `api`)
    pub inflation_type: String,
    pub inflation_time: Duration,
    /// Four-sample content checksum, `H1-H2-H3-H4`
    pub checksum: String,
    /// Outcome of comparing the main and shadow disks, when a shadow ran
    pub match_result: Option<String>,
    pub shadow_inflation_time: Option<Duration>,
}

/// Successful inflation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inflation {
    pub disk: PersistentDisk,
    pub shadow_fields: ShadowTestFields,
}
