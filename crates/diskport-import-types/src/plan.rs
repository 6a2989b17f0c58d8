//! Processing plan types
//!
//! What the pipeline will do to the inflated disk after inflation.

use diskport_core::GuestOsFeature;
use serde::{Deserialize, Serialize};

/// Licenses, guest OS features and translation workflow decided for one import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingPlan {
    /// License URIs to attach to the disk
    pub required_licenses: Vec<String>,
    /// Guest OS features to attach to the disk
    pub required_features: Vec<GuestOsFeature>,
    /// Translation workflow, relative to the workflow directory; empty skips translation
    pub translation_workflow_path: String,
}

impl ProcessingPlan {
    pub fn requires_metadata_update(&self) -> bool {
        !self.required_licenses.is_empty() || !self.required_features.is_empty()
    }

    pub fn requires_translation(&self) -> bool {
        !self.translation_workflow_path.is_empty()
    }
}
