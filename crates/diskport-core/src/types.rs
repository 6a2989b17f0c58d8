//! Compute resource shapes shared by the workflow model and the compute client
//!
//! Field names serialize in the platform's camelCase JSON form so the same values can
//! be embedded in workflow definitions and sent to the compute API unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Guest OS feature flag attached to disks and images
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuestOsFeature {
    #[serde(rename = "type")]
    pub feature_type: String,
}

impl GuestOsFeature {
    pub const UEFI_COMPATIBLE: &'static str = "UEFI_COMPATIBLE";
    pub const WINDOWS: &'static str = "WINDOWS";

    pub fn new(feature_type: impl Into<String>) -> Self {
        Self {
            feature_type: feature_type.into(),
        }
    }

    pub fn uefi_compatible() -> Self {
        Self::new(Self::UEFI_COMPATIBLE)
    }

    pub fn windows() -> Self {
        Self::new(Self::WINDOWS)
    }
}

impl fmt::Display for GuestOsFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.feature_type)
    }
}

/// Persistent disk resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_gb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_storage_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_disk: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guest_os_features: Vec<GuestOsFeature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
}

/// Image resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_disk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guest_os_features: Vec<GuestOsFeature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_locations: Vec<String>,
}

/// License and guest OS feature metadata applied to an existing disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskMetadataUpdate {
    pub licenses: Vec<String>,
    pub guest_os_features: Vec<GuestOsFeature>,
}
