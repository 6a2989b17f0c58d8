//! Resolved import configuration

use crate::error::{ImportError, ImportResult};
use diskport_core::generate_execution_id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DISKPORT_";
const DEFAULT_TIMEOUT_SECS: u64 = 2 * 60 * 60;

/// Arguments for one import, read-only to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportArguments {
    pub project: String,
    pub zone: String,
    pub network: String,
    pub subnet: String,
    /// Suffix for every resource this import creates
    pub execution_id: String,
    /// Overall deadline in seconds; 0 disables it
    pub timeout_secs: u64,

    /// OS hint (`debian-11`, `windows-2019`, ...)
    pub os: String,
    /// Bring-your-own-license variant of `os`
    pub byol: bool,
    pub uefi_compatible: bool,
    /// Import as a data disk: no OS, no translation
    pub data_disk: bool,
    /// Translation workflow used verbatim instead of the registry's
    pub custom_workflow: String,
    /// Run OS inspection on the inflated disk
    pub inspect: bool,
    pub no_guest_environment: bool,
    pub sysprep_windows: bool,

    pub image_name: String,
    pub family: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub storage_location: String,
    pub scratch_bucket_gcs_path: String,
    pub compute_service_account: String,

    /// `gs://bucket/object` of the disk file
    pub source_file: String,
    /// Existing image to import from
    pub source_image: String,

    /// Directory translation workflows are loaded from
    pub workflow_dir: PathBuf,
}

impl Default for ImportArguments {
    fn default() -> Self {
        Self {
            project: String::new(),
            zone: String::new(),
            network: String::new(),
            subnet: String::new(),
            execution_id: generate_execution_id(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            os: String::new(),
            byol: false,
            uefi_compatible: false,
            data_disk: false,
            custom_workflow: String::new(),
            inspect: true,
            no_guest_environment: false,
            sysprep_windows: false,
            image_name: String::new(),
            family: String::new(),
            description: String::new(),
            labels: BTreeMap::new(),
            storage_location: String::new(),
            scratch_bucket_gcs_path: String::new(),
            compute_service_account: String::new(),
            source_file: String::new(),
            source_image: String::new(),
            workflow_dir: PathBuf::from("daisy_workflows"),
        }
    }
}

impl ImportArguments {
    /// Load arguments from a JSON or YAML file, picking the format by extension
    pub fn from_file(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(&contents).map_err(|e| {
                ImportError::Configuration(format!("{}: {}", path.display(), e))
            })
        } else {
            Ok(serde_json::from_str(&contents)?)
        }
    }

    /// Apply `DISKPORT_`-prefixed overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `DISKPORT_`-prefixed overrides from `vars`
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match name {
                "EXECUTION_ID" => self.execution_id = value,
                "WORKFLOW_DIR" => self.workflow_dir = PathBuf::from(value),
                _ => {}
            }
        }
    }

    /// Overall deadline, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
