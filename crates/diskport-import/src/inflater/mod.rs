//! Inflaters turn a [`Source`] into a persistent disk

mod api;
mod facade;
mod workflow;

pub use api::{ApiInflater, CHECKSUM_TIMEOUT, CHECKSUM_WORKFLOW_NAME, INFLATION_TYPE_API};
pub use facade::{compare_inflations, InflaterFacade, MATCH_RESULT_OK};
pub use workflow::{
    inflated_disk_size_gb, scratch_disk_size_gb, WorkflowInflater, INFLATION_TYPE_QEMU,
    SOURCE_TYPE_IMAGE,
};

use crate::importer::ImportServices;
use crate::source::Source;
use crate::step::Inflater;
use diskport_import_types::{ImportArguments, InspectionMetadata};
use std::sync::Arc;
use tracing::{info, warn};

/// File formats the compute API can inflate directly
const API_INFLATION_FORMATS: &[&str] = &["vmdk"];

/// Select the inflater for `source`.
///
/// File sources are inspected first so the worker disks can be sized; inspection
/// failures fall back to default sizes. When the file format is one the API path
/// supports, the API inflater runs as a shadow of the workflow inflater.
pub async fn new_inflater(
    args: Arc<ImportArguments>,
    source: &Source,
    services: &ImportServices,
) -> Arc<dyn Inflater> {
    let inspection = match source {
        Source::File(path) => inspect_file(services, path).await,
        Source::Image(_) => None,
    };
    let shadow_eligible = source.is_file()
        && inspection
            .as_ref()
            .map(|m| API_INFLATION_FORMATS.contains(&m.file_format.as_str()))
            .unwrap_or(false);

    let main: Arc<dyn Inflater> = Arc::new(WorkflowInflater::new(
        Arc::clone(&args),
        source.clone(),
        inspection,
        Arc::clone(&services.workflow_runner),
    ));
    if !shadow_eligible {
        return main;
    }

    info!("👥 Running API inflation as a shadow of {}", source.path());
    let shadow = Arc::new(ApiInflater::new(
        args,
        source.path(),
        Arc::clone(&services.compute),
        Arc::clone(&services.storage),
        Arc::clone(&services.workflow_runner),
    ));
    Arc::new(InflaterFacade::new(main, shadow))
}

async fn inspect_file(services: &ImportServices, path: &str) -> Option<InspectionMetadata> {
    match services.inspector.inspect(path).await {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!("⚠️ File inspection failed for {}, using default disk sizes: {}", path, e);
            None
        }
    }
}
