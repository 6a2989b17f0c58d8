//! Core utilities and types shared across all diskport crates
//!
//! - **Workflow**: the declarative worker-VM graph handed to the external workflow engine
//! - **Serial console**: the sink workflow runs write guest serial output into
//! - **Types**: compute resource shapes (disks, images, guest OS features)
//! - **Telemetry**: tracing subscriber setup

pub mod serial;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod workflow;

pub use serial::*;
pub use telemetry::*;
pub use types::*;
pub use utils::*;
pub use workflow::*;

// Re-export external dependencies
pub use async_trait;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tokio_util;
pub use tracing;
pub use uuid;
