//! Device asset acquisition: embedded payload, temp file, bundle, template.

pub mod payload;
pub mod pipeline;

pub use payload::{extract_to_temp, ResourceTable, EMBEDDED_BUNDLE_NAME};
pub use pipeline::{AcquisitionState, AssetPipeline};
