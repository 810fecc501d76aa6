//! Per-camera capture pipeline: drives the HAL forever, keeps the zero-copy
//! descriptor current every frame, and publishes to the shared outputs only while active.

pub mod pipeline;

pub use pipeline::{CapturePipeline, PipelineConfig};
