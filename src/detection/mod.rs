//! Detection-boundary shim: the shared-memory contract a real detector would
//! consume and produce on, exercised here without any actual inference.

pub mod shim;

pub use shim::DetectionShim;
