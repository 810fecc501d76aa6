//! Day/night pet-camera capture-and-distribution plane.
//!
//! Three cooperating processes share a handful of POSIX shared-memory regions: two capture
//! pipelines (one per physical camera, see [`capture`]), a switch controller that decides
//! which one is active ([`switch`]), and a detection-boundary shim exercising the contract a
//! real detector would consume ([`detection`]). [`shm`] is the wire format all three speak;
//! [`hal`] is the only layer that touches the vendor SDK.

pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod error_recovery;
pub mod hal;
pub mod health;
pub mod names;
pub mod shm;
pub mod switch;

pub use config::Settings;
pub use error::PetcamError;
