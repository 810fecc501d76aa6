//! Switch Controller: brightness-driven hysteresis over which physical camera is active,
//! plus the process supervision that keeps both capture pipelines running.

pub mod controller;
pub mod state_machine;
pub mod supervisor;

pub use controller::{ControllerConfig, SwitchController};
pub use state_machine::{ActiveCamera, Decision, HysteresisParams, SwitchStateMachine};
pub use supervisor::{ChildSpec, Supervisor};
