//! Layered configuration: a TOML file merged with `PETCAM_`-prefixed environment overrides.
//!
//! Mirrors the figment-based config layering used elsewhere in this codebase's history: a
//! base file plus environment overrides, so the same binary is reconfigured for a board
//! without a rebuild (`PETCAM_SWITCH__THRESHOLD_DOWN=45 petcam-switchd`).

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-camera sensor and encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub camera_id: u8,
    pub host_route: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
}

impl CameraConfig {
    fn day() -> Self {
        Self {
            camera_id: crate::names::CAMERA_DAY,
            host_route: 0,
            width: 1920,
            height: 1080,
            fps: 30,
            bitrate_kbps: 700,
        }
    }

    fn night() -> Self {
        Self {
            camera_id: crate::names::CAMERA_NIGHT,
            host_route: 2,
            width: 1920,
            height: 1080,
            fps: 30,
            bitrate_kbps: 700,
        }
    }
}

/// Hysteresis thresholds and dwell times for the switch controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub threshold_down: u8,
    pub threshold_up: u8,
    #[serde(with = "humantime_serde")]
    pub dwell_down: Duration,
    #[serde(with = "humantime_serde")]
    pub dwell_up: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval_day: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval_night: Duration,
    pub warmup_frames: u32,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            threshold_down: 50,
            threshold_up: 70,
            dwell_down: Duration::from_secs(1),
            dwell_up: Duration::from_secs(10),
            poll_interval_day: Duration::from_millis(250),
            poll_interval_night: Duration::from_secs(5),
            warmup_frames: 15,
        }
    }
}

/// Top-level configuration for every process in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub day: CameraConfig,
    pub night: CameraConfig,
    pub switch: SwitchConfig,
    pub ring_capacity: usize,
    pub mjpeg_enabled: bool,
    #[serde(with = "humantime_serde")]
    pub semaphore_timeout: Duration,
    pub consecutive_transient_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            day: CameraConfig::day(),
            night: CameraConfig::night(),
            switch: SwitchConfig::default(),
            ring_capacity: crate::names::RING_CAPACITY,
            mjpeg_enabled: false,
            semaphore_timeout: Duration::from_secs(1),
            consecutive_transient_limit: 10,
        }
    }
}

impl Settings {
    /// Load configuration from `path` (if it exists) layered under `PETCAM_`-prefixed
    /// environment variables, falling back to [`Settings::default`] for anything unset.
    pub fn load(path: &std::path::Path) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PETCAM_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_thresholds() {
        let settings = Settings::default();
        assert_eq!(settings.switch.threshold_down, 50);
        assert_eq!(settings.switch.threshold_up, 70);
        assert_eq!(settings.switch.dwell_down, Duration::from_secs(1));
        assert_eq!(settings.switch.dwell_up, Duration::from_secs(10));
        assert_eq!(settings.ring_capacity, 30);
    }

    #[test]
    fn env_override_splits_on_double_underscore() {
        std::env::set_var("PETCAM_SWITCH__THRESHOLD_DOWN", "45");
        let settings: Settings = Figment::from(figment::providers::Serialized::defaults(Settings::default()))
            .merge(Env::prefixed("PETCAM_").split("__"))
            .extract()
            .unwrap();
        assert_eq!(settings.switch.threshold_down, 45);
        std::env::remove_var("PETCAM_SWITCH__THRESHOLD_DOWN");
    }
}
