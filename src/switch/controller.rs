//! Switch Controller: decides which physical camera is active and publishes that decision.
//! Never touches frame payloads, only the control region's 8-byte word and the two
//! zero-copy descriptors it reads brightness from.

use crate::config::SwitchConfig;
use crate::error::PetcamError;
use crate::health::StallMonitor;
use crate::names::{self, CAMERA_DAY, CAMERA_NIGHT};
use crate::shm::{retry_attach, ControlRecord, LatestRegion, ZcRegion};
use crate::switch::state_machine::{ActiveCamera, Decision, HysteresisParams, SwitchStateMachine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Everything the controller needs at start-up.
pub struct ControllerConfig {
    pub switch: SwitchConfig,
    /// Forces the initial active camera instead of waiting for the first qualifying streak.
    /// Day is the default start state.
    pub initial: ActiveCamera,
}

impl ControllerConfig {
    #[must_use]
    pub fn hysteresis_params(&self) -> HysteresisParams {
        HysteresisParams::from_durations(
            self.switch.threshold_down,
            self.switch.threshold_up,
            self.switch.dwell_down,
            self.switch.dwell_up,
            self.switch.poll_interval_day,
            self.switch.poll_interval_night,
        )
    }
}

/// Owns the control region; attaches read-only to both cameras' zero-copy descriptors to
/// sample day-camera brightness every poll tick.
pub struct SwitchController {
    machine: SwitchStateMachine,
    config: ControllerConfig,
    control: LatestRegion<ControlRecord>,
    day_zc: ZcRegion,
    /// Attached for topology compliance (the controller must hold both descriptors open)
    /// but not currently read: the hysteresis decision is driven by day-camera brightness
    /// alone.
    night_zc: ZcRegion,
    /// Frames remaining in the post-switch warm-up window; purely observational here since
    /// the capture pipelines publish unconditionally once the control word flips, nothing
    /// downstream blocks on this countdown.
    warmup_remaining: u32,
    stall: StallMonitor,
}

impl SwitchController {
    /// Creates the control region (this process is its sole owner) and attaches read-only to
    /// both cameras' zero-copy descriptors, retrying per the standard bounded window while
    /// the capture pipelines start up.
    pub fn start(config: ControllerConfig) -> Result<Self, PetcamError> {
        let control = LatestRegion::create(names::CONTROL, ControlRecord::uninitialised())?;
        let day_zc = retry_attach(|| ZcRegion::open(&names::zero_copy(CAMERA_DAY)))?;
        let night_zc = retry_attach(|| ZcRegion::open(&names::zero_copy(CAMERA_NIGHT)))?;

        let params = config.hysteresis_params();
        let mut machine = SwitchStateMachine::new(config.initial, params);
        machine.force(config.initial);

        Ok(Self {
            machine,
            config,
            control,
            day_zc,
            night_zc,
            warmup_remaining: 0,
            stall: StallMonitor::new("switch_controller"),
        })
    }

    /// Publish the initial decision (a control-region write cannot fail) so the capture
    /// pipelines never read the uninitialised sentinel once this process is up.
    pub fn publish_initial(&mut self) {
        self.control.publish(ControlRecord { active_camera: self.machine.state().camera_id(), _reserved: 0 });
    }

    /// Run until `shutdown` is set, sleeping between ticks at the state-dependent cadence.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        self.publish_initial();
        while !shutdown.load(Ordering::Relaxed) {
            self.tick();
            let interval = self.machine.poll_interval(self.config.switch.poll_interval_day, self.config.switch.poll_interval_night);
            std::thread::sleep(interval);
        }
    }

    /// One poll: sample day brightness, feed the state machine, and publish on a switch.
    /// Brightness read failures are treated as "keep current state," matching the capture
    /// pipeline's own tolerance of transient HAL hiccups.
    pub fn tick(&mut self) {
        let brightness = match self.day_zc_brightness() {
            Some(value) => value,
            None => {
                warn!("day-camera brightness unavailable this tick, holding current state");
                self.stall.tick(false);
                return;
            }
        };

        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
        }

        match self.machine.observe(brightness) {
            Decision::Unchanged => self.stall.tick(true),
            Decision::Switched(camera) => {
                info!(new_active = camera.camera_id(), brightness, "switching active camera");
                self.control.publish(ControlRecord { active_camera: camera.camera_id(), _reserved: 0 });
                self.warmup_remaining = self.config.switch.warmup_frames;
                self.stall.tick(true);
            }
        }
    }

    fn day_zc_brightness(&self) -> Option<u8> {
        let (descriptor, _version) = self.day_zc.read();
        if descriptor.sequence == 0 {
            // Day pipeline hasn't published its first frame yet.
            return None;
        }
        Some(descriptor.brightness_avg)
    }

    #[must_use]
    pub fn active(&self) -> ActiveCamera {
        self.machine.state()
    }

    /// Force the active camera externally, bypassing dwell, and publish immediately.
    pub fn force(&mut self, camera: ActiveCamera) {
        self.machine.force(camera);
        self.control.publish(ControlRecord { active_camera: camera.camera_id(), _reserved: 0 });
        self.warmup_remaining = self.config.switch.warmup_frames;
    }

    pub fn shutdown(self) -> std::io::Result<()> {
        self.control.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration as StdDuration;

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            switch: SwitchConfig {
                threshold_down: 50,
                threshold_up: 70,
                dwell_down: StdDuration::from_millis(4),
                dwell_up: StdDuration::from_millis(2),
                poll_interval_day: StdDuration::from_millis(1),
                poll_interval_night: StdDuration::from_millis(1),
                warmup_frames: 15,
            },
            initial: ActiveCamera::Day,
        }
    }

    #[test]
    #[serial]
    fn tick_with_no_day_frames_yet_holds_current_state() {
        let mut day_zc = ZcRegion::create(&names::zero_copy(CAMERA_DAY), CAMERA_DAY).unwrap();
        let mut night_zc = ZcRegion::create(&names::zero_copy(CAMERA_NIGHT), CAMERA_NIGHT).unwrap();
        let mut controller = SwitchController::start(test_config()).unwrap();

        controller.tick();
        assert_eq!(controller.active(), ActiveCamera::Day);

        day_zc.destroy().ok();
        night_zc.destroy().ok();
        controller.shutdown().ok();
    }

    #[test]
    #[serial]
    fn sustained_low_brightness_switches_and_publishes_control_word() {
        use crate::shm::ZcDescriptor;

        let mut day_zc = ZcRegion::create(&names::zero_copy(CAMERA_DAY), CAMERA_DAY).unwrap();
        let mut night_zc = ZcRegion::create(&names::zero_copy(CAMERA_NIGHT), CAMERA_NIGHT).unwrap();
        let mut descriptor = ZcDescriptor::empty(CAMERA_DAY);
        descriptor.sequence = 1;
        descriptor.brightness_avg = 20;
        day_zc.publish(descriptor);

        let mut controller = SwitchController::start(test_config()).unwrap();
        for _ in 0..4 {
            controller.tick();
        }
        assert_eq!(controller.active(), ActiveCamera::Night);

        let consumer = LatestRegion::<ControlRecord>::open(names::CONTROL).unwrap();
        let (record, _version) = consumer.read().unwrap();
        assert_eq!(record.active_camera, i32::from(CAMERA_NIGHT));

        day_zc.destroy().ok();
        night_zc.destroy().ok();
        controller.shutdown().ok();
    }

    #[test]
    #[serial]
    fn forced_switch_publishes_immediately() {
        let mut day_zc = ZcRegion::create(&names::zero_copy(CAMERA_DAY), CAMERA_DAY).unwrap();
        let mut night_zc = ZcRegion::create(&names::zero_copy(CAMERA_NIGHT), CAMERA_NIGHT).unwrap();
        let mut controller = SwitchController::start(test_config()).unwrap();

        controller.force(ActiveCamera::Night);
        assert_eq!(controller.active(), ActiveCamera::Night);

        let consumer = LatestRegion::<ControlRecord>::open(names::CONTROL).unwrap();
        let (record, _version) = consumer.read().unwrap();
        assert_eq!(record.active_camera, i32::from(CAMERA_NIGHT));

        day_zc.destroy().ok();
        night_zc.destroy().ok();
        controller.shutdown().ok();
    }
}
