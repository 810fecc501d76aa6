//! Brightness-driven hysteresis state machine.
//!
//! Pure, synchronous, and free of any I/O so it can be driven directly against synthetic
//! brightness sequences in tests: spawning real child processes and reading real shared
//! memory is exercised separately, by [`super::controller`] and [`super::supervisor`].
//!
//! Dwell is modeled as a count of *consecutive qualifying poll samples*, not wall-clock
//! elapsed time: the controller calls [`SwitchStateMachine::observe`] once per poll tick,
//! so exactly `T_down / poll_interval_day` consecutive qualifying samples are required to
//! switch. Counting samples rather than timestamps also means this type needs no clock at
//! all, which is what keeps it unit-testable without any time mocking.

use std::time::Duration;

/// Which camera is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveCamera {
    Uninitialised,
    Day,
    Night,
}

impl ActiveCamera {
    #[must_use]
    pub fn camera_id(self) -> i32 {
        match self {
            ActiveCamera::Uninitialised => crate::names::CAMERA_UNINITIALISED,
            ActiveCamera::Day => i32::from(crate::names::CAMERA_DAY),
            ActiveCamera::Night => i32::from(crate::names::CAMERA_NIGHT),
        }
    }
}

/// Thresholds and per-direction required consecutive sample counts. Required counts are
/// derived from `dwell / poll_interval` for each direction (see
/// [`HysteresisParams::from_durations`]), rounding down.
#[derive(Debug, Clone, Copy)]
pub struct HysteresisParams {
    pub threshold_down: u8,
    pub threshold_up: u8,
    pub samples_down_required: u32,
    pub samples_up_required: u32,
}

impl HysteresisParams {
    /// Derive required sample counts from dwell times and the poll cadence each direction
    /// is observed at (day poll cadence for the down/darkening direction, night poll cadence
    /// for the up/brightening direction, matching which camera is active while dwelling).
    #[must_use]
    pub fn from_durations(
        threshold_down: u8,
        threshold_up: u8,
        dwell_down: Duration,
        dwell_up: Duration,
        poll_interval_day: Duration,
        poll_interval_night: Duration,
    ) -> Self {
        Self {
            threshold_down,
            threshold_up,
            samples_down_required: sample_count(dwell_down, poll_interval_day),
            samples_up_required: sample_count(dwell_up, poll_interval_night),
        }
    }
}

fn sample_count(dwell: Duration, poll_interval: Duration) -> u32 {
    let count = dwell.as_millis() / poll_interval.as_millis().max(1);
    u32::try_from(count).unwrap_or(u32::MAX).max(1)
}

/// Hysteresis state machine: tracks a streak of consecutive qualifying poll samples and
/// fires only once the streak reaches the configured requirement.
pub struct SwitchStateMachine {
    state: ActiveCamera,
    params: HysteresisParams,
    streak: u32,
}

/// What happened on one [`SwitchStateMachine::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No change; still in the same state (possibly mid-streak toward a switch).
    Unchanged,
    /// The streak reached its requirement and the state flipped.
    Switched(ActiveCamera),
}

impl SwitchStateMachine {
    #[must_use]
    pub fn new(initial: ActiveCamera, params: HysteresisParams) -> Self {
        Self { state: initial, params, streak: 0 }
    }

    #[must_use]
    pub fn state(&self) -> ActiveCamera {
        self.state
    }

    /// Feed one day-camera brightness sample. Only the day camera's brightness drives the
    /// machine; both thresholds are phrased in terms of day-camera brightness.
    /// Callers are expected to call this once per poll tick, at the cadence
    /// [`Self::poll_interval`] currently reports.
    pub fn observe(&mut self, day_brightness: u8) -> Decision {
        let qualifies = match self.state {
            ActiveCamera::Day | ActiveCamera::Uninitialised => day_brightness <= self.params.threshold_down,
            ActiveCamera::Night => day_brightness >= self.params.threshold_up,
        };

        if !qualifies {
            self.streak = 0;
            return Decision::Unchanged;
        }

        self.streak += 1;
        let required = match self.state {
            ActiveCamera::Day | ActiveCamera::Uninitialised => self.params.samples_down_required,
            ActiveCamera::Night => self.params.samples_up_required,
        };

        if self.streak >= required {
            self.state = match self.state {
                ActiveCamera::Day | ActiveCamera::Uninitialised => ActiveCamera::Night,
                ActiveCamera::Night => ActiveCamera::Day,
            };
            self.streak = 0;
            Decision::Switched(self.state)
        } else {
            Decision::Unchanged
        }
    }

    /// Force the state to `camera`, bypassing dwell. Used when the control region is
    /// re-synced from an externally requested forced switch.
    pub fn force(&mut self, camera: ActiveCamera) {
        self.state = camera;
        self.streak = 0;
    }

    /// Poll cadence to use while in the current state.
    #[must_use]
    pub fn poll_interval(&self, day_interval: Duration, night_interval: Duration) -> Duration {
        match self.state {
            ActiveCamera::Day | ActiveCamera::Uninitialised => day_interval,
            ActiveCamera::Night => night_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HysteresisParams {
        HysteresisParams::from_durations(
            50,
            70,
            Duration::from_secs(1),
            Duration::from_secs(10),
            Duration::from_millis(250),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn required_sample_counts_match_dwell_over_poll_interval() {
        let p = params();
        assert_eq!(p.samples_down_required, 4); // 1000ms / 250ms
        assert_eq!(p.samples_up_required, 2); // 10000ms / 5000ms
    }

    #[test]
    fn steady_bright_day_never_switches() {
        let mut machine = SwitchStateMachine::new(ActiveCamera::Day, params());
        for _ in 0..240 {
            assert_eq!(machine.observe(120), Decision::Unchanged);
        }
        assert_eq!(machine.state(), ActiveCamera::Day);
    }

    #[test]
    fn exactly_required_samples_switches_one_fewer_does_not() {
        let mut machine = SwitchStateMachine::new(ActiveCamera::Day, params());
        assert_eq!(machine.observe(30), Decision::Unchanged);
        assert_eq!(machine.observe(30), Decision::Unchanged);
        assert_eq!(machine.observe(30), Decision::Unchanged, "3 samples (required - 1) must never switch");
        assert_eq!(machine.observe(30), Decision::Switched(ActiveCamera::Night), "4th sample must switch");
    }

    #[test]
    fn brief_dip_below_dwell_never_switches() {
        let mut machine = SwitchStateMachine::new(ActiveCamera::Day, params());
        machine.observe(120);
        machine.observe(40);
        machine.observe(40);
        let decision = machine.observe(120);
        assert_eq!(decision, Decision::Unchanged);
        assert_eq!(machine.state(), ActiveCamera::Day);
    }

    #[test]
    fn recovering_brightness_switches_night_to_day_after_two_samples() {
        let mut machine = SwitchStateMachine::new(ActiveCamera::Night, params());
        assert_eq!(machine.observe(100), Decision::Unchanged);
        assert_eq!(machine.observe(100), Decision::Switched(ActiveCamera::Day));
    }

    #[test]
    fn an_interruption_resets_the_streak() {
        let mut machine = SwitchStateMachine::new(ActiveCamera::Day, params());
        machine.observe(30);
        machine.observe(30);
        // Brightness recovers momentarily, breaking the streak.
        machine.observe(120);
        machine.observe(30);
        machine.observe(30);
        assert_eq!(machine.state(), ActiveCamera::Day, "streak must restart after an interruption");
    }

    #[test]
    fn forced_switch_bypasses_dwell() {
        let mut machine = SwitchStateMachine::new(ActiveCamera::Day, params());
        machine.force(ActiveCamera::Night);
        assert_eq!(machine.state(), ActiveCamera::Night);
    }
}
