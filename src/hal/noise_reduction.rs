//! Noise-reduction band tuning.
//!
//! The board's 3D-NR and 2D-NR strengths step through three presets as brightness falls.
//! Applying a preset is a vendor-API call, so it's rate-limited to at most once per second
//! regardless of how often brightness is sampled, to keep vendor-API churn low.

use std::time::{Duration, Instant};

/// Noise-reduction preset bands, ordered darkest to brightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrBand {
    Dark,
    Dim,
    Normal,
}

impl NrBand {
    #[must_use]
    pub fn for_brightness(brightness_avg: u8) -> Self {
        match brightness_avg {
            0..=25 => NrBand::Dark,
            26..=55 => NrBand::Dim,
            _ => NrBand::Normal,
        }
    }

    /// Vendor-documented (3D-NR, 2D-NR) strength pair for this band, 0-100 scale.
    #[must_use]
    pub fn strengths(self) -> (u8, u8) {
        match self {
            NrBand::Dark => (80, 60),
            NrBand::Dim => (50, 35),
            NrBand::Normal => (20, 15),
        }
    }
}

/// Rate-limits noise-reduction preset changes to once per second and only actually calls
/// through when the band changed, so a flat brightness reading doesn't churn the vendor API.
pub struct NrController {
    last_applied: Option<NrBand>,
    last_applied_at: Option<Instant>,
    min_interval: Duration,
}

impl Default for NrController {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl NrController {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self { last_applied: None, last_applied_at: None, min_interval }
    }

    /// Consider applying `band` now. Returns `Some(band)` exactly when the vendor API
    /// should actually be called (band changed and the rate limit has elapsed), `None`
    /// otherwise.
    pub fn maybe_apply(&mut self, band: NrBand, now: Instant) -> Option<NrBand> {
        if self.last_applied == Some(band) {
            return None;
        }
        if let Some(last_at) = self.last_applied_at {
            if now.duration_since(last_at) < self.min_interval {
                return None;
            }
        }
        self.last_applied = Some(band);
        self.last_applied_at = Some(now);
        Some(band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries_match_documented_presets() {
        assert_eq!(NrBand::for_brightness(0), NrBand::Dark);
        assert_eq!(NrBand::for_brightness(25), NrBand::Dark);
        assert_eq!(NrBand::for_brightness(26), NrBand::Dim);
        assert_eq!(NrBand::for_brightness(55), NrBand::Dim);
        assert_eq!(NrBand::for_brightness(56), NrBand::Normal);
        assert_eq!(NrBand::for_brightness(255), NrBand::Normal);
    }

    #[test]
    fn same_band_twice_in_a_row_is_suppressed() {
        let mut controller = NrController::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert_eq!(controller.maybe_apply(NrBand::Dark, t0), Some(NrBand::Dark));
        assert_eq!(controller.maybe_apply(NrBand::Dark, t0), None);
    }

    #[test]
    fn band_change_within_rate_limit_window_is_suppressed() {
        let mut controller = NrController::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert_eq!(controller.maybe_apply(NrBand::Normal, t0), Some(NrBand::Normal));
        let t1 = t0 + Duration::from_millis(200);
        assert_eq!(controller.maybe_apply(NrBand::Dark, t1), None, "changed within the 1s rate limit");
    }

    #[test]
    fn band_change_after_rate_limit_window_applies() {
        let mut controller = NrController::new(Duration::from_secs(1));
        let t0 = Instant::now();
        controller.maybe_apply(NrBand::Normal, t0);
        let t1 = t0 + Duration::from_millis(1100);
        assert_eq!(controller.maybe_apply(NrBand::Dark, t1), Some(NrBand::Dark));
    }
}
