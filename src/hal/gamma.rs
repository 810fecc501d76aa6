//! Adaptive Y-plane gamma correction.
//!
//! Six precomputed 256-entry lookup tables, one per brightness band, generated once at
//! startup rather than per frame — `lut[i] = round(((i/255)^gamma) * 255)`.

use once_cell::sync::Lazy;

/// Brightness bands, in ascending order, each paired with its gamma exponent.
const BANDS: [(u8, f64); 6] = [
    (20, 0.40),
    (35, 0.50),
    (50, 0.60),
    (65, 0.75),
    (80, 0.85),
    (u8::MAX, 1.00),
];

/// One LUT per band, computed once and shared by every capture pipeline in the process.
static LUTS: Lazy<[[u8; 256]; 6]> = Lazy::new(|| {
    let mut tables = [[0u8; 256]; 6];
    for (band_idx, (_, gamma)) in BANDS.iter().enumerate() {
        for (i, slot) in tables[band_idx].iter_mut().enumerate() {
            let normalized = i as f64 / 255.0;
            *slot = (normalized.powf(*gamma) * 255.0).round() as u8;
        }
    }
    tables
});

/// Identity table, used when `brightness_avg >= 80` so the gamma loop can be skipped
/// entirely: a well-lit frame gets no gamma adjustment at all.
fn band_for(brightness_avg: u8) -> Option<usize> {
    if brightness_avg >= 80 {
        return None;
    }
    BANDS.iter().position(|(ceiling, _)| brightness_avg < *ceiling)
}

/// Rewrite `y_plane` in place using the LUT selected by `brightness_avg`. A no-op when the
/// scene is already bright enough that correction wouldn't change anything.
pub fn apply_gamma(y_plane: &mut [u8], brightness_avg: u8) {
    let Some(band_idx) = band_for(brightness_avg) else {
        return;
    };
    let lut = &LUTS[band_idx];
    for byte in y_plane.iter_mut() {
        *byte = lut[*byte as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bright_scene_is_identity() {
        let mut plane = vec![10u8, 50, 128, 200, 255];
        let original = plane.clone();
        apply_gamma(&mut plane, 80);
        assert_eq!(plane, original);
        apply_gamma(&mut plane, 255);
        assert_eq!(plane, original);
    }

    #[test]
    fn dark_scene_brightens_midtones() {
        let mut plane = vec![128u8];
        apply_gamma(&mut plane, 10);
        assert!(plane[0] > 128, "low gamma exponent should brighten a mid-grey pixel");
    }

    #[test]
    fn lut_endpoints_are_fixed() {
        for (_, gamma) in BANDS {
            let lo = (0f64.powf(gamma) * 255.0).round() as u8;
            let hi = (1f64.powf(gamma) * 255.0).round() as u8;
            assert_eq!(lo, 0);
            assert_eq!(hi, 255);
        }
    }

    #[test]
    fn band_selection_matches_ceilings() {
        assert_eq!(band_for(0), Some(0));
        assert_eq!(band_for(19), Some(0));
        assert_eq!(band_for(20), Some(1));
        assert_eq!(band_for(79), Some(5));
        assert_eq!(band_for(80), None);
        assert_eq!(band_for(255), None);
    }
}
