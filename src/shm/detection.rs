//! Detection record shape: published by the detection-boundary shim to the
//! `/pet_camera_detections` latest-value region.
//!
//! `#[repr(C)]` and `Copy` like every other region record, which rules out a `String` or
//! `Vec` for the class label — it's a fixed-size byte buffer instead, the same trade-off the
//! zero-copy descriptor already makes for its plane array.

/// Upper bound on detections carried in one record; a scene with more than this many
/// detections simply reports the first `MAX_DETECTIONS`.
pub const MAX_DETECTIONS: usize = 16;
/// Fixed width of the class-label buffer; longer labels are truncated at publish time.
pub const LABEL_CAPACITY: usize = 32;

/// One detected object: class label, confidence, and an integer bounding box.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub label: [u8; LABEL_CAPACITY],
    pub label_len: u8,
    pub _pad: [u8; 3],
    /// Confidence scaled to a fixed point in `[0, 1_000_000]`, i.e. millionths, so the
    /// record stays `Copy`/`repr(C)` without a raw `f32` crossing the process boundary
    /// bit-for-bit (still exact for any confidence a model would realistically emit).
    pub confidence_millionths: u32,
    pub bbox_x: i32,
    pub bbox_y: i32,
    pub bbox_w: i32,
    pub bbox_h: i32,
}

impl Detection {
    #[must_use]
    pub fn new(label: &str, confidence: f32, bbox: (i32, i32, i32, i32)) -> Self {
        let mut buf = [0u8; LABEL_CAPACITY];
        let bytes = label.as_bytes();
        let len = bytes.len().min(LABEL_CAPACITY);
        buf[..len].copy_from_slice(&bytes[..len]);

        let clamped = confidence.clamp(0.0, 1.0);
        Self {
            label: buf,
            label_len: len as u8,
            _pad: [0; 3],
            confidence_millionths: (clamped * 1_000_000.0).round() as u32,
            bbox_x: bbox.0,
            bbox_y: bbox.1,
            bbox_w: bbox.2,
            bbox_h: bbox.3,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        std::str::from_utf8(&self.label[..self.label_len as usize]).unwrap_or("")
    }

    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.confidence_millionths as f32 / 1_000_000.0
    }
}

/// The latest-value record published to `/pet_camera_detections`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DetectionRecord {
    pub sequence: u64,
    pub timestamp_sec: i64,
    pub timestamp_nsec: i64,
    pub camera_id: u8,
    pub detection_count: u8,
    pub _pad: [u8; 6],
    pub detections: [Detection; MAX_DETECTIONS],
}

impl DetectionRecord {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sequence: 0,
            timestamp_sec: 0,
            timestamp_nsec: 0,
            camera_id: 0,
            detection_count: 0,
            _pad: [0; 6],
            detections: [Detection::new("", 0.0, (0, 0, 0, 0)); MAX_DETECTIONS],
        }
    }

    /// Build a record from up to [`MAX_DETECTIONS`] detections, silently dropping the rest:
    /// a small fixed array, not an unbounded one.
    #[must_use]
    pub fn from_detections(sequence: u64, camera_id: u8, now: (i64, i64), mut detections: Vec<Detection>) -> Self {
        detections.truncate(MAX_DETECTIONS);
        let count = detections.len() as u8;
        let mut slots = [Detection::new("", 0.0, (0, 0, 0, 0)); MAX_DETECTIONS];
        for (slot, detection) in slots.iter_mut().zip(detections) {
            *slot = detection;
        }
        Self {
            sequence,
            timestamp_sec: now.0,
            timestamp_nsec: now.1,
            camera_id,
            detection_count: count,
            _pad: [0; 6],
            detections: slots,
        }
    }

    #[must_use]
    pub fn detections(&self) -> &[Detection] {
        &self.detections[..self.detection_count as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_fixed_buffer() {
        let detection = Detection::new("cat", 0.87, (10, 20, 30, 40));
        assert_eq!(detection.label(), "cat");
        assert!((detection.confidence() - 0.87).abs() < 1e-4);
    }

    #[test]
    fn confidence_is_clamped_into_unit_range() {
        let over = Detection::new("dog", 1.5, (0, 0, 0, 0));
        let under = Detection::new("dog", -0.5, (0, 0, 0, 0));
        assert_eq!(over.confidence(), 1.0);
        assert_eq!(under.confidence(), 0.0);
    }

    #[test]
    fn oversized_label_is_truncated_not_overrun() {
        let long = "x".repeat(LABEL_CAPACITY + 10);
        let detection = Detection::new(&long, 0.5, (0, 0, 0, 0));
        assert_eq!(detection.label().len(), LABEL_CAPACITY);
    }

    #[test]
    fn from_detections_drops_past_max_detections() {
        let many: Vec<Detection> = (0..MAX_DETECTIONS + 5).map(|i| Detection::new("thing", 0.5, (i as i32, 0, 1, 1))).collect();
        let record = DetectionRecord::from_detections(1, 0, (0, 0), many);
        assert_eq!(record.detection_count as usize, MAX_DETECTIONS);
        assert_eq!(record.detections().len(), MAX_DETECTIONS);
    }
}
