//! Stable shared-memory region names — the system's wire contract.
//!
//! These strings are the only thing a consumer process needs to know to attach; see the
//! region name table this module mirrors. Changing a constant here changes the contract for
//! every out-of-tree consumer (detector, streaming server, recorder, web monitor).

/// Active NV12 ring, written by whichever capture pipeline is currently active.
pub const ACTIVE_FRAME: &str = "/pet_camera_active_frame";
/// Active H.264 Annex-B ring.
pub const STREAM: &str = "/pet_camera_stream";
/// Optional MJPEG ring for the web monitor.
pub const MJPEG_FRAME: &str = "/pet_camera_mjpeg_frame";
/// Detection record, single-latest, written by the detector.
pub const DETECTIONS: &str = "/pet_camera_detections";
/// Active-camera control word, single-latest, written by the switch controller.
pub const CONTROL: &str = "/pet_camera_control";

/// Zero-copy descriptor region name for camera `id` (0 = day, 1 = night).
#[must_use]
pub fn zero_copy(camera_id: u8) -> String {
    format!("/pet_camera_zc_{camera_id}")
}

/// Camera id for the day sensor.
pub const CAMERA_DAY: u8 = 0;
/// Camera id for the night sensor.
pub const CAMERA_NIGHT: u8 = 1;
/// Sentinel written to the control region before the switch controller's first decision.
pub const CAMERA_UNINITIALISED: i32 = -1;

/// Default ring capacity (frame slots), per §3 of the region contract.
pub const RING_CAPACITY: usize = 30;

/// Bounded retry window a consumer waits for a region to appear at start-up.
pub const ATTACH_RETRY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
/// Poll interval while waiting for a region to appear.
pub const ATTACH_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_copy_names_are_stable() {
        assert_eq!(zero_copy(CAMERA_DAY), "/pet_camera_zc_0");
        assert_eq!(zero_copy(CAMERA_NIGHT), "/pet_camera_zc_1");
    }
}
