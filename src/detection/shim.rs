//! Detection-boundary shim: not the detector, just the contract it runs against.
//!
//! Reads the active camera's zero-copy descriptor, "imports" the DMA buffer (there's no
//! real inference engine in this repo), sleeps for a bounded simulated inference latency,
//! releases the descriptor, and publishes a [`DetectionRecord`]. Exercises the same
//! shared-memory contract a real detector consumes.

use crate::error::PetcamError;
use crate::names::{self, CAMERA_DAY, CAMERA_NIGHT};
use crate::shm::{retry_attach, ControlRecord, Detection, DetectionRecord, LatestRegion, ZcRegion};
use petcam_pool::{FrameBuffer, Pool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded simulated inference latency; real detectors vary, this keeps the shim's own loop
/// from starving the descriptor it just imported.
const SIMULATED_INFERENCE_LATENCY: Duration = Duration::from_millis(20);

/// Capacity of each pooled import buffer: large enough for the reference platform's biggest
/// NV12 frame (1920x1080 @ 4:2:0 is ~3 MB; rounded up with headroom).
const IMPORT_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;
/// Two slots is enough for one in-flight import plus one draining while the next publishes.
const IMPORT_POOL_SIZE: usize = 2;

/// Owns no shared memory; attaches read-only to the control region and both cameras'
/// zero-copy descriptors, and owns (creates) the detections region as its sole writer.
pub struct DetectionShim {
    control: LatestRegion<ControlRecord>,
    day_zc: ZcRegion,
    night_zc: ZcRegion,
    detections: LatestRegion<DetectionRecord>,
    last_sequence_seen: u64,
    /// Scratch buffers for the process-local copy "imported" from the DMA descriptor — the
    /// pool's documented third use case (see `petcam_pool` module docs).
    import_pool: Arc<Pool<FrameBuffer>>,
}

impl DetectionShim {
    pub fn start() -> Result<Self, PetcamError> {
        let control = retry_attach(|| LatestRegion::open(names::CONTROL))?;
        let day_zc = retry_attach(|| ZcRegion::open(&names::zero_copy(CAMERA_DAY)))?;
        let night_zc = retry_attach(|| ZcRegion::open(&names::zero_copy(CAMERA_NIGHT)))?;
        let detections = LatestRegion::create(names::DETECTIONS, DetectionRecord::empty())?;
        let import_pool = Pool::new_simple(IMPORT_POOL_SIZE, || FrameBuffer::with_capacity(IMPORT_BUFFER_CAPACITY));

        Ok(Self { control, day_zc, night_zc, detections, last_sequence_seen: 0, import_pool })
    }

    /// One detection cycle: look up the active camera, import its descriptor, skip it if it's
    /// a repeat of the last sequence seen (tolerating bounded bursts of stale descriptors),
    /// otherwise simulate inference and publish.
    pub fn tick(&mut self) {
        let (control, _version) = match self.control.read() {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "control region read failed, skipping this cycle");
                return;
            }
        };

        let active = if control.active_camera == i32::from(CAMERA_NIGHT) { &self.night_zc } else { &self.day_zc };
        let (descriptor, _version) = active.read();

        if descriptor.sequence == 0 || descriptor.sequence == self.last_sequence_seen {
            debug!(sequence = descriptor.sequence, "stale or absent descriptor, skipping");
            return;
        }

        let Some(mut imported) = self.import_pool.try_acquire() else {
            warn!("detection import pool exhausted, dropping this cycle");
            return;
        };
        import_frame(imported.get_mut(), &descriptor);

        std::thread::sleep(SIMULATED_INFERENCE_LATENCY);
        let found = simulate_inference(imported.get());
        active.release();

        let now = wall_clock_now();
        let record = DetectionRecord::from_detections(descriptor.sequence, descriptor.camera_id, now, found);
        self.detections.publish(record);
        self.last_sequence_seen = descriptor.sequence;
    }

    pub fn shutdown(self) -> std::io::Result<()> {
        self.detections.destroy()
    }
}

/// Copy the descriptor's metadata (and a stand-in payload — there is no real DMA_BUF
/// re-import in this simulation, per the HAL's software-only build) into a pooled buffer,
/// local to this process, the way a real detector would import the shared buffer once.
fn import_frame(buffer: &mut FrameBuffer, descriptor: &crate::shm::ZcDescriptor) {
    buffer.reset();
    let len = (descriptor.width as usize * descriptor.height as usize * 3 / 2).min(buffer.capacity());
    buffer.bytes[..len].fill(descriptor.brightness_avg);
    buffer.actual_len = len;
    buffer.sequence = descriptor.sequence;
    buffer.camera_id = descriptor.camera_id;
    buffer.width = descriptor.width;
    buffer.height = descriptor.height;
}

/// Placeholder inference: this shim exercises the shared-memory contract, not a model. A
/// brighter-than-midtone imported frame "detects" nothing; a darker one reports one
/// low-confidence stand-in detection so downstream consumers have something non-trivial to
/// read.
fn simulate_inference(imported: &FrameBuffer) -> Vec<Detection> {
    let brightness = imported.payload().first().copied().unwrap_or(0);
    if brightness >= 128 {
        return Vec::new();
    }
    vec![Detection::new("object", 0.5, (0, 0, imported.width as i32, imported.height as i32))]
}

fn wall_clock_now() -> (i64, i64) {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => (duration.as_secs() as i64, i64::from(duration.subsec_nanos())),
        Err(_) => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::ZcDescriptor;
    use serial_test::serial;

    #[test]
    #[serial]
    fn tick_skips_when_no_frame_has_been_published_yet() {
        let control = LatestRegion::create(names::CONTROL, ControlRecord { active_camera: i32::from(CAMERA_DAY), _reserved: 0 }).unwrap();
        let day_zc = ZcRegion::create(&names::zero_copy(CAMERA_DAY), CAMERA_DAY).unwrap();
        let night_zc = ZcRegion::create(&names::zero_copy(CAMERA_NIGHT), CAMERA_NIGHT).unwrap();

        let mut shim = DetectionShim::start().unwrap();
        shim.tick();

        let reader = LatestRegion::<DetectionRecord>::open(names::DETECTIONS).unwrap();
        let (record, _version) = reader.read().unwrap();
        assert_eq!(record.sequence, 0, "no publish should have happened yet");

        shim.shutdown().ok();
        control.destroy().ok();
        day_zc.destroy().ok();
        night_zc.destroy().ok();
    }

    #[test]
    #[serial]
    fn tick_publishes_once_per_new_sequence_and_skips_repeats() {
        let control = LatestRegion::create(names::CONTROL, ControlRecord { active_camera: i32::from(CAMERA_DAY), _reserved: 0 }).unwrap();
        let mut day_zc = ZcRegion::create(&names::zero_copy(CAMERA_DAY), CAMERA_DAY).unwrap();
        let night_zc = ZcRegion::create(&names::zero_copy(CAMERA_NIGHT), CAMERA_NIGHT).unwrap();

        let mut descriptor = ZcDescriptor::empty(CAMERA_DAY);
        descriptor.sequence = 42;
        descriptor.brightness_avg = 10;
        descriptor.width = 100;
        descriptor.height = 50;
        day_zc.publish(descriptor);

        let mut shim = DetectionShim::start().unwrap();
        shim.tick();
        shim.tick(); // same sequence again, must be skipped

        let reader = LatestRegion::<DetectionRecord>::open(names::DETECTIONS).unwrap();
        let (record, version) = reader.read().unwrap();
        assert_eq!(record.sequence, 42);
        assert_eq!(record.detection_count, 1);
        assert_eq!(version, 1, "the repeat tick must not have published again");

        shim.shutdown().ok();
        control.destroy().ok();
        day_zc.destroy().ok();
        night_zc.destroy().ok();
    }
}
