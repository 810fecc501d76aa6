//! Typed shared-memory regions: the only channel producers and consumers use to talk
//! across process boundaries.
//!
//! Three region shapes, one per data-model entity:
//! - [`ring`]: a fixed-capacity ring of frame slots (NV12 / H.264 / MJPEG payloads).
//! - [`latest`]: a single-record region with a version counter (control word, detections).
//! - [`zerocopy`]: a per-camera descriptor carrying a HAL graphic-buffer reference plus
//!   brightness, for the probe/switch path and the detection boundary.
//!
//! [`region`] and [`semaphore`] are the shared low-level primitives (`mmap`, named
//! semaphores) all three shapes are built on.

pub mod detection;
pub mod latest;
pub mod region;
pub mod ring;
pub mod semaphore;
pub mod zerocopy;

pub use detection::{Detection, DetectionRecord, LABEL_CAPACITY, MAX_DETECTIONS};
pub use latest::{ControlRecord, LatestRegion};
pub use ring::{FrameRecord, RingRegion};
pub use semaphore::{NamedSemaphore, WaitOutcome};
pub use zerocopy::{PlaneDescriptor, ZcDescriptor, ZcRegion, MAX_PLANES};

use crate::error::ShmError;
use crate::names::{ATTACH_POLL_INTERVAL, ATTACH_RETRY_TIMEOUT};
use std::time::Instant;

/// Retry `open` for up to [`ATTACH_RETRY_TIMEOUT`], polling every [`ATTACH_POLL_INTERVAL`]:
/// a bounded retry window before giving up with `NotFound`. Only [`ShmError::NotFound`]
/// is retried; every other error returns immediately.
pub fn retry_attach<T>(mut open: impl FnMut() -> Result<T, ShmError>) -> Result<T, ShmError> {
    let deadline = Instant::now() + ATTACH_RETRY_TIMEOUT;
    loop {
        match open() {
            Ok(value) => return Ok(value),
            Err(ShmError::NotFound(name)) => {
                if Instant::now() >= deadline {
                    return Err(ShmError::NotFound(name));
                }
                std::thread::sleep(ATTACH_POLL_INTERVAL);
            }
            Err(other) => return Err(other),
        }
    }
}

/// Pixel-format tag carried by every ring slot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PixelFormat {
    Nv12 = 0,
    Jpeg = 1,
    Rgb = 2,
    H264 = 3,
}

impl PixelFormat {
    #[must_use]
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Nv12),
            1 => Some(Self::Jpeg),
            2 => Some(Self::Rgb),
            3 => Some(Self::H264),
            _ => None,
        }
    }
}

/// Magic number stamped into every region header; `open()` refuses to attach to a region
/// whose magic doesn't match, catching stale or foreign regions of the same name early
/// rather than silently misinterpreting bytes.
pub(crate) const RING_MAGIC: u32 = 0x5043_5246; // "PCRF"
pub(crate) const LATEST_MAGIC: u32 = 0x5043_4C54; // "PCLT"
pub(crate) const ZC_MAGIC: u32 = 0x5043_5A43; // "PCZC"

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_attach_succeeds_immediately_when_region_already_exists() {
        let name = "/petcam_test_retry_attach_present";
        let _owner = RingRegion::create(name, 2, 8, 33).unwrap();
        let attached = retry_attach(|| RingRegion::open(name));
        assert!(attached.is_ok());
        region::unlink(name).ok();
    }

    #[test]
    fn retry_attach_propagates_non_not_found_errors_immediately() {
        let name = "/petcam_test_retry_attach_bad_magic";
        let _plain = region::create_mapping(name, 64).unwrap();
        let started = std::time::Instant::now();
        let result = retry_attach(|| RingRegion::open(name));
        assert!(matches!(result, Err(ShmError::BadMagic(_))));
        assert!(started.elapsed() < std::time::Duration::from_millis(500), "non-NotFound errors must not be retried");
        region::unlink(name).ok();
    }

    #[test]
    fn pixel_format_round_trips_through_tag() {
        for fmt in [PixelFormat::Nv12, PixelFormat::Jpeg, PixelFormat::Rgb, PixelFormat::H264] {
            assert_eq!(PixelFormat::from_tag(fmt as u32), Some(fmt));
        }
        assert_eq!(PixelFormat::from_tag(99), None);
    }
}
