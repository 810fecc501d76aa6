//! Ring buffer region: N fixed-size frame slots behind an atomic write index.
//!
//! Layout is a fixed header (write index, frame-interval hint) followed by `N` slots,
//! each a small fixed header plus a bounded
//! payload buffer. The update semaphore lives outside the mapping as a named POSIX
//! semaphore (see [`crate::shm::semaphore`] for why), not inlined into the header bytes.
//!
//! Slot size varies per named region (NV12 frames are much larger than H.264 NAL bursts),
//! so unlike a `#[repr(C)]` fixed-size array this region computes its slot stride at
//! `create`/`open` time from a header field, then indexes into the mapping by raw offset.

use super::{PixelFormat, RING_MAGIC};
use crate::error::ShmError;
use crate::shm::region::{create_mapping, open_mapping, unlink};
use crate::shm::semaphore::{NamedSemaphore, WaitOutcome};
use memmap2::MmapMut;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Fixed prefix of the region: magic, slot count, payload capacity, write index, frame
/// interval hint. All readers validate this before trusting anything past it.
#[repr(C)]
struct RingHeader {
    magic: AtomicU32,
    slot_count: AtomicU32,
    payload_capacity: AtomicU32,
    _reserved: AtomicU32,
    write_index: AtomicU64,
    frame_interval_ms: AtomicU32,
    _pad: AtomicU32,
}

const HEADER_SIZE: usize = std::mem::size_of::<RingHeader>();

/// Fixed per-slot header preceding each slot's payload bytes.
#[repr(C)]
#[derive(Clone, Copy)]
struct SlotHeader {
    sequence: u64,
    timestamp_sec: i64,
    timestamp_nsec: i64,
    camera_id: u8,
    _pad0: [u8; 3],
    width: u32,
    height: u32,
    format: u32,
    payload_len: u32,
}

const SLOT_HEADER_SIZE: usize = std::mem::size_of::<SlotHeader>();

/// Owned snapshot of one ring slot, handed to callers on publish and read.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub sequence: u64,
    pub timestamp_sec: i64,
    pub timestamp_nsec: i64,
    pub camera_id: u8,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub payload: Vec<u8>,
}

/// A ring-buffer region: either the owning writer or a read-write attacher.
pub struct RingRegion {
    name: String,
    mmap: MmapMut,
    semaphore: NamedSemaphore,
    slot_count: usize,
    payload_capacity: usize,
    slot_stride: usize,
    is_owner: bool,
}

impl RingRegion {
    fn total_size(slot_count: usize, payload_capacity: usize) -> usize {
        HEADER_SIZE + slot_count * (SLOT_HEADER_SIZE + payload_capacity)
    }

    /// Create (as owner) a ring of `slot_count` slots, each able to hold up to
    /// `payload_capacity` payload bytes. Unlinks any stale region of the same name first.
    pub fn create(
        name: &str,
        slot_count: usize,
        payload_capacity: usize,
        frame_interval_ms: u32,
    ) -> Result<Self, ShmError> {
        let size = Self::total_size(slot_count, payload_capacity);
        let mut mmap = create_mapping(name, size)?;

        // SAFETY: `mmap` is freshly allocated and exactly `size` bytes; the header type's
        // size and alignment are both satisfied by this offset (0).
        let header = unsafe { &*(mmap.as_mut_ptr().cast::<RingHeader>()) };
        header.magic.store(RING_MAGIC, Ordering::Relaxed);
        header.slot_count.store(slot_count as u32, Ordering::Relaxed);
        header.payload_capacity.store(payload_capacity as u32, Ordering::Relaxed);
        header.write_index.store(0, Ordering::Relaxed);
        header.frame_interval_ms.store(frame_interval_ms, Ordering::Relaxed);

        let semaphore = NamedSemaphore::create(&sem_name(name))?;

        Ok(Self {
            name: name.to_string(),
            mmap,
            semaphore,
            slot_count,
            payload_capacity,
            slot_stride: SLOT_HEADER_SIZE + payload_capacity,
            is_owner: true,
        })
    }

    /// Attach read-write to an existing ring, learning its slot count and payload capacity
    /// from the header rather than requiring the caller to know them up front.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        // Probe the header first with a minimal mapping, then remap at the true size.
        let probe = open_mapping(name, HEADER_SIZE)?;
        // SAFETY: `probe` is HEADER_SIZE bytes, matching RingHeader's layout exactly.
        let header = unsafe { &*(probe.as_ptr().cast::<RingHeader>()) };
        let magic = header.magic.load(Ordering::Acquire);
        if magic != RING_MAGIC {
            return Err(ShmError::BadMagic(name.to_string()));
        }
        let slot_count = header.slot_count.load(Ordering::Acquire) as usize;
        let payload_capacity = header.payload_capacity.load(Ordering::Acquire) as usize;
        drop(probe);

        let size = Self::total_size(slot_count, payload_capacity);
        let mmap = open_mapping(name, size)?;
        let semaphore = NamedSemaphore::open(&sem_name(name))?;

        Ok(Self {
            name: name.to_string(),
            mmap,
            semaphore,
            slot_count,
            payload_capacity,
            slot_stride: SLOT_HEADER_SIZE + payload_capacity,
            is_owner: false,
        })
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: the mapping is at least HEADER_SIZE bytes (enforced at create/open) and
        // is never remapped after construction.
        unsafe { &*(self.mmap.as_ptr().cast::<RingHeader>()) }
    }

    fn slot_offset(&self, index: usize) -> usize {
        HEADER_SIZE + (index % self.slot_count) * self.slot_stride
    }

    /// Write one frame into the next slot, bump the write index, and signal the semaphore.
    /// This must not block, and never does: it's a bounded memcpy.
    pub fn publish(&mut self, record: &FrameRecord) -> Result<(), ShmError> {
        if record.payload.len() > self.payload_capacity {
            return Err(ShmError::PayloadTooLarge {
                len: record.payload.len(),
                capacity: self.payload_capacity,
            });
        }

        let index = self.header().write_index.load(Ordering::Relaxed);
        let offset = self.slot_offset(index as usize);
        let slot_header = SlotHeader {
            sequence: record.sequence,
            timestamp_sec: record.timestamp_sec,
            timestamp_nsec: record.timestamp_nsec,
            camera_id: record.camera_id,
            _pad0: [0; 3],
            width: record.width,
            height: record.height,
            format: record.format as u32,
            payload_len: record.payload.len() as u32,
        };

        // SAFETY: `offset` is within the mapping by construction (slot_offset is bounded by
        // slot_count * slot_stride, which total_size() accounts for). The header write and
        // payload copy both land entirely inside this slot's byte range, never past it
        // because payload.len() <= self.payload_capacity was checked above.
        unsafe {
            let slot_ptr = self.mmap.as_mut_ptr().add(offset);
            std::ptr::write_unaligned(slot_ptr.cast::<SlotHeader>(), slot_header);
            let payload_ptr = slot_ptr.add(SLOT_HEADER_SIZE);
            std::ptr::copy_nonoverlapping(record.payload.as_ptr(), payload_ptr, record.payload.len());
        }

        // Release-ordered: the slot write above must be visible to any consumer that
        // observes the incremented index with an acquire load.
        self.header().write_index.fetch_add(1, Ordering::Release);

        if let Err(err) = self.semaphore.post() {
            tracing::warn!(region = %self.name, error = %err, "ring semaphore post failed, best-effort wake lost");
        }

        Ok(())
    }

    /// Snapshot the most recently published frame, if any have been published yet.
    #[must_use]
    pub fn read_latest(&self) -> Option<FrameRecord> {
        let index = self.header().write_index.load(Ordering::Acquire);
        if index == 0 {
            return None;
        }
        let offset = self.slot_offset((index - 1) as usize);

        // SAFETY: `offset` is within the mapping (see publish()); the acquire load above
        // establishes happens-before with the writer's release store, so the slot bytes we
        // read here reflect a complete write, not a torn one.
        let slot_header = unsafe {
            std::ptr::read_unaligned(self.mmap.as_ptr().add(offset).cast::<SlotHeader>())
        };
        let payload_len = (slot_header.payload_len as usize).min(self.payload_capacity);
        let payload = unsafe {
            let payload_ptr = self.mmap.as_ptr().add(offset + SLOT_HEADER_SIZE);
            std::slice::from_raw_parts(payload_ptr, payload_len).to_vec()
        };

        let format = PixelFormat::from_tag(slot_header.format).unwrap_or(PixelFormat::Nv12);

        Some(FrameRecord {
            sequence: slot_header.sequence,
            timestamp_sec: slot_header.timestamp_sec,
            timestamp_nsec: slot_header.timestamp_nsec,
            camera_id: slot_header.camera_id,
            width: slot_header.width,
            height: slot_header.height,
            format,
            payload,
        })
    }

    /// Block up to `timeout` for the next publish.
    pub fn wait_update(&self, timeout: Duration) -> Result<WaitOutcome, ShmError> {
        self.semaphore.wait_timeout(timeout)
    }

    #[must_use]
    pub fn write_index(&self) -> u64 {
        self.header().write_index.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        self.payload_capacity
    }

    /// Unlink the region and its semaphore. Only the owner should call this, at orderly
    /// shutdown; a crash-leftover region is unlinked instead by the next `create()`.
    pub fn destroy(self) -> std::io::Result<()> {
        if self.is_owner {
            self.semaphore.unlink()?;
            unlink(&self.name)?;
        }
        Ok(())
    }
}

fn sem_name(region_name: &str) -> String {
    format!("{region_name}_sem")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sequence: u64, payload: Vec<u8>) -> FrameRecord {
        FrameRecord {
            sequence,
            timestamp_sec: 1,
            timestamp_nsec: 0,
            camera_id: 0,
            width: 4,
            height: 2,
            format: PixelFormat::Nv12,
            payload,
        }
    }

    #[test]
    fn publish_then_read_round_trips() {
        let name = "/petcam_test_ring_round_trip";
        let mut owner = RingRegion::create(name, 4, 16, 33).unwrap();
        owner.publish(&sample(1, vec![0xAA; 12])).unwrap();

        let attacher = RingRegion::open(name).unwrap();
        let frame = attacher.read_latest().unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.payload, vec![0xAA; 12]);

        owner.destroy().unwrap();
    }

    #[test]
    fn write_index_never_decreases_across_wraparound() {
        let name = "/petcam_test_ring_wraparound";
        let mut owner = RingRegion::create(name, 3, 8, 33).unwrap();

        let mut last_index = 0;
        for seq in 0..10u64 {
            owner.publish(&sample(seq, vec![seq as u8; 4])).unwrap();
            let index = owner.write_index();
            assert!(index >= last_index);
            last_index = index;
        }

        let frame = owner.read_latest().unwrap();
        assert_eq!(frame.sequence, 9, "last published frame must be the latest readable one");
        owner.destroy().unwrap();
    }

    #[test]
    fn oversized_payload_is_rejected_not_written() {
        let name = "/petcam_test_ring_oversized";
        let mut owner = RingRegion::create(name, 2, 4, 33).unwrap();
        let result = owner.publish(&sample(1, vec![0u8; 100]));
        assert!(matches!(result, Err(ShmError::PayloadTooLarge { .. })));
        owner.destroy().unwrap();
    }

    #[test]
    fn open_validates_magic() {
        let name = "/petcam_test_ring_not_a_ring";
        {
            // create a region that is not a ring (wrong magic) and confirm open() refuses it
            let _plain = create_mapping(name, HEADER_SIZE).unwrap();
        }
        let result = RingRegion::open(name);
        assert!(matches!(result, Err(ShmError::BadMagic(_))));
        unlink(name).ok();
    }
}
