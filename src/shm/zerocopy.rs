//! Zero-copy descriptor region: one per physical camera, always published regardless of
//! active status, carrying everything another process needs to re-import the underlying
//! DMA graphic buffer.
//!
//! Two semaphores per region, not one: `new_frame` wakes waiters when the producer
//! publishes, `release` wakes the producer (if it ever waits, today it doesn't) when a
//! consumer is done importing.

use super::ZC_MAGIC;
use crate::error::ShmError;
use crate::shm::region::{create_mapping, open_mapping, unlink};
use crate::shm::semaphore::{NamedSemaphore, WaitOutcome};
use memmap2::MmapMut;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Maximum planes a descriptor can carry; NV12 needs 2, but the record is sized to allow
/// for a future RGB/planar format without a layout change.
pub const MAX_PLANES: usize = 4;

/// One plane's worth of DMA-buffer re-import metadata.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneDescriptor {
    pub dma_fd: i32,
    pub share_id: u64,
    pub phys_addr: u64,
    pub virt_addr: u64,
    pub size: u32,
    pub stride: u32,
    pub offset: u32,
    pub _pad: u32,
}

#[repr(C)]
struct ZcHeader {
    magic: AtomicU32,
    version: AtomicU32,
    consumed: AtomicU8,
    _pad: [u8; 3],
}

const HEADER_SIZE: usize = std::mem::size_of::<ZcHeader>();

/// The descriptor record itself: frame sequence, timestamp, camera id, width/height/
/// format, brightness, correction flag, and the full HAL buffer reference.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ZcDescriptor {
    pub sequence: u64,
    pub timestamp_sec: i64,
    pub timestamp_nsec: i64,
    pub camera_id: u8,
    pub brightness_avg: u8,
    pub correction_applied: u8,
    pub contiguous: u8,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub plane_count: u32,
    pub planes: [PlaneDescriptor; MAX_PLANES],
}

impl ZcDescriptor {
    #[must_use]
    pub fn empty(camera_id: u8) -> Self {
        Self {
            sequence: 0,
            timestamp_sec: 0,
            timestamp_nsec: 0,
            camera_id,
            brightness_avg: 0,
            correction_applied: 0,
            contiguous: 0,
            width: 0,
            height: 0,
            format: 0,
            plane_count: 0,
            planes: [PlaneDescriptor::default(); MAX_PLANES],
        }
    }
}

/// A per-camera zero-copy descriptor region.
pub struct ZcRegion {
    name: String,
    mmap: MmapMut,
    new_frame_sem: NamedSemaphore,
    release_sem: NamedSemaphore,
    is_owner: bool,
}

impl ZcRegion {
    fn total_size() -> usize {
        HEADER_SIZE + std::mem::size_of::<ZcDescriptor>()
    }

    /// Create (as owner, the capture pipeline for this camera).
    pub fn create(name: &str, camera_id: u8) -> Result<Self, ShmError> {
        let mut mmap = create_mapping(name, Self::total_size())?;

        // SAFETY: the mapping is total_size() bytes; header occupies the first HEADER_SIZE.
        let header = unsafe { &*(mmap.as_mut_ptr().cast::<ZcHeader>()) };
        header.magic.store(ZC_MAGIC, Ordering::Relaxed);
        header.version.store(0, Ordering::Relaxed);
        header.consumed.store(1, Ordering::Relaxed);

        // SAFETY: offset HEADER_SIZE reserves exactly size_of::<ZcDescriptor>() bytes.
        unsafe {
            let record_ptr = mmap.as_mut_ptr().add(HEADER_SIZE).cast::<ZcDescriptor>();
            std::ptr::write_unaligned(record_ptr, ZcDescriptor::empty(camera_id));
        }

        let new_frame_sem = NamedSemaphore::create(&new_frame_sem_name(name))?;
        let release_sem = NamedSemaphore::create(&release_sem_name(name))?;

        Ok(Self { name: name.to_string(), mmap, new_frame_sem, release_sem, is_owner: true })
    }

    /// Attach read-write (the switch controller or detection shim).
    pub fn open(name: &str) -> Result<Self, ShmError> {
        let mmap = open_mapping(name, Self::total_size())?;
        // SAFETY: see create().
        let header = unsafe { &*(mmap.as_ptr().cast::<ZcHeader>()) };
        if header.magic.load(Ordering::Acquire) != ZC_MAGIC {
            return Err(ShmError::BadMagic(name.to_string()));
        }

        let new_frame_sem = NamedSemaphore::open(&new_frame_sem_name(name))?;
        let release_sem = NamedSemaphore::open(&release_sem_name(name))?;

        Ok(Self { name: name.to_string(), mmap, new_frame_sem, release_sem, is_owner: false })
    }

    fn header(&self) -> &ZcHeader {
        // SAFETY: see create()/open().
        unsafe { &*(self.mmap.as_ptr().cast::<ZcHeader>()) }
    }

    /// Overwrite the descriptor in place, bump the version, mark unconsumed, and signal
    /// `new_frame`. Called every frame by the owning capture pipeline regardless of active
    /// status: a descriptor is published every frame, active or not.
    pub fn publish(&mut self, descriptor: ZcDescriptor) {
        // SAFETY: offset HEADER_SIZE holds a valid ZcDescriptor for this mapping's lifetime;
        // only the owning process writes here.
        unsafe {
            let record_ptr = self.mmap.as_mut_ptr().add(HEADER_SIZE).cast::<ZcDescriptor>();
            std::ptr::write_unaligned(record_ptr, descriptor);
        }
        self.header().consumed.store(0, Ordering::Release);
        self.header().version.fetch_add(1, Ordering::Release);

        if let Err(err) = self.new_frame_sem.post() {
            tracing::warn!(region = %self.name, error = %err, "zero-copy new-frame semaphore post failed");
        }
    }

    /// Snapshot the current descriptor and the version it was read at.
    #[must_use]
    pub fn read(&self) -> (ZcDescriptor, u32) {
        let version = self.header().version.load(Ordering::Acquire);
        // SAFETY: see publish(); a torn read here would only ever be a transient stale view
        // (the next frame overwrites it), acceptable per the zero-copy lifetime invariant.
        let descriptor = unsafe {
            std::ptr::read_unaligned(self.mmap.as_ptr().add(HEADER_SIZE).cast::<ZcDescriptor>())
        };
        (descriptor, version)
    }

    /// Consumer signals it has finished importing the DMA buffer. This should happen within
    /// one frame interval; the producer does not block waiting for it.
    pub fn release(&self) {
        self.header().consumed.store(1, Ordering::Release);
        if let Err(err) = self.release_sem.post() {
            tracing::warn!(region = %self.name, error = %err, "zero-copy release semaphore post failed");
        }
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.header().consumed.load(Ordering::Acquire) != 0
    }

    pub fn wait_new_frame(&self, timeout: Duration) -> Result<WaitOutcome, ShmError> {
        self.new_frame_sem.wait_timeout(timeout)
    }

    pub fn wait_release(&self, timeout: Duration) -> Result<WaitOutcome, ShmError> {
        self.release_sem.wait_timeout(timeout)
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.header().version.load(Ordering::Acquire)
    }

    pub fn destroy(self) -> std::io::Result<()> {
        if self.is_owner {
            self.new_frame_sem.unlink()?;
            self.release_sem.unlink()?;
            unlink(&self.name)?;
        }
        Ok(())
    }
}

fn new_frame_sem_name(region_name: &str) -> String {
    format!("{region_name}_new_sem")
}

fn release_sem_name(region_name: &str) -> String {
    format!("{region_name}_release_sem")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_marks_unconsumed_then_release_marks_consumed() {
        let name = "/petcam_test_zc_consume_cycle";
        let mut owner = ZcRegion::create(name, 0).unwrap();
        assert!(owner.is_consumed(), "freshly created descriptor starts consumed");

        let mut descriptor = ZcDescriptor::empty(0);
        descriptor.sequence = 7;
        owner.publish(descriptor);
        assert!(!owner.is_consumed());

        let attacher = ZcRegion::open(name).unwrap();
        let (read_back, _version) = attacher.read();
        assert_eq!(read_back.sequence, 7);

        attacher.release();
        assert!(owner.is_consumed());

        owner.destroy().unwrap();
    }

    #[test]
    fn version_advances_on_every_publish_even_while_inactive() {
        let name = "/petcam_test_zc_always_publishes";
        let mut owner = ZcRegion::create(name, 1).unwrap();
        for seq in 1..=5u64 {
            let mut descriptor = ZcDescriptor::empty(1);
            descriptor.sequence = seq;
            owner.publish(descriptor);
        }
        assert_eq!(owner.version(), 5);
        owner.destroy().unwrap();
    }
}
