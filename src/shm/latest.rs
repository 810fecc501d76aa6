//! Latest-value region: a single record plus a version counter, no ring.
//!
//! Used for the active-camera control word and the detection record. `T` must be `Copy`
//! and `#[repr(C)]` so the whole record can be written and read as a flat byte blob with
//! no interior pointers.

use super::LATEST_MAGIC;
use crate::error::ShmError;
use crate::shm::region::{create_mapping, open_mapping, unlink};
use crate::shm::semaphore::{NamedSemaphore, WaitOutcome};
use memmap2::MmapMut;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// How many times [`LatestRegion::read`] retries on a version mismatch before giving up:
/// a small, fixed bound of three attempts.
const READ_RETRY_BOUND: u32 = 3;

#[repr(C)]
struct LatestHeader {
    magic: AtomicU32,
    record_size: AtomicU32,
    version: AtomicU64,
}

const HEADER_SIZE: usize = std::mem::size_of::<LatestHeader>();

/// The 8-byte active-camera control word, published under `/pet_camera_control`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ControlRecord {
    pub active_camera: i32,
    pub _reserved: i32,
}

impl ControlRecord {
    #[must_use]
    pub fn uninitialised() -> Self {
        Self { active_camera: crate::names::CAMERA_UNINITIALISED, _reserved: 0 }
    }
}

/// A single-latest-value region, generic over its record type.
pub struct LatestRegion<T: Copy + 'static> {
    name: String,
    mmap: MmapMut,
    semaphore: NamedSemaphore,
    is_owner: bool,
    _record: PhantomData<T>,
}

impl<T: Copy + 'static> LatestRegion<T> {
    fn total_size() -> usize {
        HEADER_SIZE + std::mem::size_of::<T>()
    }

    /// Create (as owner), initialising the record to `initial`.
    pub fn create(name: &str, initial: T) -> Result<Self, ShmError> {
        let mut mmap = create_mapping(name, Self::total_size())?;

        // SAFETY: the mapping is exactly total_size() bytes, large enough for the header at
        // offset 0 and T immediately after it.
        let header = unsafe { &*(mmap.as_mut_ptr().cast::<LatestHeader>()) };
        header.magic.store(LATEST_MAGIC, Ordering::Relaxed);
        header.record_size.store(std::mem::size_of::<T>() as u32, Ordering::Relaxed);
        header.version.store(0, Ordering::Relaxed);

        // SAFETY: offset HEADER_SIZE is within the mapping and correctly sized/aligned for
        // T because total_size() reserves exactly size_of::<T>() bytes there; `create`
        // holds the only reference to this mapping at this point.
        unsafe {
            let record_ptr = mmap.as_mut_ptr().add(HEADER_SIZE).cast::<T>();
            std::ptr::write_unaligned(record_ptr, initial);
        }

        let semaphore = NamedSemaphore::create(&sem_name(name))?;

        Ok(Self { name: name.to_string(), mmap, semaphore, is_owner: true, _record: PhantomData })
    }

    /// Attach read-write to an existing latest-value region.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        let mmap = open_mapping(name, Self::total_size())?;
        // SAFETY: mapping is total_size() bytes, header lives at offset 0.
        let header = unsafe { &*(mmap.as_ptr().cast::<LatestHeader>()) };
        if header.magic.load(Ordering::Acquire) != LATEST_MAGIC {
            return Err(ShmError::BadMagic(name.to_string()));
        }
        if header.record_size.load(Ordering::Acquire) as usize != std::mem::size_of::<T>() {
            return Err(ShmError::BadMagic(name.to_string()));
        }

        let semaphore = NamedSemaphore::open(&sem_name(name))?;
        Ok(Self { name: name.to_string(), mmap, semaphore, is_owner: false, _record: PhantomData })
    }

    fn header(&self) -> &LatestHeader {
        // SAFETY: see create()/open().
        unsafe { &*(self.mmap.as_ptr().cast::<LatestHeader>()) }
    }

    /// Write `record`, bump the version, and signal the semaphore. This cannot fail: it's
    /// a write to already-mapped memory.
    pub fn publish(&mut self, record: T) {
        // SAFETY: offset HEADER_SIZE holds a valid T for the lifetime of this mapping; we
        // hold &mut self so no concurrent writer in this process races us (cross-process,
        // the region contract guarantees exactly one writer).
        unsafe {
            let record_ptr = self.mmap.as_mut_ptr().add(HEADER_SIZE).cast::<T>();
            std::ptr::write_unaligned(record_ptr, record);
        }
        self.header().version.fetch_add(1, Ordering::Release);

        if let Err(err) = self.semaphore.post() {
            tracing::warn!(region = %self.name, error = %err, "latest-value semaphore post failed, best-effort wake lost");
        }
    }

    /// Read the record with a version-stable retry loop: read version, read record, re-read
    /// version; if they differ, retry up to [`READ_RETRY_BOUND`] times. Returns the record
    /// with the version it was read at so callers can suppress duplicates.
    pub fn read(&self) -> Result<(T, u64), ShmError> {
        for _ in 0..READ_RETRY_BOUND {
            let before = self.header().version.load(Ordering::Acquire);
            // SAFETY: see header comment on the record's placement and lifetime.
            let record = unsafe {
                std::ptr::read_unaligned(self.mmap.as_ptr().add(HEADER_SIZE).cast::<T>())
            };
            let after = self.header().version.load(Ordering::Acquire);
            if before == after {
                return Ok((record, before));
            }
        }
        Err(ShmError::TornRead(self.name.clone(), READ_RETRY_BOUND))
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.header().version.load(Ordering::Acquire)
    }

    pub fn wait_update(&self, timeout: Duration) -> Result<WaitOutcome, ShmError> {
        self.semaphore.wait_timeout(timeout)
    }

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

    #[test]
    fn publish_then_read_sees_new_version() {
        let name = "/petcam_test_latest_round_trip";
        let mut owner = LatestRegion::create(name, ControlRecord::uninitialised()).unwrap();
        assert_eq!(owner.version(), 0);

        owner.publish(ControlRecord { active_camera: 0, _reserved: 0 });
        let attacher = LatestRegion::<ControlRecord>::open(name).unwrap();
        let (record, version) = attacher.read().unwrap();
        assert_eq!(record.active_camera, 0);
        assert_eq!(version, 1);

        owner.destroy().unwrap();
    }

    #[test]
    fn version_is_monotonic_across_publishes() {
        let name = "/petcam_test_latest_monotonic";
        let mut owner = LatestRegion::create(name, ControlRecord::uninitialised()).unwrap();
        let mut last = 0;
        for camera in 0..5 {
            owner.publish(ControlRecord { active_camera: camera, _reserved: 0 });
            let version = owner.version();
            assert!(version > last);
            last = version;
        }
        owner.destroy().unwrap();
    }
}
