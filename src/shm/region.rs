//! Low-level POSIX shared-memory backing: `shm_open` + `ftruncate` + `mmap`.
//!
//! Every region shape (ring, latest-value, zero-copy descriptor) is built on top of
//! [`create_mapping`] / [`open_mapping`]. We go through raw `libc::shm_open` rather than a
//! plain file under `/dev/shm` so region names match the POSIX shared-memory namespace
//! directly (`shm_open` prepends nothing, unlike a path-based `File::create`), and so
//! `shm_unlink` gives us the "crash-leftover regions must be unlinkable and recreatable"
//! behaviour the data model requires.

use crate::error::ShmError;
use memmap2::{MmapMut, MmapOptions};
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;

fn cname(name: &str) -> Result<CString, ShmError> {
    CString::new(name).map_err(|_| ShmError::Mapping {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "region name contains interior NUL"),
    })
}

/// Unlink any previous shared-memory object of this name, then create a fresh one of
/// `size` bytes and map it read-write. Used by the single owner of a region.
pub fn create_mapping(name: &str, size: usize) -> Result<MmapMut, ShmError> {
    let cname = cname(name)?;

    // SAFETY: shm_unlink on an absent object just returns ENOENT, which we ignore; cname
    // outlives the call.
    unsafe {
        libc::shm_unlink(cname.as_ptr());
    }

    // SAFETY: cname is valid for the call; O_CREAT|O_EXCL|O_RDWR with mode 0o660 matches the
    // documented shm_open contract for a freshly created object.
    let fd = unsafe {
        libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, 0o660u32)
    };
    if fd < 0 {
        return Err(ShmError::Mapping { name: name.to_string(), source: io::Error::last_os_error() });
    }

    // SAFETY: fd is a just-opened, valid shared-memory descriptor; ftruncate sizing it
    // before mapping is required by POSIX (a fresh shm object starts at size 0).
    let rc = unsafe { libc::ftruncate(fd, size as libc::off_t) };
    if rc != 0 {
        let source = io::Error::last_os_error();
        // SAFETY: fd is still open and owned by us at this point.
        unsafe { libc::close(fd) };
        return Err(ShmError::Mapping { name: name.to_string(), source });
    }

    // SAFETY: fd was returned by shm_open and is valid and open; File takes ownership and
    // will close it on drop once mmap has taken its own reference via dup-on-map semantics
    // (mmap does not require the fd to stay open afterward, but MmapOptions keeps the File
    // alive for the duration of the mapping regardless).
    let file = unsafe { File::from_raw_fd(fd) };

    // SAFETY: the backing file was just created and sized; nothing else maps it yet in this
    // process, and cross-process concurrent mapping of shared memory is exactly this API's
    // intended use.
    let mmap = unsafe {
        MmapOptions::new()
            .len(size)
            .map_mut(&file)
            .map_err(|source| ShmError::Mapping { name: name.to_string(), source })?
    };

    Ok(mmap)
}

/// Attach read-write to an existing region of `size` bytes.
pub fn open_mapping(name: &str, size: usize) -> Result<MmapMut, ShmError> {
    let cname = cname(name)?;

    // SAFETY: cname is valid for the call; O_CREAT is intentionally omitted.
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o660u32) };
    if fd < 0 {
        let source = io::Error::last_os_error();
        return if source.raw_os_error() == Some(libc::ENOENT) {
            Err(ShmError::NotFound(name.to_string()))
        } else {
            Err(ShmError::Mapping { name: name.to_string(), source })
        };
    }

    // SAFETY: fd is a valid, open shared-memory descriptor owned by this File from here on.
    let file = unsafe { File::from_raw_fd(fd) };

    // SAFETY: the region was sized by its owner at creation; mapping the same `size` here
    // is the caller's responsibility (enforced by each region type validating its header).
    let mmap = unsafe {
        MmapOptions::new()
            .len(size)
            .map_mut(&file)
            .map_err(|source| ShmError::Mapping { name: name.to_string(), source })?
    };

    Ok(mmap)
}

/// Remove a region's name from the shared-memory namespace. Only the owner calls this, at
/// orderly shutdown.
pub fn unlink(name: &str) -> io::Result<()> {
    let cname = CString::new(name).expect("region name has no interior NUL");
    // SAFETY: cname valid for the call; unlinking with live mappings elsewhere is
    // well-defined (they remain valid until unmapped).
    let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_see_same_bytes() {
        let name = "/petcam_test_region_round_trip";
        let mut owner = create_mapping(name, 4096).unwrap();
        owner[0] = 0xAB;

        let attacher = open_mapping(name, 4096).unwrap();
        assert_eq!(attacher[0], 0xAB);

        unlink(name).unwrap();
    }

    #[test]
    fn open_missing_region_is_not_found() {
        let result = open_mapping("/petcam_test_region_does_not_exist", 4096);
        assert!(matches!(result, Err(ShmError::NotFound(_))));
    }

    #[test]
    fn create_unlinks_stale_region_first() {
        let name = "/petcam_test_region_stale";
        {
            let mut first = create_mapping(name, 4096).unwrap();
            first[0] = 0xFF;
        }
        // Simulate a crash: the mapping above is dropped without calling unlink().
        let second = create_mapping(name, 4096).unwrap();
        assert_eq!(second[0], 0, "create() must unlink any stale region before mapping fresh");
        unlink(name).unwrap();
    }
}
