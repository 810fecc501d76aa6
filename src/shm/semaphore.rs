//! POSIX named semaphore, cross-process, used for the update/release signal on every region.
//!
//! Backed directly by `libc::sem_*`, not a higher-level crate: unrelated processes need a
//! semaphore initialised with the cross-process attribute, which is exactly `sem_open`'s
//! contract — a named semaphore is cross-process by construction, unlike `sem_init` on a
//! `pshared` in-memory semaphore that would need careful placement inside the mapped
//! region instead.

use crate::error::ShmError;
use std::ffi::CString;
use std::io;
use std::time::Duration;

/// Outcome of a bounded semaphore wait, matching the three normal control-flow returns plus
/// a fatal case — `Timeout` and `Interrupted` are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    NewUpdate,
    Timeout,
    Interrupted,
}

/// A named POSIX semaphore. `Drop` closes (but does not unlink) the descriptor; only the
/// owner unlinks, via [`NamedSemaphore::unlink`].
pub struct NamedSemaphore {
    name: String,
    handle: *mut libc::sem_t,
}

// SAFETY: libc's named-semaphore functions are documented thread-safe and are designed for
// exactly this kind of cross-process sharing; the raw pointer here never aliases Rust
// references, only opaque kernel state.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Create (or re-create) a named semaphore with initial count 0, unlinking any stale
    /// semaphore of the same name first so a crash-leftover can't wedge start-up.
    pub fn create(name: &str) -> Result<Self, ShmError> {
        let cname = cname(name)?;

        // SAFETY: sem_unlink on a name that doesn't exist merely returns ENOENT, which we
        // ignore; it never touches memory beyond the CString we own.
        unsafe {
            libc::sem_unlink(cname.as_ptr());
        }

        // SAFETY: cname is a valid NUL-terminated C string for the duration of this call;
        // O_CREAT with mode 0o660 and initial value 0 matches sem_open's documented
        // contract, and the returned handle is owned by this NamedSemaphore.
        let handle = unsafe {
            libc::sem_open(cname.as_ptr(), libc::O_CREAT | libc::O_EXCL, 0o660u32, 0u32)
        };

        if handle == libc::SEM_FAILED {
            return Err(ShmError::Semaphore { name: name.to_string(), source: io::Error::last_os_error() });
        }

        Ok(Self { name: name.to_string(), handle })
    }

    /// Attach to an existing named semaphore.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        let cname = cname(name)?;

        // SAFETY: cname is valid for the call; O_CREAT is intentionally omitted so this
        // fails with ENOENT if the owner hasn't created the semaphore yet.
        let handle = unsafe { libc::sem_open(cname.as_ptr(), 0) };

        if handle == libc::SEM_FAILED {
            let source = io::Error::last_os_error();
            return if source.raw_os_error() == Some(libc::ENOENT) {
                Err(ShmError::NotFound(name.to_string()))
            } else {
                Err(ShmError::Semaphore { name: name.to_string(), source })
            };
        }

        Ok(Self { name: name.to_string(), handle })
    }

    /// Signal the semaphore once. Failure is logged by the caller and otherwise ignored —
    /// per §4.1, "semaphore signal failure is logged and ignored (best-effort wake)".
    pub fn post(&self) -> io::Result<()> {
        // SAFETY: self.handle is a live sem_t* for the lifetime of self.
        let rc = unsafe { libc::sem_post(self.handle) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Wait up to `timeout` for a post. Maps `ETIMEDOUT`/`EINTR` to the normal control-flow
    /// outcomes described in §4.1 and §5; any other errno is a fatal wait error.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<WaitOutcome, ShmError> {
        let deadline = now_plus(timeout);

        // SAFETY: self.handle is a live sem_t*; `deadline` is a fully-initialised timespec.
        let rc = unsafe { libc::sem_timedwait(self.handle, &deadline) };

        if rc == 0 {
            return Ok(WaitOutcome::NewUpdate);
        }

        match io::Error::last_os_error().raw_os_error() {
            Some(libc::ETIMEDOUT) => Ok(WaitOutcome::Timeout),
            Some(libc::EINTR) => Ok(WaitOutcome::Interrupted),
            _ => Err(ShmError::Semaphore {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            }),
        }
    }

    /// Unlink the semaphore's name from the system. Only the owning process should call
    /// this; attachers just let `Drop` close their local handle.
    pub fn unlink(&self) -> io::Result<()> {
        let cname = CString::new(self.name.as_str()).expect("semaphore name has no interior NUL");
        // SAFETY: cname is valid for the call; unlinking a name with open handles elsewhere
        // is well-defined (those handles keep working until closed).
        let rc = unsafe { libc::sem_unlink(cname.as_ptr()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: self.handle was returned by a successful sem_open and is closed exactly
        // once, here.
        unsafe {
            libc::sem_close(self.handle);
        }
    }
}

fn cname(name: &str) -> Result<CString, ShmError> {
    CString::new(name).map_err(|_| ShmError::Semaphore {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "region name contains interior NUL"),
    })
}

fn now_plus(timeout: Duration) -> libc::timespec {
    // SAFETY: CLOCK_REALTIME is always a valid clock id; `ts` is fully initialised before
    // use and clock_gettime only writes through the pointer we gave it.
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    ts.tv_sec += timeout.as_secs() as i64;
    ts.tv_nsec += i64::from(timeout.subsec_nanos());
    if ts.tv_nsec >= 1_000_000_000 {
        ts.tv_sec += 1;
        ts.tv_nsec -= 1_000_000_000;
    }
    ts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_round_trips() {
        let name = "/petcam_test_sem_round_trip";
        let owner = NamedSemaphore::create(name).unwrap();
        let attacher = NamedSemaphore::open(name).unwrap();

        owner.post().unwrap();
        assert_eq!(attacher.wait_timeout(Duration::from_millis(200)).unwrap(), WaitOutcome::NewUpdate);

        owner.unlink().unwrap();
    }

    #[test]
    fn wait_without_post_times_out() {
        let name = "/petcam_test_sem_timeout";
        let sem = NamedSemaphore::create(name).unwrap();
        assert_eq!(sem.wait_timeout(Duration::from_millis(50)).unwrap(), WaitOutcome::Timeout);
        sem.unlink().unwrap();
    }

    #[test]
    fn open_missing_semaphore_is_not_found() {
        let result = NamedSemaphore::open("/petcam_test_sem_does_not_exist");
        assert!(matches!(result, Err(ShmError::NotFound(_))));
    }
}
