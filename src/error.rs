//! Error taxonomy for the capture-and-distribution plane.
//!
//! Three tiers, matching how callers are expected to react: [`ShmError`] and [`HalError`]
//! are the leaf error types FFI/syscall boundaries produce; [`PetcamError`] is what
//! propagates out of a component's public API and what `main` ultimately reports.

use thiserror::Error;

/// Errors from the shared-memory layer (region create/open, ring publish/read, semaphores).
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("region '{0}' not found")]
    NotFound(String),

    #[error("region '{name}' already in use by an incompatible live writer (expected shape {expected}, found {found})")]
    AlreadyInUse {
        name: String,
        expected: &'static str,
        found: String,
    },

    #[error("shm_open/mmap failed for region '{name}': {source}")]
    Mapping {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("semaphore operation failed for region '{name}': {source}")]
    Semaphore {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("payload of {len} bytes exceeds slot capacity of {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("region '{0}' header magic mismatch, refusing to attach")]
    BadMagic(String),

    #[error("record in region '{0}' did not stabilise after {1} read retries")]
    TornRead(String, u32),
}

/// Errors surfaced across the HAL FFI boundary, wrapping raw vendor status codes.
#[derive(Debug, Error)]
pub enum HalError {
    #[error("invalid parameters passed to HAL call")]
    InvalidParams,

    #[error("invalid or stale buffer file descriptor")]
    InvalidFd,

    #[error("HAL call timed out")]
    Timeout,

    #[error("requested device or channel not found")]
    NotFound,

    #[error("HAL resource busy, try again")]
    Busy,

    #[error("unrecoverable HAL failure (vendor code {0})")]
    Fatal(i32),
}

impl HalError {
    /// Map a raw vendor status code to a typed error. `0` must be checked as success by the
    /// caller before reaching here.
    #[must_use]
    pub fn from_status(code: i32) -> Self {
        match code {
            -1 => HalError::Timeout,
            -2 => HalError::NotFound,
            -3 => HalError::InvalidParams,
            -4 => HalError::Busy,
            _ => HalError::Fatal(code),
        }
    }
}

/// Top-level error type for capture pipeline, switch controller, and detection shim.
#[derive(Debug, Error)]
pub enum PetcamError {
    #[error(transparent)]
    Shm(#[from] ShmError),

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("child process spawn failed: {0}")]
    Spawn(std::io::Error),

    #[error("{count} consecutive transient errors of kind '{kind}', escalating to fatal")]
    TransientEscalation { kind: &'static str, count: u32 },

    #[error("operation not supported in this build: {0}")]
    NotSupported(&'static str),
}
