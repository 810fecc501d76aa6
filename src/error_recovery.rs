//! Transient-error counting and escalation.
//!
//! Per §7: a thread that sees `N` consecutive transients of the *same kind* escalates to
//! the process's fatal path. Data skew (sequence gaps) and consumer-driven errors (missed
//! DMA release) are not counted here — they are metrics, not retryable failures.

use crate::error::PetcamError;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{error, warn};

/// Counts consecutive transient errors of one kind and decides when to escalate.
pub struct TransientCounter {
    kind: &'static str,
    limit: u32,
    consecutive: AtomicU32,
}

impl TransientCounter {
    #[must_use]
    pub fn new(kind: &'static str, limit: u32) -> Self {
        Self {
            kind,
            limit,
            consecutive: AtomicU32::new(0),
        }
    }

    /// Record one transient occurrence. Returns `Err` once the consecutive count reaches
    /// `limit`, at which point the caller should treat this as fatal.
    pub fn record(&self) -> Result<(), PetcamError> {
        let count = self.consecutive.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.limit {
            error!(kind = self.kind, count, "transient error limit reached");
            return Err(PetcamError::TransientEscalation { kind: self.kind, count });
        }
        warn!(kind = self.kind, count, "transient error");
        Ok(())
    }

    /// Call after any successful operation to reset the streak.
    pub fn reset(&self) {
        self.consecutive.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_after_limit_consecutive_errors() {
        let counter = TransientCounter::new("get_frame_timeout", 3);
        assert!(counter.record().is_ok());
        assert!(counter.record().is_ok());
        assert!(matches!(
            counter.record(),
            Err(PetcamError::TransientEscalation { count: 3, .. })
        ));
    }

    #[test]
    fn success_resets_streak() {
        let counter = TransientCounter::new("get_frame_timeout", 2);
        assert!(counter.record().is_ok());
        counter.reset();
        assert!(counter.record().is_ok());
    }
}
