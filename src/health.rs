//! Stall detection: "the system never stalls silently."
//!
//! Every region-owning loop reports progress (or lack of it) through a [`StallMonitor`].
//! Each window of `WINDOW_FRAMES` iterations either logs nothing (progress happened) or
//! emits a throttled warning naming the region that hasn't advanced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::warn;

/// Size of the progress window referenced by the error-handling design: every 30-frame
/// window must make progress or log a visible warning.
pub const WINDOW_FRAMES: u64 = 30;

/// Tracks whether a named loop is making progress, and throttles the "stalled" warning to
/// at most once per window so a genuinely stuck region doesn't spam the log.
pub struct StallMonitor {
    label: &'static str,
    iterations: AtomicU64,
    last_progress: AtomicU64,
    started: Instant,
}

impl StallMonitor {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            iterations: AtomicU64::new(0),
            last_progress: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Call once per loop iteration. `progressed` is whatever the loop considers forward
    /// motion for its region — a version bump, a frame publish, a successful poll.
    pub fn tick(&self, progressed: bool) {
        let n = self.iterations.fetch_add(1, Ordering::Relaxed) + 1;
        if progressed {
            self.last_progress.store(n, Ordering::Relaxed);
        }

        if n % WINDOW_FRAMES == 0 {
            let last = self.last_progress.load(Ordering::Relaxed);
            if n.saturating_sub(last) >= WINDOW_FRAMES {
                warn!(
                    region = self.label,
                    iterations = n,
                    since_progress = n - last,
                    uptime_s = self.started.elapsed().as_secs(),
                    "no progress in the last {WINDOW_FRAMES}-iteration window"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_resets_stall_window() {
        let monitor = StallMonitor::new("test-region");
        for _ in 0..WINDOW_FRAMES {
            monitor.tick(true);
        }
        assert_eq!(monitor.last_progress.load(Ordering::Relaxed), WINDOW_FRAMES);
    }

    #[test]
    fn no_progress_leaves_last_progress_behind() {
        let monitor = StallMonitor::new("test-region");
        monitor.tick(true);
        for _ in 0..WINDOW_FRAMES - 1 {
            monitor.tick(false);
        }
        assert_eq!(monitor.last_progress.load(Ordering::Relaxed), 1);
        assert_eq!(monitor.iterations.load(Ordering::Relaxed), WINDOW_FRAMES);
    }
}
