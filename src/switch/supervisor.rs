//! Process supervision: the switch controller owns the two
//! capture-pipeline child processes, fork+exec'ing them at start-up and restarting either one
//! that exits, with exponential backoff capped at a few seconds. A repeatedly failing child
//! is logged and left stopped; the other camera keeps running regardless.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Backoff ceiling for child restarts, capped at a few seconds.
const MAX_BACKOFF: Duration = Duration::from_secs(8);
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
/// A child that runs at least this long before exiting is considered to have made progress,
/// and its backoff resets rather than continuing to climb.
const BACKOFF_RESET_THRESHOLD: Duration = Duration::from_secs(30);

/// One supervised child process: a binary path, its arguments, and a label for logging.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub label: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ChildSpec {
    #[must_use]
    pub fn new(label: &'static str, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { label, program: program.into(), args }
    }
}

/// Supervises a fixed set of child processes, restarting each independently.
pub struct Supervisor {
    children: Vec<ChildSpec>,
}

impl Supervisor {
    #[must_use]
    pub fn new(children: Vec<ChildSpec>) -> Self {
        Self { children }
    }

    /// Spawn a restart-loop task per child; returns once every task has observed `shutdown`.
    pub async fn run(self, shutdown: Arc<AtomicBool>) {
        let tasks: Vec<_> = self
            .children
            .into_iter()
            .map(|spec| {
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move { supervise_one(spec, shutdown).await })
            })
            .collect();

        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "supervised child task panicked");
            }
        }
    }
}

async fn supervise_one(spec: ChildSpec, shutdown: Arc<AtomicBool>) {
    let mut backoff = INITIAL_BACKOFF;

    while !shutdown.load(Ordering::Relaxed) {
        info!(child = spec.label, program = %spec.program.display(), "starting child process");
        let started = std::time::Instant::now();

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(child = spec.label, error = %err, "child process spawn failed, backing off");
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) if status.success() => {
                        info!(child = spec.label, "child exited cleanly");
                    }
                    Ok(status) => {
                        warn!(child = spec.label, code = ?status.code(), "child exited with failure");
                    }
                    Err(err) => {
                        warn!(child = spec.label, error = %err, "failed to wait on child");
                    }
                }
            }
            _ = wait_for_shutdown(&shutdown) => {
                info!(child = spec.label, "shutdown requested, terminating child");
                let _ = child.start_kill();
                let _ = child.wait().await;
                return;
            }
        }

        if started.elapsed() >= BACKOFF_RESET_THRESHOLD {
            backoff = INITIAL_BACKOFF;
        } else {
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        sleep(backoff).await;
    }
}

async fn wait_for_shutdown(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_spec_stores_program_and_args() {
        let spec = ChildSpec::new("petcam-capture-day", "/usr/bin/true", vec!["--camera".into(), "0".into()]);
        assert_eq!(spec.label, "petcam-capture-day");
        assert_eq!(spec.args, vec!["--camera", "0"]);
    }

    #[tokio::test]
    async fn supervisor_restarts_a_fast_exiting_child_until_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let spec = ChildSpec::new("fast-exit", "/bin/true", vec![]);
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move { supervise_one(spec, shutdown_clone).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(2), handle).await.expect("supervisor task should exit promptly").unwrap();
    }
}
