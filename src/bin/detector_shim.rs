//! `petcam-detector-shim` exercises the detection-boundary contract without
//! doing real inference.

use clap::{Parser, ValueEnum};
use petcam_core::config::Settings;
use petcam_core::detection::DetectionShim;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "petcam-detector-shim")]
struct Args {
    #[arg(long, default_value = "/etc/petcam/petcam.toml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    // Loaded only to keep the CLI surface consistent across binaries; the shim has no
    // tunables of its own today (no thresholds, no bitrate) but may grow some as the
    // detection contract matures.
    let _settings = Settings::load(&args.config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(Arc::clone(&shutdown));

    let run_result = tokio::task::spawn_blocking(move || {
        let mut shim = DetectionShim::start()?;
        while !shutdown.load(Ordering::Relaxed) {
            shim.tick();
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        shim.shutdown().map_err(petcam_core::PetcamError::from)
    })
    .await;

    match run_result {
        Ok(Ok(())) => {
            info!("detection shim shut down cleanly");
            Ok(())
        }
        Ok(Err(err)) => {
            error!(error = %err, "detection shim hit a fatal error");
            Err(err.into())
        }
        Err(err) => {
            error!(error = %err, "detection shim task panicked");
            Err(anyhow::anyhow!("detection shim task panicked: {err}"))
        }
    }
}

fn install_signal_handlers(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler must succeed");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutdown signal received");
        shutdown.store(true, Ordering::Relaxed);
    });
}
