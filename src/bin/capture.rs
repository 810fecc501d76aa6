//! `petcam-capture` runs one physical camera's capture pipeline.

use clap::{Parser, ValueEnum};
use petcam_core::capture::{CapturePipeline, PipelineConfig};
use petcam_core::config::{CameraConfig, Settings};
use petcam_core::names::{CAMERA_DAY, CAMERA_NIGHT};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CameraSelect {
    Day,
    Night,
}

#[derive(Parser, Debug)]
#[command(name = "petcam-capture")]
struct Args {
    /// Which physical camera this process drives.
    #[arg(long, value_enum)]
    camera: CameraSelect,

    /// TOML configuration file; falls back entirely to defaults if absent.
    #[arg(long, default_value = "/etc/petcam/petcam.toml")]
    config: PathBuf,

    /// Emit JSON log lines instead of the default human-readable format.
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

    let settings = Settings::load(&args.config)?;
    let camera_config: &CameraConfig = match args.camera {
        CameraSelect::Day => &settings.day,
        CameraSelect::Night => &settings.night,
    };

    let config = PipelineConfig {
        camera_id: camera_config.camera_id,
        host_route: camera_config.host_route,
        width: camera_config.width,
        height: camera_config.height,
        fps: camera_config.fps,
        bitrate_kbps: camera_config.bitrate_kbps,
        ring_capacity: settings.ring_capacity,
        mjpeg_enabled: settings.mjpeg_enabled,
        semaphore_timeout: settings.semaphore_timeout,
        consecutive_transient_limit: settings.consecutive_transient_limit,
    };

    info!(camera_id = config.camera_id, "starting capture pipeline");

    let mut pipeline = match CapturePipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(error = %err, "capture pipeline start-up failed");
            return Err(err.into());
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(Arc::clone(&shutdown));

    let shutdown_for_run = Arc::clone(&shutdown);
    let run_result = tokio::task::spawn_blocking(move || {
        let outcome = pipeline.run(&shutdown_for_run);
        (pipeline, outcome)
    })
    .await;

    match run_result {
        Ok((pipeline, Ok(()))) => {
            pipeline.shutdown();
            info!(
                camera_id = match args.camera { CameraSelect::Day => CAMERA_DAY, CameraSelect::Night => CAMERA_NIGHT },
                "capture pipeline shut down cleanly"
            );
            Ok(())
        }
        Ok((pipeline, Err(err))) => {
            error!(error = %err, "capture pipeline hit a fatal error");
            pipeline.shutdown();
            Err(err.into())
        }
        Err(err) => {
            error!(error = %err, "capture pipeline task panicked");
            Err(anyhow::anyhow!("capture pipeline task panicked: {err}"))
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
