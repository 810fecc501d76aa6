//! `petcam-switchd` decides which camera is active and supervises both capture processes.

use clap::{Parser, ValueEnum};
use petcam_core::config::Settings;
use petcam_core::switch::state_machine::ActiveCamera;
use petcam_core::switch::{ChildSpec, ControllerConfig, Supervisor, SwitchController};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "petcam-switchd")]
struct Args {
    #[arg(long, default_value = "/etc/petcam/petcam.toml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Path to the `petcam-capture` binary this process fork+execs per camera.
    #[arg(long, default_value = "/usr/bin/petcam-capture")]
    capture_binary: PathBuf,
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
    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(Arc::clone(&shutdown));

    let children = vec![
        ChildSpec::new(
            "petcam-capture-day",
            args.capture_binary.clone(),
            vec!["--camera".into(), "day".into(), "--config".into(), args.config.display().to_string()],
        ),
        ChildSpec::new(
            "petcam-capture-night",
            args.capture_binary.clone(),
            vec!["--camera".into(), "night".into(), "--config".into(), args.config.display().to_string()],
        ),
    ];

    let supervisor = Supervisor::new(children);
    let supervisor_shutdown = Arc::clone(&shutdown);
    let supervisor_task = tokio::spawn(async move { supervisor.run(supervisor_shutdown).await });

    let controller_config = ControllerConfig { switch: settings.switch.clone(), initial: ActiveCamera::Day };
    let controller_shutdown = Arc::clone(&shutdown);

    let controller_result = tokio::task::spawn_blocking(move || {
        let mut controller = SwitchController::start(controller_config)?;
        controller.run(&controller_shutdown);
        controller.shutdown().map_err(petcam_core::PetcamError::from)
    })
    .await;

    supervisor_task.await.ok();

    match controller_result {
        Ok(Ok(())) => {
            info!("switch controller shut down cleanly");
            Ok(())
        }
        Ok(Err(err)) => {
            error!(error = %err, "switch controller hit a fatal error");
            Err(err.into())
        }
        Err(err) => {
            error!(error = %err, "switch controller task panicked");
            Err(anyhow::anyhow!("switch controller task panicked: {err}"))
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
