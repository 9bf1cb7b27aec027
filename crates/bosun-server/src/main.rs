//! # Bosun Server
//!
//! Entry point of the fleet worker process. Loads configuration, installs
//! tracing, then runs the job queue, the cron schedules and the
//! auto-recovery engine until a shutdown signal arrives.

use bosun_config::ConfigLoader;
use bosun_core::BosunResult;
use bosun_server::app::AppBuilder;
use bosun_server::startup::{print_banner, print_startup_info};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Tracing may not be installed yet.
        eprintln!("Application error: {}", e);
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> BosunResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    bosun_core::telemetry::init_tracing(&config.telemetry)?;
    bosun_jobs::register_metrics();
    bosun_recovery::register_metrics();

    print_banner();
    info!("Starting Bosun worker...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    let app = AppBuilder::new().with_config(config).build()?;
    let _event_logger = app.spawn_event_logger();
    app.start()?;

    print_startup_info(app.config().jobs.max_concurrent_jobs, &app.registry().list());

    shutdown_signal().await;

    app.shutdown();
    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
