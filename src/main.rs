use std::process::ExitCode;

use tokio::net::TcpListener;

use pgprobe_service::config::{LogConfig, Settings};
use pgprobe_service::error::AppError;
use pgprobe_service::postgres::PostgresPool;
use pgprobe_service::server::{create_app, AppState};
use pgprobe_service::shutdown::{
    wait_for_signal, GracefulShutdown, Lifecycle, ShutdownConfig, ShutdownResult,
};
use pgprobe_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration before tracing so the log format can be honored
    let settings = Settings::new();

    let log_config = settings
        .as_ref()
        .map(|s| s.log.clone())
        .unwrap_or_else(|_| LogConfig::default());
    if let Err(e) = init_telemetry(&log_config) {
        eprintln!("{e}");
    }

    match run(settings).await {
        Ok(result) if result.is_clean() => ExitCode::SUCCESS,
        // The signal was honored even though requests were cut off
        Ok(result) if result.server_error.is_none() => {
            tracing::warn!("Shutdown finished without a complete drain");
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Result<Settings, AppError>) -> Result<ShutdownResult, AppError> {
    let lifecycle = Lifecycle::new();

    let settings = settings?;
    tracing::info!("Configuration loaded");

    let pool = PostgresPool::open(&settings.dsn).await?;

    let addr = settings.server_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            pool.close().await;
            return Err(e.into());
        }
    };

    let shutdown_config = ShutdownConfig::from(&settings.shutdown);
    let app = create_app(AppState::new(settings, pool.clone()));

    tracing::info!(addr = %addr, "Server listening");

    let shutdown = GracefulShutdown::new(lifecycle, pool, shutdown_config);
    let result = shutdown
        .run(listener, app, async {
            wait_for_signal().await;
        })
        .await;

    Ok(result)
}
