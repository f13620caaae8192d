use probe_service::api::{create_router, AppState};
use probe_service::config::Settings;
use probe_service::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use probe_service::probes::{CacheProbe, DatabaseProbe};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging
    init_logging(&LogConfig::from_settings(&settings.application))?;
    info!("Configuration loaded");

    let metrics_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(exception = %e, "Metrics disabled");
            None
        }
    };

    // Dependency clients. Failures leave the probe unavailable instead of aborting startup.
    let database = Arc::new(DatabaseProbe::connect(&settings.database));
    let cache = Arc::new(CacheProbe::connect(&settings.redis, settings.health.probe_timeout()).await);

    let health_checker = HealthChecker::new(settings.health.probe_timeout())
        .with_error_details(settings.health.expose_error_details)
        .with_probe("database", database.clone())?
        .with_probe("redis", cache.clone())?;
    info!(dependencies = ?health_checker.dependency_names(), "Health checks registered");

    let mut state = AppState::new(settings.application.name.clone(), Arc::new(health_checker));
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }
    let app = create_router(state, &settings)?;

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        %addr,
        environment = %settings.application.environment,
        "{} listening",
        settings.application.name
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache.close().await;
    database.close().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(exception = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(exception = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
