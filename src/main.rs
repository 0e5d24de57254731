use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stem_separator_service::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{retention, separator::ProcessSeparator, storage::LocalStorage},
    telemetry,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing stem-separator-service");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    telemetry::describe_metrics();

    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        output_root = %config.output_root.display(),
        "Preparing storage directories"
    );
    let storage = LocalStorage::init(&config.upload_dir, &config.output_root)
        .await
        .expect("Failed to prepare storage directories");

    let separator = ProcessSeparator::from_config(&config);
    tracing::info!(
        program = %separator.program(),
        timeout_secs = config.invocation_timeout_secs,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Using process separator"
    );

    let state = AppState::new(
        storage,
        Arc::new(separator),
        config.runner_settings(),
        config.max_upload_bytes(),
    );

    let _sweeper = retention::spawn_sweeper(
        Arc::clone(&state.jobs),
        Arc::clone(&state.storage),
        config.job_retention(),
        config.retention_sweep_interval(),
    );

    let app = routes::api_router(state)
        .route(
            "/metrics",
            get(routes::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
