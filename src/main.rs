use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use collectible_queue::{app_state::AppState, config::AppConfig, routes};

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

    tracing::info!("Initializing collectible-queue server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    metrics::describe_counter!(
        "collectible_jobs_enqueued_total",
        "Generation jobs accepted by the producer"
    );
    metrics::describe_counter!(
        "collectible_jobs_completed_total",
        "Generation jobs completed"
    );
    metrics::describe_counter!(
        "collectible_jobs_failed_total",
        "Generation jobs that reached the failed state"
    );
    metrics::describe_counter!(
        "collectible_jobs_retried_total",
        "Transient failures re-queued for another attempt"
    );
    metrics::describe_counter!(
        "collectible_jobs_reclaimed_total",
        "Jobs re-queued after their worker's lease expired"
    );
    metrics::describe_histogram!(
        "collectible_job_processing_seconds",
        "Time spent running one generation attempt"
    );
    metrics::describe_gauge!(
        "collectible_queue_depth",
        "Job ids currently waiting in the queue index"
    );

    let state = AppState::connect(&config)
        .await
        .expect("Failed to initialize application state")
        .with_metrics(prometheus_handle);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(4 * 1024 * 1024)); // style images are capped at 2 MiB

    tracing::info!("Starting collectible-queue on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
