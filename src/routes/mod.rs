use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod auth;
pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod worker;

/// All HTTP routes, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/api/v1/jobs", post(jobs::enqueue_job))
        .route("/api/v1/jobs/status", get(jobs::get_job_status))
        .route("/api/v1/worker/process-batch", post(worker::process_batch))
        .with_state(state)
}
