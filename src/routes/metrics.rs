use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::app_state::AppState;

/// Prometheus scrape endpoint. Refreshes the queue depth gauge before
/// rendering so it is current even between batches.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let Some(handle) = state.metrics.as_ref() else {
        return (StatusCode::NOT_FOUND, String::new());
    };

    match state.backend.queue.len().await {
        Ok(depth) => metrics::gauge!("collectible_queue_depth").set(depth as f64),
        Err(e) => tracing::warn!(error = %e, "Could not read queue depth for metrics"),
    }

    (StatusCode::OK, handle.render())
}
