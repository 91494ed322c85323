use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::BatchSummary;
use crate::routes::auth::WorkerTrigger;

/// POST /api/v1/worker/process-batch — run one batch.
///
/// Always 200 once authorised: job failures live on the jobs, and an error
/// here would only make the trigger retry the whole batch.
pub async fn process_batch(
    State(state): State<AppState>,
    _trigger: WorkerTrigger,
) -> Json<BatchSummary> {
    Json(state.worker.process_batch().await)
}
