use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{EnqueueResponse, StatusQuery};
use crate::models::job::{JobId, JobSnapshot};
use crate::models::params::GenerationParams;
use crate::routes::auth::AuthUser;
use crate::routes::error::{ApiError, ApiResult};

/// POST /api/v1/jobs — queue a collectible for generation.
pub async fn enqueue_job(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<GenerationParams>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    // Shape errors (unknown variant, missing field) are validation failures too.
    let Json(params) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let id = state.producer.enqueue(params, user.owner).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { id })))
}

/// GET /api/v1/jobs/status?id=... — poll a job owned by the caller.
pub async fn get_job_status(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<JobSnapshot>> {
    let id: JobId = query
        .id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("'{}' is not a job id", query.id)))?;

    let snapshot = state.status.get_status(id, &user.owner).await?;
    Ok(Json(snapshot))
}
