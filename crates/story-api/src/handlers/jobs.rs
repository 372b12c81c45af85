//! Job submission and status polling.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use story_models::{JobStatus, SubmitResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /api/jobs/:capability`
///
/// The body is the capability's payload. The job is queued and its id is
/// returned before any work starts.
pub async fn submit_job(
    State(state): State<AppState>,
    Path(capability): Path<String>,
    body: Bytes,
) -> ApiResult<Json<SubmitResponse>> {
    let payload: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Malformed JSON body: {}", e)))?
    };

    let response = state.submissions.submit(&capability, payload).await?;
    Ok(Json(response))
}

/// `GET /api/job/:job_id` (also served at `/api/jobs/:job_id`)
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    Ok(Json(state.submissions.status(&job_id).await?))
}
