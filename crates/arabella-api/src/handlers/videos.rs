//! Video generation handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use arabella_models::{JobId, JobStatus, VideoJob};

use crate::auth::GatewayUser;
use crate::error::{ApiError, ApiResult};
use crate::services::{GenerateVideoRequest, GenerationResponse, JobPage, JobStatusView};
use crate::state::AppState;

/// Query parameters for the job listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListVideosQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Start a generation job.
pub async fn generate_video(
    State(state): State<AppState>,
    user: GatewayUser,
    body: Result<Json<GenerateVideoRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GenerationResponse>)> {
    let Json(request) =
        body.map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e.body_text())))?;
    let response = state.generation.generate(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_video(
    State(state): State<AppState>,
    user: GatewayUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<VideoJob>> {
    let job = state
        .generation
        .job(&user.user_id, &JobId::from_string(job_id))
        .await?;
    Ok(Json(job))
}

pub async fn get_video_status(
    State(state): State<AppState>,
    user: GatewayUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    let view = state
        .generation
        .queue_status(&user.user_id, &JobId::from_string(job_id))
        .await?;
    Ok(Json(view))
}

/// Cancel a pending or processing job.
pub async fn cancel_video(
    State(state): State<AppState>,
    user: GatewayUser,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .generation
        .cancel(&user.user_id, &JobId::from_string(job_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the caller's jobs, newest first.
pub async fn list_videos(
    State(state): State<AppState>,
    user: GatewayUser,
    query: Result<Query<ListVideosQuery>, QueryRejection>,
) -> ApiResult<Json<JobPage>> {
    let Query(query) = query
        .map_err(|e| ApiError::bad_request(format!("Invalid query parameters: {}", e.body_text())))?;

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<JobStatus>()
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        ),
        None => None,
    };

    let page = state
        .generation
        .jobs_for_user(&user.user_id, status, query.page, query.page_size)
        .await?;
    Ok(Json(page))
}
