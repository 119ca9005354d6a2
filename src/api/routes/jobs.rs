//! Job routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::jobs::{CreateJobRequest, JobDto};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", post(cancel_job))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsParams {
    /// Maximum number of jobs to return (clamped to [1, 500], default 100).
    pub limit: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created", body = JobDto),
        (status = 400, description = "Invalid body", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobDto>)> {
    let created = state.jobs.create(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    params(ListJobsParams),
    responses((status = 200, description = "Most-recently-updated jobs", body = [JobDto]))
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<Json<Vec<JobDto>>> {
    let jobs = state.jobs.list(params.limit.unwrap_or(100)).await?;
    Ok(Json(jobs))
}

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job", body = JobDto),
        (status = 404, description = "Job not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDto>> {
    Ok(Json(state.jobs.get(&id).await?))
}

#[utoipa::path(
    post,
    path = "/jobs/{id}/cancel",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job after the cancellation attempt", body = JobDto),
        (status = 404, description = "Job not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDto>> {
    Ok(Json(state.jobs.cancel(&id).await?))
}
