use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use super::dto::{
    CreateJobRequest, EngineStatusResponse, JobCreatedResponse, JobResponse, JobResultResponse,
    ListJobsQuery,
};
use super::service::JobService;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::engine::{JobId, OperationKind, TranscoderKey};
use crate::state::AppState;

/// Submit a job
/// Queues a conversion or compression of a previously uploaded file
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 202, description = "Job Accepted", body = ApiResponse<JobCreatedResponse>),
        (status = 400, description = "Bad Request"),
        (status = 422, description = "Format pair not supported"),
        (status = 429, description = "Queue full, retry later"),
        (status = 503, description = "Shutting down")
    ),
    tag = "Jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> impl IntoResponse {
    if let Err(e) = req.validate() {
        return ApiError(e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    match JobService::create(&state, req).await {
        Ok(job) => ApiSuccess(
            ApiResponse::success(JobCreatedResponse::from(&job), "Job queued"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Convert a file
/// Uploads `file` and queues its conversion to `targetFormat`
#[utoipa::path(
    post,
    path = "/api/v1/convert",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Job Accepted", body = ApiResponse<JobCreatedResponse>),
        (status = 400, description = "Bad Request"),
        (status = 422, description = "Conversion not supported"),
        (status = 429, description = "Queue full, retry later")
    ),
    tag = "Jobs"
)]
pub async fn convert(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    accept(state, multipart, OperationKind::Convert).await
}

/// Compress a file
/// Uploads `file` and queues its compression at `compressionLevel` (0-100)
#[utoipa::path(
    post,
    path = "/api/v1/compress",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Job Accepted", body = ApiResponse<JobCreatedResponse>),
        (status = 400, description = "Bad Request"),
        (status = 422, description = "Compression not supported"),
        (status = 429, description = "Queue full, retry later")
    ),
    tag = "Jobs"
)]
pub async fn compress(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    accept(state, multipart, OperationKind::Compress).await
}

async fn accept(state: AppState, multipart: Multipart, kind: OperationKind) -> axum::response::Response {
    match JobService::submit_multipart(&state, multipart, kind).await {
        Ok(job) => ApiSuccess(
            ApiResponse::success(JobCreatedResponse::from(&job), "Job queued"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// List jobs
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "List Jobs", body = ApiResponse<Vec<JobResponse>>)
    ),
    tag = "Jobs"
)]
pub async fn list_jobs(State(state): State<AppState>, Query(query): Query<ListJobsQuery>) -> impl IntoResponse {
    let jobs: Vec<JobResponse> = JobService::list(&state, query.state)
        .await
        .into_iter()
        .map(JobResponse::from)
        .collect();

    ApiSuccess(ApiResponse::success(jobs, "Jobs retrieved successfully"), StatusCode::OK)
}

/// Get a job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(
        ("id" = JobId, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Get Job", body = ApiResponse<JobResponse>),
        (status = 404, description = "Job Not Found")
    ),
    tag = "Jobs"
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<JobId>) -> impl IntoResponse {
    match JobService::get(&state, id).await {
        Ok(job) => ApiSuccess(
            ApiResponse::success(JobResponse::from(job), "Job retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Cancel a job
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    params(
        ("id" = JobId, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job Cancelled", body = ApiResponse<JobResponse>),
        (status = 404, description = "Job Not Found"),
        (status = 409, description = "Job already finished")
    ),
    tag = "Jobs"
)]
pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<JobId>) -> impl IntoResponse {
    match JobService::cancel(&state, id).await {
        Ok(job) => ApiSuccess(
            ApiResponse::success(JobResponse::from(job), "Job cancelled"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Get job result
/// Result reference and size metadata of a completed job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/result",
    params(
        ("id" = JobId, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job Result", body = ApiResponse<JobResultResponse>),
        (status = 404, description = "Job Not Found"),
        (status = 409, description = "Job not completed")
    ),
    tag = "Jobs"
)]
pub async fn get_result(State(state): State<AppState>, Path(id): Path<JobId>) -> impl IntoResponse {
    match JobService::result(&state, id).await {
        Ok(result) => ApiSuccess(
            ApiResponse::success(result, "Result retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Supported operations
/// Every registered `(source, target, operation)` combination
#[utoipa::path(
    get,
    path = "/api/v1/formats",
    responses(
        (status = 200, description = "Supported operations", body = ApiResponse<Vec<TranscoderKey>>)
    ),
    tag = "System"
)]
pub async fn list_formats(State(state): State<AppState>) -> impl IntoResponse {
    let mut capabilities = state.coordinator.capabilities();
    capabilities.sort_by_key(|key| {
        (
            key.operation.to_string(),
            key.source_format.extension(),
            key.target_format.extension(),
        )
    });

    ApiSuccess(ApiResponse::success(capabilities, "Supported operations"), StatusCode::OK)
}

/// Engine status
/// Queue depth, capacity and jobs currently being processed
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Engine status", body = ApiResponse<EngineStatusResponse>)
    ),
    tag = "System"
)]
pub async fn engine_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = EngineStatusResponse {
        queue_depth: state.coordinator.queue_depth(),
        queue_capacity: state.coordinator.queue_capacity(),
        in_flight: state.coordinator.in_flight(),
    };

    ApiSuccess(ApiResponse::success(status, "Engine status"), StatusCode::OK)
}
