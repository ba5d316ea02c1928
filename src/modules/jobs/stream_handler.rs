use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::error;

use super::service::JobService;
use crate::common::response::ApiError;
use crate::engine::{JobId, ProgressEvent};
use crate::state::AppState;

const KEEP_ALIVE_SECS: u64 = 15;

/// Job progress events
/// Server-Sent Events: one `progress` event per committed change, starting
/// with the current snapshot. The stream ends after the terminal event.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/events",
    params(
        ("id" = JobId, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = ProgressEvent),
        (status = 404, description = "Job Not Found")
    ),
    tag = "Jobs"
)]
pub async fn job_events(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    let stream = match JobService::subscribe(&state, id).await {
        Ok(stream) => stream,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let events = stream.map(|event: ProgressEvent| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));

        Ok::<_, Infallible>(
            Event::default()
                .event("progress")
                .id(event.revision.to_string())
                .data(data),
        )
    });

    Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(KEEP_ALIVE_SECS))
                .text("ping"),
        )
        .into_response()
}

/// Download job output
/// Streams the output bytes of a completed job from storage
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/result/content",
    params(
        ("id" = JobId, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Output file", content_type = "application/octet-stream"),
        (status = 404, description = "Job or output Not Found"),
        (status = 409, description = "Job not completed"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Jobs"
)]
pub async fn download_result(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    let content = match JobService::open_result(&state, id).await {
        Ok(content) => content,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let body = Body::from_stream(ReaderStream::new(content.reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content.content_type)
        .header(header::CONTENT_LENGTH, content.length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", content.file_name),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(body)
        .unwrap_or_else(|e| {
            error!(job_id = %id, "Failed to build download response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
