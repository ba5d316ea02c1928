use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod service;
pub mod stream_handler;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(handler::create_job).get(handler::list_jobs))
        .route("/jobs/{id}", get(handler::get_job))
        .route("/jobs/{id}/cancel", post(handler::cancel_job))
        .route("/jobs/{id}/events", get(stream_handler::job_events))
        .route("/jobs/{id}/result", get(handler::get_result))
        .route("/jobs/{id}/result/content", get(stream_handler::download_result))
        .route("/formats", get(handler::list_formats))
        .route("/status", get(handler::engine_status))
}

/// Upload-and-submit shortcuts. They carry file bodies, so the caller puts
/// them behind the upload size limit.
pub fn multipart_router() -> Router<AppState> {
    Router::new()
        .route("/convert", post(handler::convert))
        .route("/compress", post(handler::compress))
}
