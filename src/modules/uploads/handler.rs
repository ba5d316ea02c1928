use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::dto::UploadResponse;
use super::service::UploadService;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;

/// Upload a source file
/// Streams the `file` field to storage and returns its reference
#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = ApiResponse<UploadResponse>),
        (status = 400, description = "Missing, empty, oversized or unsupported file"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Uploads"
)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> impl IntoResponse {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return ApiError(format!("Invalid multipart body: {}", e), StatusCode::BAD_REQUEST).into_response(),
        };

        if field.name() == Some("file") {
            return match UploadService::store_field(&state, field).await {
                Ok(upload) => ApiSuccess(
                    ApiResponse::success(upload, "File uploaded successfully"),
                    StatusCode::CREATED,
                )
                .into_response(),
                Err(e) => e.into_response(),
            };
        }
    }

    ApiError("No file field found in multipart request".to_string(), StatusCode::BAD_REQUEST).into_response()
}
