use axum::extract::multipart::Field;
use tracing::info;

use super::dto::UploadResponse;
use crate::common::response::ApiError;
use crate::common::upload::stream_to_storage;
use crate::engine::{EngineError, FileFormat};
use crate::infrastructure::storage::upload_key;
use crate::state::AppState;

pub struct UploadService;

impl UploadService {
    /// Streams one multipart file field into storage. The format comes from
    /// the file name, falling back to the part's declared content type.
    pub async fn store_field(state: &AppState, field: Field<'_>) -> Result<UploadResponse, ApiError> {
        let file_name = field.file_name().unwrap_or_default().to_string();
        let source_format = detect_format(&file_name, field.content_type()).ok_or_else(|| {
            EngineError::Validation(format!(
                "Unsupported file type {:?}, expected one of pdf, docx, jpg, png",
                file_name
            ))
        })?;

        let key = upload_key(source_format);
        let size = stream_to_storage(
            &state.storage,
            field,
            &key,
            source_format.mime_type(),
            state.config.max_upload_bytes,
        )
        .await?;

        info!(source_ref = %key, size, "Stored upload {}", file_name);

        Ok(UploadResponse {
            source_ref: key,
            source_format,
            file_name,
            size,
        })
    }
}

fn detect_format(file_name: &str, content_type: Option<&str>) -> Option<FileFormat> {
    FileFormat::from_filename(file_name)
        .or_else(|| {
            mime_guess::from_path(file_name)
                .iter()
                .find_map(|guess| FileFormat::from_mime(&guess))
        })
        .or_else(|| {
            content_type
                .and_then(|raw| raw.parse::<mime::Mime>().ok())
                .and_then(|declared| FileFormat::from_mime(&declared))
        })
}
