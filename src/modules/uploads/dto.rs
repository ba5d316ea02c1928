use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::FileFormat;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Storage key to pass as `source_ref` when creating a job.
    pub source_ref: String,
    pub source_format: FileFormat,
    pub file_name: String,
    pub size: u64,
}
