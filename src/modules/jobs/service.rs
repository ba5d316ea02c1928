use axum::extract::Multipart;
use tracing::{info, warn};

use super::dto::{CreateJobRequest, JobResultResponse, operation};
use crate::common::response::ApiError;
use crate::engine::{
    EngineError, FileFormat, Job, JobId, JobSpec, JobState, OperationKind, ProgressStream,
};
use crate::infrastructure::storage::{ByteReader, StorageError};
use crate::modules::uploads::dto::UploadResponse;
use crate::modules::uploads::service::UploadService;
use crate::state::AppState;

/// Output bytes of a completed job, ready to be streamed to the client.
pub struct ResultContent {
    pub reader: ByteReader,
    pub length: u64,
    pub content_type: String,
    pub file_name: String,
}

pub struct JobService;

impl JobService {
    pub async fn create(state: &AppState, req: CreateJobRequest) -> Result<Job, EngineError> {
        Self::ensure_source_exists(state, &req.source_ref).await?;
        state.coordinator.submit(req.into_spec()).await
    }

    pub async fn get(state: &AppState, id: JobId) -> Result<Job, EngineError> {
        state.coordinator.status(id).await
    }

    /// Jobs in `filter`, or in every state when no filter is given. Oldest first.
    pub async fn list(state: &AppState, filter: Option<JobState>) -> Vec<Job> {
        let states: Vec<JobState> = match filter {
            Some(state) => vec![state],
            None => JobState::ALL.to_vec(),
        };

        let mut jobs = Vec::new();
        for s in states {
            jobs.extend(state.coordinator.list(s).await);
        }
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub async fn cancel(state: &AppState, id: JobId) -> Result<Job, EngineError> {
        state.coordinator.cancel(id).await
    }

    pub async fn subscribe(state: &AppState, id: JobId) -> Result<ProgressStream, EngineError> {
        state.coordinator.subscribe(id).await
    }

    pub async fn result(state: &AppState, id: JobId) -> Result<JobResultResponse, EngineError> {
        let result = state.coordinator.result(id).await?;
        Ok(JobResultResponse {
            job_id: id,
            result,
            download_url: format!("/api/v1/jobs/{}/result/content", id),
        })
    }

    pub async fn open_result(state: &AppState, id: JobId) -> Result<ResultContent, EngineError> {
        let job = state.coordinator.status(id).await?;
        let result = state.coordinator.result(id).await?;

        let (reader, length) = state.storage.open_stream(&result.result_ref).await?;
        let file_name = format!("{}.{}", result_file_stem(&job), job.target_format.extension());

        Ok(ResultContent {
            reader,
            length,
            content_type: result.content_type,
            file_name,
        })
    }

    /// Upload and submit in one multipart request.
    ///
    /// Accepts a `file` field plus `targetFormat` for conversions or
    /// `compressionLevel` (0-100, the requested output size percentage) for
    /// compressions. The stored upload is removed again when the job is
    /// not accepted.
    pub async fn submit_multipart(
        state: &AppState,
        mut multipart: Multipart,
        kind: OperationKind,
    ) -> Result<Job, ApiError> {
        let mut upload: Option<UploadResponse> = None;
        let mut target_format: Option<String> = None;
        let mut compression_level: Option<String> = None;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    Self::discard_upload(state, upload.as_ref()).await;
                    return Err(EngineError::Validation(format!("Invalid multipart body: {}", e)).into());
                }
            };

            match field.name() {
                Some("file") if upload.is_none() => {
                    upload = Some(UploadService::store_field(state, field).await?);
                }
                Some("targetFormat") | Some("target_format") => {
                    target_format = field.text().await.ok();
                }
                Some("compressionLevel") | Some("target_ratio") => {
                    compression_level = field.text().await.ok();
                }
                _ => {}
            }
        }

        let Some(upload) = upload else {
            return Err(EngineError::Validation("No file field found in multipart request".to_string()).into());
        };

        let spec = match shortcut_spec(&upload, kind, target_format.as_deref(), compression_level.as_deref()) {
            Ok(spec) => spec,
            Err(e) => {
                Self::discard_upload(state, Some(&upload)).await;
                return Err(e.into());
            }
        };

        match state.coordinator.submit(spec).await {
            Ok(job) => {
                info!(job_id = %job.id, file_name = %upload.file_name, "Accepted {} request", kind);
                Ok(job)
            }
            Err(e) => {
                Self::discard_upload(state, Some(&upload)).await;
                Err(e.into())
            }
        }
    }

    async fn ensure_source_exists(state: &AppState, source_ref: &str) -> Result<(), EngineError> {
        match state.storage.exists(source_ref).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::Validation(format!("Unknown source_ref {:?}", source_ref))),
            Err(StorageError::InvalidKey(key)) => {
                Err(EngineError::Validation(format!("Invalid source_ref {:?}", key)))
            }
            Err(e) => Err(EngineError::Storage(e)),
        }
    }

    async fn discard_upload(state: &AppState, upload: Option<&UploadResponse>) {
        if let Some(upload) = upload {
            if let Err(e) = state.storage.delete(&upload.source_ref).await {
                warn!(source_ref = %upload.source_ref, "Failed to remove rejected upload: {}", e);
            }
        }
    }
}

fn shortcut_spec(
    upload: &UploadResponse,
    kind: OperationKind,
    target_format: Option<&str>,
    compression_level: Option<&str>,
) -> Result<JobSpec, EngineError> {
    let target_format = match kind {
        OperationKind::Convert => {
            let raw = target_format
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| EngineError::Validation("targetFormat is required".to_string()))?;
            FileFormat::from_extension(raw)
                .ok_or_else(|| EngineError::Validation(format!("Invalid target format: {}", raw)))?
        }
        OperationKind::Compress => upload.source_format,
    };

    // an absent level falls back to the default ratio in `operation`
    let target_ratio = match (kind, compression_level.map(str::trim).filter(|s| !s.is_empty())) {
        (OperationKind::Compress, Some(raw)) => Some(parse_ratio(raw)?),
        (OperationKind::Compress, None) | (OperationKind::Convert, _) => None,
    };

    Ok(JobSpec {
        source_ref: upload.source_ref.clone(),
        source_format: upload.source_format,
        target_format,
        operation: operation(kind, target_ratio),
    })
}

fn parse_ratio(raw: &str) -> Result<u8, EngineError> {
    match raw.parse::<u32>() {
        Ok(value) if value <= 100 => Ok(value as u8),
        _ => Err(EngineError::Validation(format!(
            "compressionLevel must be between 0 and 100, got {:?}",
            raw
        ))),
    }
}

fn result_file_stem(job: &Job) -> String {
    match job.operation.kind() {
        OperationKind::Convert => format!("converted-{}", job.id),
        OperationKind::Compress => format!("compressed-{}", job.id),
    }
}
