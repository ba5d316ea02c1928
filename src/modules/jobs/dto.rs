use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::engine::{
    ErrorInfo, FileFormat, Job, JobId, JobResult, JobSpec, JobState, Operation, OperationKind,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateJobRequest {
    /// Key returned by `POST /uploads`.
    #[validate(length(min = 1, message = "source_ref is required"))]
    pub source_ref: String,
    pub source_format: FileFormat,
    pub target_format: FileFormat,
    pub operation: OperationKind,
    /// Requested output size as a percentage of the input; compress only.
    #[validate(range(max = 100, message = "target_ratio must be between 0 and 100"))]
    pub target_ratio: Option<u8>,
}

impl CreateJobRequest {
    pub fn into_spec(self) -> JobSpec {
        JobSpec {
            source_ref: self.source_ref,
            source_format: self.source_format,
            target_format: self.target_format,
            operation: operation(self.operation, self.target_ratio),
        }
    }
}

pub fn operation(kind: OperationKind, target_ratio: Option<u8>) -> Operation {
    match kind {
        OperationKind::Convert => Operation::Convert,
        OperationKind::Compress => Operation::Compress {
            target_ratio: target_ratio.unwrap_or(Operation::DEFAULT_TARGET_RATIO),
        },
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListJobsQuery {
    /// Only jobs in this state; all jobs when omitted.
    pub state: Option<JobState>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobCreatedResponse {
    pub job_id: JobId,
    pub state: JobState,
    pub status_url: String,
    pub events_url: String,
}

impl From<&Job> for JobCreatedResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            status_url: format!("/api/v1/jobs/{}", job.id),
            events_url: format!("/api/v1/jobs/{}/events", job.id),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub id: JobId,
    pub source_ref: String,
    pub source_format: FileFormat,
    pub target_format: FileFormat,
    pub operation: OperationKind,
    pub target_ratio: Option<u8>,
    pub state: JobState,
    pub progress: u8,
    pub processing: bool,
    pub attempts: u32,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub finished_at: Option<OffsetDateTime>,
    pub result: Option<JobResult>,
    pub error: Option<ErrorInfo>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            processing: job.is_processing(),
            source_ref: job.source_ref,
            source_format: job.source_format,
            target_format: job.target_format,
            operation: job.operation.kind(),
            target_ratio: job.operation.target_ratio(),
            state: job.state,
            progress: job.progress,
            attempts: job.attempts,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            result: job.result,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResultResponse {
    pub job_id: JobId,
    #[serde(flatten)]
    pub result: JobResult,
    pub download_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EngineStatusResponse {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub in_flight: usize,
}
