use utoipa::OpenApi;

use crate::engine::{
    CompressionLevel, ErrorInfo, ErrorKind, FileFormat, JobResult, JobState, OperationKind,
    ProgressEvent, TranscoderKey,
};
use crate::modules::jobs::dto::{
    CreateJobRequest, EngineStatusResponse, JobCreatedResponse, JobResponse, JobResultResponse,
};
use crate::modules::uploads::dto::UploadResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::uploads::handler::upload_file,
        crate::modules::jobs::handler::create_job,
        crate::modules::jobs::handler::convert,
        crate::modules::jobs::handler::compress,
        crate::modules::jobs::handler::list_jobs,
        crate::modules::jobs::handler::get_job,
        crate::modules::jobs::handler::cancel_job,
        crate::modules::jobs::handler::get_result,
        crate::modules::jobs::handler::list_formats,
        crate::modules::jobs::handler::engine_status,
        crate::modules::jobs::stream_handler::job_events,
        crate::modules::jobs::stream_handler::download_result,
    ),
    components(
        schemas(
            UploadResponse, CreateJobRequest, JobCreatedResponse, JobResponse, JobResultResponse,
            EngineStatusResponse, ProgressEvent, TranscoderKey, JobResult, ErrorInfo, ErrorKind,
            FileFormat, JobState, OperationKind, CompressionLevel,
        )
    ),
    tags(
        (name = "Uploads", description = "Source file uploads"),
        (name = "Jobs", description = "Conversion and compression jobs"),
        (name = "System", description = "Engine capabilities and status")
    )
)]
pub struct ApiDoc;
