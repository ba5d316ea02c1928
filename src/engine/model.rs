use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Opaque job identifier. Backed by a random UUID, so ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, format = Uuid)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Docx,
    #[serde(alias = "jpeg")]
    Jpg,
    Png,
}

impl FileFormat {
    pub const ALL: [FileFormat; 4] = [FileFormat::Pdf, FileFormat::Docx, FileFormat::Jpg, FileFormat::Png];

    /// Case-insensitive lookup; `jpeg` is accepted as an alias of `jpg`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(FileFormat::Pdf),
            "docx" => Some(FileFormat::Docx),
            "jpg" | "jpeg" => Some(FileFormat::Jpg),
            "png" => Some(FileFormat::Png),
            _ => None,
        }
    }

    /// Format from the extension of a file name such as `report.PDF`.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Format for a MIME type such as `image/jpeg`. Parameters are ignored.
    pub fn from_mime(mime: &mime::Mime) -> Option<Self> {
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("application", "pdf") => Some(FileFormat::Pdf),
            ("application", "vnd.openxmlformats-officedocument.wordprocessingml.document") => {
                Some(FileFormat::Docx)
            }
            ("image", "jpeg") | ("image", "jpg") | ("image", "pjpeg") => Some(FileFormat::Jpg),
            ("image", "png") => Some(FileFormat::Png),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Docx => "docx",
            FileFormat::Jpg => "jpg",
            FileFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "application/pdf",
            FileFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileFormat::Jpg => "image/jpeg",
            FileFormat::Png => "image/png",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("Unsupported file format: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Convert,
    Compress,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Convert => f.write_str("convert"),
            OperationKind::Compress => f.write_str("compress"),
        }
    }
}

/// What a job does to its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation {
    Convert,
    /// `target_ratio` is the requested output size as a percentage of the
    /// input. It is advisory: transcoders report what they achieved.
    Compress { target_ratio: u8 },
}

impl Operation {
    pub const DEFAULT_TARGET_RATIO: u8 = 50;

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Convert => OperationKind::Convert,
            Operation::Compress { .. } => OperationKind::Compress,
        }
    }

    pub fn target_ratio(&self) -> Option<u8> {
        match self {
            Operation::Convert => None,
            Operation::Compress { target_ratio } => Some(*target_ratio),
        }
    }

    pub fn compression_level(&self) -> Option<CompressionLevel> {
        self.target_ratio().map(CompressionLevel::from_ratio)
    }
}

/// Coarse bucket for an advisory compression ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    High,
    Medium,
    Low,
}

impl CompressionLevel {
    pub fn from_ratio(ratio: u8) -> Self {
        match ratio {
            0..=25 => CompressionLevel::High,
            26..=50 => CompressionLevel::Medium,
            _ => CompressionLevel::Low,
        }
    }

    /// Encoder quality factor in `0.0..=1.0`; lower keeps fewer bytes.
    pub fn quality(&self) -> f32 {
        match self {
            CompressionLevel::High => 0.25,
            CompressionLevel::Medium => 0.50,
            CompressionLevel::Low => 0.75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Pending,
        JobState::Queued,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    /// States from which a cancel request may still win.
    pub const ACTIVE: [JobState; 3] = [JobState::Pending, JobState::Queued, JobState::Processing];

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    /// Edges of the job lifecycle. `processing -> queued` is the single
    /// automatic retry after an infrastructure failure.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Queued)
                | (Pending, Cancelled)
                | (Queued, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Content,
    Infrastructure,
}

/// Structured cause recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobResult {
    pub result_ref: String,
    pub content_type: String,
    pub source_bytes: u64,
    pub output_bytes: u64,
    /// Output size as a percentage of the input size.
    pub achieved_ratio: f64,
}

impl JobResult {
    pub fn new(result_ref: String, format: FileFormat, source_bytes: u64, output_bytes: u64) -> Self {
        let achieved_ratio = if source_bytes == 0 {
            100.0
        } else {
            (output_bytes as f64 / source_bytes as f64 * 10_000.0).round() / 100.0
        };

        Self {
            result_ref,
            content_type: format.mime_type().to_string(),
            source_bytes,
            output_bytes,
            achieved_ratio,
        }
    }
}

/// Everything a caller supplies to create a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub source_ref: String,
    pub source_format: FileFormat,
    pub target_format: FileFormat,
    pub operation: Operation,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: JobId,
    pub source_ref: String,
    pub source_format: FileFormat,
    pub target_format: FileFormat,
    #[schema(value_type = Object)]
    pub operation: Operation,
    pub state: JobState,
    pub progress: u8,
    /// Times a worker has claimed this job.
    pub attempts: u32,
    /// Bumped on every committed change; lets subscribers drop stale events.
    pub revision: u64,
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

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            id: JobId::new(),
            source_ref: spec.source_ref,
            source_format: spec.source_format,
            target_format: spec.target_format,
            operation: spec.operation,
            state: JobState::Pending,
            progress: 0,
            attempts: 0,
            revision: 0,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Derived flag for clients that render a spinner.
    pub fn is_processing(&self) -> bool {
        self.state == JobState::Processing
    }
}

/// One entry of a job's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub revision: u64,
    pub result: Option<JobResult>,
    pub error: Option<ErrorInfo>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl From<&Job> for ProgressEvent {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            progress: job.progress,
            revision: job.revision,
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}
