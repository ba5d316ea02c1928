use thiserror::Error;

use super::model::{FileFormat, JobId, JobState, OperationKind};
use crate::infrastructure::storage::StorageError;

/// Errors surfaced synchronously by the coordinator.
///
/// Execution-time failures never show up here: they are recorded on the job
/// itself (`state = failed`, `error = Some(..)`).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported {operation} from {source_format} to {target_format}")]
    NotSupported {
        source_format: FileFormat,
        target_format: FileFormat,
        operation: OperationKind,
    },

    #[error("Queue is full ({capacity} jobs waiting), retry later")]
    QueueFull { capacity: usize },

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} is already {state}")]
    AlreadyTerminal { id: JobId, state: JobState },

    #[error("Job {id} has no result while {state}")]
    NotCompleted { id: JobId, state: JobState },

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Whether the caller may resubmit the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::QueueFull { .. })
    }
}

/// Outcome of a rejected store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Lost a compare-and-swap: the job was not in any of the expected states.
    #[error("Job {id} is {actual}, transition rejected")]
    Conflict { id: JobId, actual: JobState },

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },

    /// `completed` without a result, or `failed` without an error.
    #[error("Job {id} cannot become {state} without an outcome")]
    MissingOutcome { id: JobId, state: JobState },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Queue is closed")]
    Closed,
}
