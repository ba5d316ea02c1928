//! Batch conversion and compression job engine.
//!
//! The [`JobStore`] owns every job record and its conditional `transition`
//! is the only way a job's state changes. The [`JobCoordinator`] is the
//! facade callers use; the worker pool in `crate::workers` drains the
//! [`JobQueue`] and reports through the [`ProgressNotifier`].

pub mod cancellation;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod notifier;
pub mod queue;
pub mod registry;
pub mod store;
pub mod transcoder;

use std::sync::Arc;
use tracing::info;

pub use cancellation::CancellationRegistry;
pub use coordinator::JobCoordinator;
pub use error::{EngineError, QueueError, StoreError};
pub use model::{
    CompressionLevel, ErrorInfo, ErrorKind, FileFormat, Job, JobId, JobResult, JobSpec, JobState,
    Operation, OperationKind, ProgressEvent,
};
pub use notifier::{ProgressNotifier, ProgressStream};
pub use queue::JobQueue;
pub use registry::{TranscoderKey, TranscoderRegistry};
pub use store::JobStore;
pub use transcoder::{ProgressSink, TranscodeContext, TranscodeError, TranscodeOutput, Transcoder};

use crate::infrastructure::storage::StorageService;
use crate::workers::transcoder::WorkerPool;

/// Automatic retries after an infrastructure failure, per operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub convert: u32,
    pub compress: u32,
}

impl RetryPolicy {
    pub fn max_retries(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::Convert => self.convert,
            OperationKind::Compress => self.compress,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            convert: 1,
            compress: 1,
        }
    }
}

/// Startup configuration; fixed for the lifetime of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub worker_count: usize,
    pub max_queue_depth: usize,
    pub subscriber_buffer: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_queue_depth: 64,
            subscriber_buffer: 32,
            retry: RetryPolicy::default(),
        }
    }
}

/// A running engine: the coordinator handle plus the workers behind it.
pub struct Engine {
    pub coordinator: Arc<JobCoordinator>,
    workers: WorkerPool,
}

impl Engine {
    /// Builds the shared parts and spawns `worker_count` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: EngineConfig, registry: TranscoderRegistry, storage: StorageService) -> Self {
        let worker_count = config.worker_count.max(1);
        let coordinator = Arc::new(JobCoordinator::new(
            Arc::new(registry),
            Arc::new(JobStore::new()),
            Arc::new(JobQueue::new(config.max_queue_depth, worker_count)),
            Arc::new(ProgressNotifier::new(config.subscriber_buffer)),
            Arc::new(CancellationRegistry::new()),
        ));

        let workers = WorkerPool::spawn(worker_count, coordinator.clone(), storage, config.retry);

        info!(
            workers = worker_count,
            queue_depth = config.max_queue_depth,
            transcoders = coordinator.capabilities().len(),
            "⚙️ Job engine started"
        );

        Self { coordinator, workers }
    }

    pub fn coordinator(&self) -> Arc<JobCoordinator> {
        self.coordinator.clone()
    }

    /// Stops accepting work, interrupts running transcoders and waits for
    /// every worker to return.
    pub async fn shutdown(self) {
        info!("Shutting down job engine...");
        self.coordinator.queue.close();
        self.coordinator.cancellations.cancel_all();
        self.workers.join().await;
        info!("Job engine stopped");
    }
}
