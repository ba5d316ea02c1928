use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::cancellation::CancellationRegistry;
use super::error::{EngineError, QueueError, StoreError};
use super::model::{Job, JobId, JobResult, JobSpec, JobState, Operation, ProgressEvent};
use super::notifier::{ProgressNotifier, ProgressStream};
use super::queue::JobQueue;
use super::registry::{TranscoderKey, TranscoderRegistry};
use super::store::JobStore;

/// Single entry point for callers: submit, cancel, query and subscribe.
///
/// Holds the shared engine parts; workers receive clones of the same `Arc`s.
#[derive(Debug)]
pub struct JobCoordinator {
    pub(crate) registry: Arc<TranscoderRegistry>,
    pub(crate) store: Arc<JobStore>,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) notifier: Arc<ProgressNotifier>,
    pub(crate) cancellations: Arc<CancellationRegistry>,
}

impl JobCoordinator {
    pub fn new(
        registry: Arc<TranscoderRegistry>,
        store: Arc<JobStore>,
        queue: Arc<JobQueue>,
        notifier: Arc<ProgressNotifier>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
            notifier,
            cancellations,
        }
    }

    /// Validates `spec`, records the job and admits it to the queue.
    ///
    /// Unresolvable format pairs fail before anything is stored. When the
    /// queue is full the freshly created record is dropped again, so a
    /// rejected submission leaves no trace.
    pub async fn submit(&self, spec: JobSpec) -> Result<Job, EngineError> {
        if spec.source_ref.trim().is_empty() {
            return Err(EngineError::Validation("source_ref must not be empty".to_string()));
        }
        if let Operation::Compress { target_ratio } = spec.operation {
            if target_ratio > 100 {
                return Err(EngineError::Validation(format!(
                    "target_ratio must be between 0 and 100, got {}",
                    target_ratio
                )));
            }
        }
        if self.queue.is_closed() {
            return Err(EngineError::ShuttingDown);
        }
        self.registry
            .resolve(spec.source_format, spec.target_format, spec.operation.kind())?;

        let job = self.store.create(spec).await;
        let job = self
            .store
            .transition(job.id, &[JobState::Pending], JobState::Queued, |_| {})
            .await
            .map_err(|e| self.store_error(e))?;

        match self.queue.enqueue(job.id) {
            Ok(()) => {
                self.notifier.publish(ProgressEvent::from(&job));
                info!(
                    job_id = %job.id,
                    operation = %job.operation.kind(),
                    source_format = %job.source_format,
                    target_format = %job.target_format,
                    "📥 Job queued"
                );
                Ok(job)
            }
            Err(QueueError::Full { capacity }) => {
                self.store.discard_unclaimed(job.id).await;
                warn!(job_id = %job.id, capacity, "Queue full, submission rejected");
                Err(EngineError::QueueFull { capacity })
            }
            Err(QueueError::Closed) => {
                self.store.discard_unclaimed(job.id).await;
                Err(EngineError::ShuttingDown)
            }
        }
    }

    /// Cancels a job that has not reached a terminal state yet.
    ///
    /// Losing the race against a worker that just finished the job yields
    /// `AlreadyTerminal` with the state that won.
    pub async fn cancel(&self, id: JobId) -> Result<Job, EngineError> {
        let job = self
            .store
            .transition(id, &JobState::ACTIVE, JobState::Cancelled, |_| {})
            .await
            .map_err(|e| self.store_error(e))?;

        let dequeued = self.queue.cancel_if_queued(id);
        let signalled = self.cancellations.signal(id);
        self.notifier.publish(ProgressEvent::from(&job));

        info!(job_id = %id, dequeued, signalled, "🛑 Job cancelled");
        Ok(job)
    }

    pub async fn status(&self, id: JobId) -> Result<Job, EngineError> {
        self.store.get(id).await.map_err(|e| self.store_error(e))
    }

    /// Result metadata of a completed job.
    pub async fn result(&self, id: JobId) -> Result<JobResult, EngineError> {
        let job = self.status(id).await?;
        match (job.state, job.result) {
            (JobState::Completed, Some(result)) => Ok(result),
            (state, _) => Err(EngineError::NotCompleted { id, state }),
        }
    }

    pub async fn list(&self, state: JobState) -> Vec<Job> {
        self.store.list_by_state(state).await
    }

    /// Progress stream starting from the job's current state.
    ///
    /// The receiver is registered before the snapshot is read, so no change
    /// committed after the snapshot can slip through unseen.
    pub async fn subscribe(&self, id: JobId) -> Result<ProgressStream, EngineError> {
        let rx = self.notifier.subscribe(id);
        let snapshot = match self.store.get(id).await {
            Ok(job) => ProgressEvent::from(&job),
            Err(e) => {
                drop(rx);
                self.notifier.release(id);
                return Err(self.store_error(e));
            }
        };

        if snapshot.is_terminal() {
            drop(rx);
            self.notifier.release(id);
            return Ok(Box::pin(futures_util::stream::once(async move { snapshot })));
        }

        debug!(job_id = %id, revision = snapshot.revision, "Progress subscriber attached");
        Ok(ProgressNotifier::stream(snapshot, rx))
    }

    pub fn capabilities(&self) -> Vec<TranscoderKey> {
        self.registry.capabilities()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn in_flight(&self) -> usize {
        self.queue.in_flight()
    }

    /// Drops terminal jobs that finished before `cutoff` and returns them so
    /// the caller can clean up their artifacts.
    pub async fn evict_finished_before(&self, cutoff: OffsetDateTime) -> Vec<Job> {
        self.store.evict_finished_before(cutoff).await
    }

    /// Storage keys still needed by jobs the engine knows about.
    pub async fn referenced_keys(&self) -> HashSet<String> {
        self.store.referenced_keys().await
    }

    fn store_error(&self, err: StoreError) -> EngineError {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Conflict { id, actual } => EngineError::AlreadyTerminal { id, state: actual },
            StoreError::IllegalTransition { from, to } => {
                EngineError::Validation(format!("Illegal transition {} -> {}", from, to))
            }
            e @ StoreError::MissingOutcome { .. } => EngineError::Validation(e.to_string()),
        }
    }
}
