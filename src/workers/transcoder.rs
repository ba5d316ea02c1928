use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{
    ErrorInfo, ErrorKind, Job, JobCoordinator, JobId, JobResult, JobState, ProgressEvent, ProgressSink,
    RetryPolicy, TranscodeContext, TranscodeError,
};
use crate::infrastructure::storage::{StorageError, StorageService, result_key};

/// Fixed set of workers draining the job queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        coordinator: Arc<JobCoordinator>,
        storage: StorageService,
        retry: RetryPolicy,
    ) -> Self {
        let handles = (0..count)
            .map(|id| {
                let worker = Worker {
                    id,
                    coordinator: coordinator.clone(),
                    storage: storage.clone(),
                    retry,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker loop to return. Only finishes once the queue
    /// has been closed.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("❌ Worker task ended abnormally: {}", e);
            }
        }
    }
}

/// Why an attempt did not produce a result.
#[derive(Debug)]
enum Failure {
    Validation(String),
    Content(String),
    Infrastructure(String),
    Cancelled,
}

impl From<TranscodeError> for Failure {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Content(msg) => Failure::Content(msg),
            TranscodeError::Infrastructure(msg) => Failure::Infrastructure(msg),
            TranscodeError::Cancelled => Failure::Cancelled,
        }
    }
}

impl Failure {
    fn from_source(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) | StorageError::InvalidKey(_) => {
                Failure::Validation(format!("Source unavailable: {}", err))
            }
            other => Failure::Infrastructure(other.to_string()),
        }
    }
}

struct Worker {
    id: usize,
    coordinator: Arc<JobCoordinator>,
    storage: StorageService,
    retry: RetryPolicy,
}

impl Worker {
    async fn run(self) {
        info!(worker = self.id, "🎥 Transcoder worker started");

        while let Some(lease) = self.coordinator.queue.dequeue().await {
            self.process(lease.job_id()).await;
        }

        info!(worker = self.id, "Transcoder worker stopped");
    }

    async fn process(&self, job_id: JobId) {
        let c = &self.coordinator;

        // registered before the claim so a cancel landing right after it is not missed
        let cancel = c.cancellations.register(job_id);

        let job = match c
            .store
            .transition(job_id, &[JobState::Queued], JobState::Processing, |j| j.attempts += 1)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                c.cancellations.remove(job_id);
                debug!(worker = self.id, job_id = %job_id, "Skipping job: {}", e);
                return;
            }
        };
        c.notifier.publish(ProgressEvent::from(&job));

        info!(
            worker = self.id,
            job_id = %job_id,
            attempt = job.attempts,
            operation = %job.operation.kind(),
            "📦 Processing {} -> {}",
            job.source_format,
            job.target_format
        );

        let outcome = self.execute(&job, cancel).await;
        c.cancellations.remove(job_id);
        self.settle(&job, outcome).await;
    }

    async fn execute(&self, job: &Job, cancel: CancellationToken) -> Result<JobResult, Failure> {
        let c = &self.coordinator;
        let transcoder = c
            .registry
            .resolve(job.source_format, job.target_format, job.operation.kind())
            .map_err(|e| Failure::Validation(e.to_string()))?;

        debug!(job_id = %job.id, "⬇️ Loading source {}", job.source_ref);
        let input = self
            .storage
            .get(&job.source_ref)
            .await
            .map_err(Failure::from_source)?;
        let source_bytes = input.len() as u64;

        if cancel.is_cancelled() {
            return Err(Failure::Cancelled);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let relay = {
            let coordinator = c.clone();
            let job_id = job.id;
            tokio::spawn(async move {
                while let Some(percent) = rx.recv().await {
                    match coordinator.store.update_progress(job_id, percent).await {
                        Ok(Some(updated)) => coordinator.notifier.publish(ProgressEvent::from(&updated)),
                        Ok(None) => {}
                        // cancelled or evicted, later reports are moot
                        Err(_) => break,
                    }
                }
            })
        };

        let name = transcoder.name();
        let (source_format, target_format, operation) = (job.source_format, job.target_format, job.operation);
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let sink = ProgressSink::new(move |percent| {
                let _ = tx.send(percent);
            });
            transcoder.transcode(TranscodeContext {
                input: &input,
                source_format,
                target_format,
                operation,
                progress: &sink,
                cancel: &token,
            })
        });

        let joined = task.await;
        // the sink is gone with the blocking task, so the relay drains and ends
        if let Err(e) = relay.await {
            warn!(job_id = %job.id, "Progress relay ended abnormally: {}", e);
        }

        let output = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(e.into()),
            Err(e) if e.is_panic() => {
                return Err(Failure::Infrastructure(format!("Transcoder {} panicked", name)));
            }
            Err(e) => return Err(Failure::Infrastructure(e.to_string())),
        };

        if cancel.is_cancelled() {
            return Err(Failure::Cancelled);
        }

        let key = result_key(job.id, target_format);
        let output_bytes = output.bytes.len() as u64;
        self.storage
            .put(&key, Bytes::from(output.bytes), target_format.mime_type())
            .await
            .map_err(|e| Failure::Infrastructure(e.to_string()))?;

        Ok(JobResult::new(key, target_format, source_bytes, output_bytes))
    }

    async fn settle(&self, job: &Job, outcome: Result<JobResult, Failure>) {
        let c = &self.coordinator;
        match outcome {
            Ok(result) => {
                let key = result.result_ref.clone();
                let ratio = result.achieved_ratio;
                match c
                    .store
                    .transition(job.id, &[JobState::Processing], JobState::Completed, |j| {
                        j.result = Some(result)
                    })
                    .await
                {
                    Ok(done) => {
                        c.notifier.publish(ProgressEvent::from(&done));
                        info!(worker = self.id, job_id = %job.id, achieved_ratio = ratio, "✅ Job completed");
                    }
                    Err(e) => {
                        debug!(job_id = %job.id, "Discarding result: {}", e);
                        if let Err(e) = self.storage.delete(&key).await {
                            warn!(job_id = %job.id, "Failed to delete orphaned result {}: {}", key, e);
                        }
                    }
                }
            }
            Err(Failure::Infrastructure(message))
                if job.attempts <= self.retry.max_retries(job.operation.kind()) && !c.queue.is_closed() =>
            {
                self.requeue(job, message).await;
            }
            Err(Failure::Infrastructure(message)) => self.fail(job.id, ErrorKind::Infrastructure, message).await,
            Err(Failure::Content(message)) => self.fail(job.id, ErrorKind::Content, message).await,
            Err(Failure::Validation(message)) => self.fail(job.id, ErrorKind::Validation, message).await,
            Err(Failure::Cancelled) => {
                // a user cancel already committed `cancelled`, so this only lands on shutdown
                self.fail(job.id, ErrorKind::Infrastructure, "Interrupted by shutdown".to_string())
                    .await
            }
        }
    }

    async fn requeue(&self, job: &Job, message: String) {
        let c = &self.coordinator;
        match c
            .store
            .transition(job.id, &[JobState::Processing], JobState::Queued, |_| {})
            .await
        {
            Ok(queued) => {
                warn!(
                    worker = self.id,
                    job_id = %job.id,
                    attempt = job.attempts,
                    "🔁 Infrastructure failure, requeueing: {}",
                    message
                );
                c.notifier.publish(ProgressEvent::from(&queued));
                if let Err(e) = c.queue.requeue(job.id) {
                    error!(job_id = %job.id, "❌ Failed to requeue job: {}", e);
                }
            }
            Err(e) => debug!(job_id = %job.id, "Retry skipped: {}", e),
        }
    }

    async fn fail(&self, job_id: JobId, kind: ErrorKind, message: String) {
        let c = &self.coordinator;
        let result = c
            .store
            .transition(job_id, &[JobState::Processing], JobState::Failed, |j| {
                j.error = Some(ErrorInfo {
                    kind,
                    message: message.clone(),
                    attempts: j.attempts,
                })
            })
            .await;

        match result {
            Ok(failed) => {
                c.notifier.publish(ProgressEvent::from(&failed));
                error!(worker = self.id, job_id = %job_id, kind = ?kind, "❌ Job failed: {}", message);
            }
            Err(e) => debug!(job_id = %job_id, "Failure not recorded: {}", e),
        }
    }
}
