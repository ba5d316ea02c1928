use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::error::StoreError;
use super::model::{Job, JobId, JobSpec, JobState};
use crate::infrastructure::storage::result_key;

/// Canonical job records.
///
/// Every mutation goes through the write lock, so `transition` behaves as a
/// compare-and-swap on the job's state: callers name the states they expect
/// and lose with [`StoreError::Conflict`] when somebody else got there first.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, spec: JobSpec) -> Job {
        let job = Job::new(spec);
        self.jobs.write().await.insert(job.id, job.clone());
        job
    }

    pub async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Moves `id` to `to` if it is currently in one of `from`, then applies
    /// `mutator` to the record before it is published.
    ///
    /// Timestamps are stamped here and only once. On `completed` the progress
    /// is pinned to 100. Outside terminal states no result or error survives.
    /// A `completed` record must carry a result and a `failed` one an error;
    /// otherwise nothing is committed and [`StoreError::MissingOutcome`] is
    /// returned.
    pub async fn transition<F>(
        &self,
        id: JobId,
        from: &[JobState],
        to: JobState,
        mutator: F,
    ) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !from.contains(&job.state) || job.is_terminal() {
            return Err(StoreError::Conflict {
                id,
                actual: job.state,
            });
        }
        if !job.state.can_transition_to(to) {
            return Err(StoreError::IllegalTransition {
                from: job.state,
                to,
            });
        }

        let mut staged = job.clone();
        staged.state = to;
        mutator(&mut staged);

        let outcome_missing = match to {
            JobState::Completed => staged.result.is_none(),
            JobState::Failed => staged.error.is_none(),
            _ => false,
        };
        if outcome_missing {
            return Err(StoreError::MissingOutcome { id, state: to });
        }

        let now = OffsetDateTime::now_utc();
        if to == JobState::Processing && staged.started_at.is_none() {
            staged.started_at = Some(now);
        }
        if to.is_terminal() && staged.finished_at.is_none() {
            staged.finished_at = Some(now);
        }
        match to {
            JobState::Completed => {
                staged.progress = 100;
                staged.error = None;
            }
            JobState::Failed => staged.result = None,
            _ => {
                staged.result = None;
                staged.error = None;
            }
        }
        staged.revision += 1;

        *job = staged;
        Ok(job.clone())
    }

    /// Raises the progress of a processing job. Lower values are ignored so
    /// the observed progress never goes backwards.
    ///
    /// Returns `Ok(None)` when nothing changed.
    pub async fn update_progress(&self, id: JobId, progress: u8) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.state != JobState::Processing {
            return Err(StoreError::Conflict {
                id,
                actual: job.state,
            });
        }

        let progress = progress.min(100);
        if progress <= job.progress {
            return Ok(None);
        }
        job.progress = progress;
        job.revision += 1;

        Ok(Some(job.clone()))
    }

    /// Jobs in `state`, oldest first.
    pub async fn list_by_state(&self, state: JobState) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.state == state)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Drops a job no worker has claimed yet. Used when admission fails
    /// after the record was created.
    pub async fn discard_unclaimed(&self, id: JobId) -> Option<Job> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(&id) {
            Some(job) if matches!(job.state, JobState::Pending | JobState::Queued) => jobs.remove(&id),
            _ => None,
        }
    }

    /// Removes terminal jobs that finished before `cutoff`.
    pub async fn evict_finished_before(&self, cutoff: OffsetDateTime) -> Vec<Job> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.is_terminal() && job.finished_at.is_some_and(|at| at < cutoff))
            .map(|job| job.id)
            .collect();

        expired.iter().filter_map(|id| jobs.remove(id)).collect()
    }

    /// Storage keys any stored job may still read or write: every source,
    /// and the result key of every job, written or not.
    pub async fn referenced_keys(&self) -> HashSet<String> {
        let jobs = self.jobs.read().await;
        let mut keys = HashSet::with_capacity(jobs.len() * 2);
        for job in jobs.values() {
            keys.insert(job.source_ref.clone());
            keys.insert(result_key(job.id, job.target_format));
            if let Some(result) = &job.result {
                keys.insert(result.result_ref.clone());
            }
        }
        keys
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{ErrorInfo, ErrorKind, FileFormat, JobResult, Operation};
    use std::sync::Arc;
    use time::Duration;

    fn spec() -> JobSpec {
        JobSpec {
            source_ref: "uploads/a.png".to_string(),
            source_format: FileFormat::Png,
            target_format: FileFormat::Jpg,
            operation: Operation::Convert,
        }
    }

    async fn processing_job(store: &JobStore) -> Job {
        let job = store.create(spec()).await;
        store
            .transition(job.id, &[JobState::Pending], JobState::Queued, |_| {})
            .await
            .unwrap();
        store
            .transition(job.id, &[JobState::Queued], JobState::Processing, |j| j.attempts += 1)
            .await
            .unwrap()
    }

    fn result() -> JobResult {
        JobResult::new("results/x.jpg".into(), FileFormat::Jpg, 10, 5)
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let store = JobStore::new();
        let job = store.create(spec()).await;

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.result.is_none() && job.error.is_none());
        assert_eq!(store.get(job.id).await.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = JobStore::new();
        let id = JobId::new();
        assert_eq!(store.get(id).await.unwrap_err(), StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn test_transition_stamps_timestamps_once() {
        let store = JobStore::new();
        let job = processing_job(&store).await;
        let started = job.started_at.unwrap();

        // retry path: back to queued, then claimed again
        store
            .transition(job.id, &[JobState::Processing], JobState::Queued, |_| {})
            .await
            .unwrap();
        let again = store
            .transition(job.id, &[JobState::Queued], JobState::Processing, |j| j.attempts += 1)
            .await
            .unwrap();

        assert_eq!(again.started_at, Some(started));
        assert_eq!(again.attempts, 2);
        assert!(again.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_completion_pins_progress_and_result() {
        let store = JobStore::new();
        let job = processing_job(&store).await;
        store.update_progress(job.id, 40).await.unwrap();

        let done = store
            .transition(job.id, &[JobState::Processing], JobState::Completed, |j| {
                j.result = Some(result())
            })
            .await
            .unwrap();

        assert_eq!(done.progress, 100);
        assert!(done.result.is_some());
        assert!(done.error.is_none());
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_transition_conflict_on_unexpected_state() {
        let store = JobStore::new();
        let job = store.create(spec()).await;

        let err = store
            .transition(job.id, &[JobState::Queued], JobState::Processing, |_| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                id: job.id,
                actual: JobState::Pending
            }
        );
    }

    #[tokio::test]
    async fn test_terminal_job_never_transitions() {
        let store = JobStore::new();
        let job = processing_job(&store).await;
        store
            .transition(job.id, &JobState::ACTIVE, JobState::Cancelled, |_| {})
            .await
            .unwrap();

        let err = store
            .transition(job.id, &[JobState::Cancelled], JobState::Queued, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_illegal_edge_rejected() {
        let store = JobStore::new();
        let job = store.create(spec()).await;

        let err = store
            .transition(job.id, &[JobState::Pending], JobState::Completed, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert_eq!(store.get(job.id).await.unwrap().state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_cancel_clears_any_payload() {
        let store = JobStore::new();
        let job = processing_job(&store).await;

        let cancelled = store
            .transition(job.id, &JobState::ACTIVE, JobState::Cancelled, |j| {
                j.result = Some(result());
                j.error = Some(ErrorInfo {
                    kind: ErrorKind::Content,
                    message: "x".into(),
                    attempts: 1,
                });
            })
            .await
            .unwrap();

        assert!(cancelled.result.is_none());
        assert!(cancelled.error.is_none());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = JobStore::new();
        let job = processing_job(&store).await;

        assert_eq!(store.update_progress(job.id, 30).await.unwrap().unwrap().progress, 30);
        assert!(store.update_progress(job.id, 10).await.unwrap().is_none());
        assert!(store.update_progress(job.id, 30).await.unwrap().is_none());
        assert_eq!(store.update_progress(job.id, 250).await.unwrap().unwrap().progress, 100);
        assert_eq!(store.get(job.id).await.unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_progress_only_while_processing() {
        let store = JobStore::new();
        let job = store.create(spec()).await;

        let err = store.update_progress(job.id, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { actual: JobState::Pending, .. }));
    }

    #[tokio::test]
    async fn test_revision_increases_on_every_change() {
        let store = JobStore::new();
        let job = processing_job(&store).await;
        let before = job.revision;

        let updated = store.update_progress(job.id, 5).await.unwrap().unwrap();
        assert_eq!(updated.revision, before + 1);
    }

    #[tokio::test]
    async fn test_list_by_state() {
        let store = JobStore::new();
        let a = store.create(spec()).await;
        let b = store.create(spec()).await;
        store
            .transition(b.id, &[JobState::Pending], JobState::Queued, |_| {})
            .await
            .unwrap();

        let pending = store.list_by_state(JobState::Pending).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
        assert_eq!(store.list_by_state(JobState::Queued).await[0].id, b.id);
        assert!(store.list_by_state(JobState::Completed).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_cancel_and_complete_have_one_winner() {
        for _ in 0..50 {
            let store = Arc::new(JobStore::new());
            let job = processing_job(&store).await;

            let s1 = store.clone();
            let complete = tokio::spawn(async move {
                s1.transition(job.id, &[JobState::Processing], JobState::Completed, |j| {
                    j.result = Some(result())
                })
                .await
            });
            let s2 = store.clone();
            let cancel = tokio::spawn(async move {
                s2.transition(job.id, &JobState::ACTIVE, JobState::Cancelled, |_| {})
                    .await
            });

            let (completed, cancelled) = (complete.await.unwrap(), cancel.await.unwrap());
            assert!(completed.is_ok() ^ cancelled.is_ok());

            let last = store.get(job.id).await.unwrap();
            match last.state {
                JobState::Completed => assert!(last.result.is_some()),
                JobState::Cancelled => assert!(last.result.is_none() && last.error.is_none()),
                other => panic!("unexpected final state {}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_discard_unclaimed_only() {
        let store = JobStore::new();
        let job = processing_job(&store).await;
        assert!(store.discard_unclaimed(job.id).await.is_none());

        let fresh = store.create(spec()).await;
        assert!(store.discard_unclaimed(fresh.id).await.is_some());
        assert!(store.get(fresh.id).await.is_err());
    }

    fn failure() -> ErrorInfo {
        ErrorInfo {
            kind: ErrorKind::Content,
            message: "corrupt input".into(),
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_terminal_outcome_is_required() {
        let store = JobStore::new();
        let job = processing_job(&store).await;
        let before = store.get(job.id).await.unwrap();

        let err = store
            .transition(job.id, &[JobState::Processing], JobState::Completed, |_| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::MissingOutcome {
                id: job.id,
                state: JobState::Completed
            }
        );

        // an error alone does not complete a job
        let err = store
            .transition(job.id, &[JobState::Processing], JobState::Completed, |j| {
                j.error = Some(failure())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingOutcome { .. }));

        let err = store
            .transition(job.id, &[JobState::Processing], JobState::Failed, |j| {
                j.result = Some(result())
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::MissingOutcome {
                id: job.id,
                state: JobState::Failed
            }
        );

        let after = store.get(job.id).await.unwrap();
        assert_eq!(after.state, JobState::Processing);
        assert_eq!(after.revision, before.revision);
        assert!(after.result.is_none() && after.error.is_none());
        assert!(after.finished_at.is_none());

        let failed = store
            .transition(job.id, &[JobState::Processing], JobState::Failed, |j| {
                j.error = Some(failure())
            })
            .await
            .unwrap();
        assert_eq!(failed.error.unwrap().message, "corrupt input");
        assert!(failed.result.is_none());
    }

    #[tokio::test]
    async fn test_evict_finished_before() {
        let store = JobStore::new();
        let done = processing_job(&store).await;
        store
            .transition(done.id, &[JobState::Processing], JobState::Failed, |j| {
                j.error = Some(failure())
            })
            .await
            .unwrap();
        let active = store.create(spec()).await;

        let evicted = store
            .evict_finished_before(OffsetDateTime::now_utc() + Duration::seconds(1))
            .await;

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, done.id);
        assert!(store.get(active.id).await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_referenced_keys_cover_sources_and_results() {
        let store = JobStore::new();
        let a = store.create(spec()).await;
        let b = store.create(spec()).await;

        let keys = store.referenced_keys().await;
        assert!(keys.contains("uploads/a.png"));
        assert!(keys.contains(&result_key(a.id, FileFormat::Jpg)));
        assert!(keys.contains(&result_key(b.id, FileFormat::Jpg)));
        // both jobs share one source
        assert_eq!(keys.len(), 3);
    }
}
