use chrono::Utc;
use cron::Schedule;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::JobCoordinator;
use crate::infrastructure::storage::{RESULT_PREFIX, StorageService, UPLOAD_PREFIX};

const INITIAL_DELAY: Duration = Duration::from_secs(60);

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted_jobs: usize,
    pub deleted_files: usize,
}

/// Removes finished jobs once they are older than the retention window,
/// along with stale uploads and results no remaining job refers to.
#[derive(Clone)]
pub struct RetentionSweeper {
    coordinator: Arc<JobCoordinator>,
    storage: StorageService,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(coordinator: Arc<JobCoordinator>, storage: StorageService, retention: Duration) -> Self {
        Self {
            coordinator,
            storage,
            retention,
        }
    }

    /// One pass.
    ///
    /// Artifacts of evicted jobs go first, then any file under `uploads/` or
    /// `results/` last written before the cutoff. A key that a remaining job
    /// still refers to is never deleted, so several jobs can share one
    /// upload.
    pub async fn sweep(&self) -> SweepReport {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let evicted = self.coordinator.evict_finished_before(OffsetDateTime::from(cutoff)).await;

        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for job in &evicted {
            candidates.insert(job.source_ref.clone());
            if let Some(result) = &job.result {
                candidates.insert(result.result_ref.clone());
            }
        }
        for prefix in [UPLOAD_PREFIX, RESULT_PREFIX] {
            match self.storage.list_older_than(prefix, cutoff).await {
                Ok(keys) => candidates.extend(keys),
                Err(e) => warn!("Failed to list {} for cleanup: {}", prefix, e),
            }
        }

        let referenced = self.coordinator.referenced_keys().await;
        let mut deleted_files = 0;
        for key in candidates.iter().filter(|key| !referenced.contains(*key)) {
            match self.storage.delete(key).await {
                Ok(()) => deleted_files += 1,
                Err(e) => warn!("Failed to delete artifact {}: {}", key, e),
            }
        }

        let report = SweepReport {
            evicted_jobs: evicted.len(),
            deleted_files,
        };
        if report != SweepReport::default() {
            info!(
                evicted = report.evicted_jobs,
                deleted_files = report.deleted_files,
                "🧹 Expired jobs and files cleaned up"
            );
        }
        report
    }

    /// Runs an initial sweep shortly after start, then on every tick of
    /// `schedule` until `shutdown` fires.
    pub async fn run(self, schedule: Schedule, shutdown: CancellationToken) {
        info!("🧹 Retention sweeper started (retention {:?})", self.retention);

        tokio::select! {
            _ = tokio::time::sleep(INITIAL_DELAY) => {
                self.sweep().await;
            }
            _ = shutdown.cancelled() => return,
        }

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Cleanup schedule has no upcoming run, sweeper stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.sweep().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Retention sweeper stopped");
    }
}
