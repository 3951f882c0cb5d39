//! Retention Reaper
//!
//! Periodic sweep evicting expired job records and their archive files.
//! Only terminal jobs are eligible: reaping a job that is still queued or
//! running would race the in-flight run that owns it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::jobs::JobStore;

pub struct RetentionReaper {
    store: Arc<dyn JobStore>,
    horizon: Duration,
    interval: Duration,
}

impl RetentionReaper {
    pub fn new(config: &EngineConfig, store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            horizon: config.retention_horizon,
            interval: config.reaper_interval,
        }
    }

    /// Starts the periodic sweep. Runs until the handle is aborted or the
    /// process exits.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so a fresh process
            // does not sweep before anything can have expired.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }

    /// One sweep over the job store. Returns the number of purged jobs.
    pub async fn sweep_once(&self) -> usize {
        let jobs = match self.store.list().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("reaper could not list jobs: {}", e);
                return 0;
            }
        };

        let now = Utc::now();
        let horizon = chrono::Duration::from_std(self.horizon)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut purged = 0;

        for job in jobs {
            if !job.status.is_terminal() {
                continue;
            }
            if now - job.created_at <= horizon {
                continue;
            }

            if let Some(path) = &job.archive_path {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(job_id = %job.id, "could not remove archive {}: {}", path.display(), e);
                    }
                }
            }

            if let Err(e) = self.store.delete(job.id).await {
                warn!(job_id = %job.id, "could not delete expired job: {}", e);
                continue;
            }

            info!(job_id = %job.id, "purged expired job");
            purged += 1;
        }

        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ErasureJob, JobId, JobStatus, MemoryJobStore};

    fn job(status: JobStatus, age_hours: i64) -> ErasureJob {
        ErasureJob {
            id: JobId::new(),
            tenant_id: 1,
            organization: "Acme".into(),
            operator: "op@acme.io".into(),
            status,
            created_at: Utc::now() - chrono::Duration::hours(age_hours),
            target_db: "crm".into(),
            target_table: "users".into(),
            total_records: 0,
            processed_records: 0,
            archive_path: None,
            error: None,
        }
    }

    fn reaper(store: Arc<MemoryJobStore>) -> RetentionReaper {
        RetentionReaper {
            store,
            horizon: Duration::from_secs(24 * 3600),
            interval: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn purges_only_expired_terminal_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        let expired = job(JobStatus::Completed, 48);
        let running = job(JobStatus::ExecutingErasure, 48);
        let fresh = job(JobStatus::Failed, 1);
        let (expired_id, running_id, fresh_id) = (expired.id, running.id, fresh.id);

        for j in [expired, running, fresh] {
            store.put(j).await.unwrap();
        }

        let purged = reaper(Arc::clone(&store)).sweep_once().await;
        assert_eq!(purged, 1);
        assert!(store.get(expired_id).await.unwrap().is_none());
        assert!(store.get(running_id).await.unwrap().is_some());
        assert!(store.get(fresh_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removes_the_archive_with_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("erasure_report_test.zip");
        std::fs::write(&archive, b"zip bytes").unwrap();

        let store = Arc::new(MemoryJobStore::new());
        let mut expired = job(JobStatus::Completed, 48);
        expired.archive_path = Some(archive.clone());
        store.put(expired).await.unwrap();

        let purged = reaper(Arc::clone(&store)).sweep_once().await;
        assert_eq!(purged, 1);
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn missing_archive_file_does_not_block_purge() {
        let store = Arc::new(MemoryJobStore::new());
        let mut expired = job(JobStatus::Completed, 48);
        expired.archive_path = Some("/nonexistent/erasure_report_x.zip".into());
        let id = expired.id;
        store.put(expired).await.unwrap();

        assert_eq!(reaper(Arc::clone(&store)).sweep_once().await, 1);
        assert!(store.get(id).await.unwrap().is_none());
    }
}
