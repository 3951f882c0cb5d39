// SPDX-License-Identifier: Apache-2.0

//! Job records, lifecycle state machine, and the injected job store.
//!
//! The orchestrator owns every `ErasureJob`; mutation happens only in the
//! background runner and (deletion only) in the retention reaper. Status
//! moves strictly forward through the state machine and never leaves a
//! terminal state.

pub mod orchestrator;
pub mod reaper;
pub mod runner;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::error::{EngineError, EngineResult};

/// Opaque unique token identifying one erasure job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle states. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    EstablishingUplink,
    ExecutingErasure,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the forward-only ordering.
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::EstablishingUplink => 1,
            JobStatus::ExecutingErasure => 2,
            JobStatus::Completed | JobStatus::Failed => 3,
        }
    }
}

/// One erasure job as tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureJob {
    pub id: JobId,
    pub tenant_id: i64,
    pub organization: String,
    pub operator: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub target_db: String,
    pub target_table: String,
    pub total_records: usize,
    pub processed_records: usize,
    /// Set exactly once, when the archive is initialized.
    pub archive_path: Option<PathBuf>,
    /// Set only on fatal failure.
    pub error: Option<String>,
}

impl ErasureJob {
    /// Advances the state machine. Regressions, repeats, and transitions
    /// out of a terminal state are refused.
    pub fn advance(&mut self, next: JobStatus) -> EngineResult<()> {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return Err(EngineError::internal(format!(
                "illegal job status transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Caller-facing view of a job's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub target_db: String,
    pub target_table: String,
    pub processed_records: usize,
    pub total_records: usize,
    pub error: Option<String>,
}

impl From<&ErasureJob> for JobView {
    fn from(job: &ErasureJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
            target_db: job.target_db.clone(),
            target_table: job.target_table.clone(),
            processed_records: job.processed_records,
            total_records: job.total_records,
            error: job.error.clone(),
        }
    }
}

/// Injected key-value store for job records. Keeping the store this narrow
/// lets a distributed deployment swap it out without touching orchestration
/// logic.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts or replaces a job record.
    async fn put(&self, job: ErasureJob) -> EngineResult<()>;
    async fn get(&self, id: JobId) -> EngineResult<Option<ErasureJob>>;
    async fn delete(&self, id: JobId) -> EngineResult<()>;
    /// Snapshot of all job records, for the reaper's sweep.
    async fn list(&self) -> EngineResult<Vec<ErasureJob>>;
}

/// Default single-process store.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, ErasureJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, job: ErasureJob) -> EngineResult<()> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> EngineResult<Option<ErasureJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: JobId) -> EngineResult<()> {
        self.jobs.write().await.remove(&id);
        Ok(())
    }

    async fn list(&self) -> EngineResult<Vec<ErasureJob>> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ErasureJob {
        ErasureJob {
            id: JobId::new(),
            tenant_id: 1,
            organization: "Acme".into(),
            operator: "op@acme.io".into(),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            target_db: "crm".into(),
            target_table: "users".into(),
            total_records: 3,
            processed_records: 0,
            archive_path: None,
            error: None,
        }
    }

    #[test]
    fn status_advances_forward_only() {
        let mut j = job();
        j.advance(JobStatus::EstablishingUplink).unwrap();
        j.advance(JobStatus::ExecutingErasure).unwrap();
        j.advance(JobStatus::Completed).unwrap();

        // Terminal states are final.
        assert!(j.advance(JobStatus::Failed).is_err());
        assert!(j.advance(JobStatus::Queued).is_err());
    }

    #[test]
    fn status_cannot_regress_or_repeat() {
        let mut j = job();
        j.advance(JobStatus::ExecutingErasure).unwrap();
        assert!(j.advance(JobStatus::ExecutingErasure).is_err());
        assert!(j.advance(JobStatus::EstablishingUplink).is_err());
        // Skipping ahead to a later state is a forward move and allowed;
        // failure can strike from any non-terminal state.
        j.advance(JobStatus::Failed).unwrap();
        assert!(j.status.is_terminal());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryJobStore::new();
        let j = job();
        let id = j.id;

        store.put(j).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }
}
