// SPDX-License-Identifier: Apache-2.0

//! Job Orchestrator
//!
//! The single entry point for erasure work. `submit` persists the job as
//! queued and hands it to the dispatch queue without ever blocking on the
//! erasure itself; the dispatcher owns execution and spawns one task per
//! job, so jobs for different tenants run fully concurrently. Once
//! submitted, a job runs to a terminal state or process restart — caller
//! disconnects cancel nothing.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::audit::AuditStore;
use crate::config::EngineConfig;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql_safety::validate_ident;
use crate::engine::target::TargetConnector;
use crate::engine::types::{ErasureRequest, Tenant};
use crate::jobs::runner::{self, JobContext};
use crate::jobs::{ErasureJob, JobId, JobStatus, JobStore, JobView};

pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    queue_tx: mpsc::UnboundedSender<(JobId, ErasureRequest)>,
}

impl Orchestrator {
    /// Wires the orchestrator and starts its dispatcher. Must be called
    /// from within a tokio runtime.
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn JobStore>,
        audit: Arc<dyn AuditStore>,
        connector: Arc<dyn TargetConnector>,
    ) -> Arc<Self> {
        let ctx = Arc::new(JobContext {
            pepper: config.pepper.expose().clone(),
            archive_dir: config.archive_dir.clone(),
            store: Arc::clone(&store),
            audit,
            connector,
        });

        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<(JobId, ErasureRequest)>();

        tokio::spawn(async move {
            while let Some((job_id, request)) = queue_rx.recv().await {
                tokio::spawn(runner::run_erasure_job(Arc::clone(&ctx), job_id, request));
            }
        });

        Arc::new(Self { store, queue_tx })
    }

    /// Creates the job record and enqueues the run. Returns as soon as the
    /// job is visible to its tenant; never waits on the erasure.
    #[instrument(skip(self, tenant, request), fields(tenant_id = tenant.id, table = %request.target_table))]
    pub async fn submit(&self, tenant: &Tenant, request: ErasureRequest) -> EngineResult<JobId> {
        // Reject malformed identifiers synchronously, before any job
        // record exists.
        validate_ident(&request.target_table)?;
        validate_ident(&request.target_id_col)?;
        for rule in &request.rules {
            validate_ident(&rule.column)?;
        }

        let job = ErasureJob {
            id: JobId::new(),
            tenant_id: tenant.id,
            organization: tenant.organization.clone(),
            operator: tenant.operator.clone(),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            target_db: request.connection.database.clone(),
            target_table: request.target_table.clone(),
            total_records: request.target_ids.len(),
            processed_records: 0,
            archive_path: None,
            error: None,
        };
        let job_id = job.id;
        self.store.put(job).await?;

        // The descriptor rides the queue, not the store: connection
        // credentials are never persisted.
        self.queue_tx
            .send((job_id, request))
            .map_err(|_| EngineError::internal("job dispatcher is not running"))?;

        info!(job_id = %job_id, "erasure job queued");
        Ok(job_id)
    }

    /// Current view of a job. Foreign-tenant and unknown ids are
    /// indistinguishable by design.
    pub async fn get(&self, tenant_id: i64, job_id: JobId) -> EngineResult<JobView> {
        let job = self.owned_job(tenant_id, job_id).await?;
        Ok(JobView::from(&job))
    }

    /// Path of the finished certificate archive. Only available to the
    /// owning tenant and only once the job completed.
    pub async fn archive_path(&self, tenant_id: i64, job_id: JobId) -> EngineResult<PathBuf> {
        let job = self.owned_job(tenant_id, job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(EngineError::ArchiveNotReady);
        }
        job.archive_path.ok_or(EngineError::ArchiveNotReady)
    }

    async fn owned_job(&self, tenant_id: i64, job_id: JobId) -> EngineResult<ErasureJob> {
        match self.store.get(job_id).await? {
            Some(job) if job.tenant_id == tenant_id => Ok(job),
            _ => Err(EngineError::JobNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditStore;
    use crate::engine::target::{TargetConnector, TargetSession};
    use crate::engine::types::ConnectionDescriptor;
    use crate::jobs::MemoryJobStore;
    use crate::observability::Sensitive;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Connector standing in for an unreachable target host.
    struct UnreachableConnector;

    #[async_trait]
    impl TargetConnector for UnreachableConnector {
        async fn open(
            &self,
            _descriptor: &ConnectionDescriptor,
        ) -> EngineResult<Box<dyn TargetSession>> {
            Err(EngineError::connection_failed("no route to host"))
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            id: 7,
            organization: "Acme".into(),
            operator: "op@acme.io".into(),
        }
    }

    fn request() -> ErasureRequest {
        ErasureRequest {
            connection: ConnectionDescriptor {
                host: "203.0.113.9".into(),
                port: 5432,
                database: "crm".into(),
                username: "svc".into(),
                password: Sensitive::new("pw".into()),
                tls: true,
                accept_invalid_certs: false,
            },
            target_table: "users".into(),
            target_id_col: "id".into(),
            target_ids: vec!["1".into()],
            rules: vec![],
        }
    }

    fn orchestrator() -> Arc<Orchestrator> {
        let config = EngineConfig::load();
        Orchestrator::new(
            &config,
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryAuditStore::new()),
            Arc::new(UnreachableConnector),
        )
    }

    async fn wait_terminal(orch: &Orchestrator, tenant_id: i64, id: JobId) -> JobView {
        for _ in 0..200 {
            let view = orch.get(tenant_id, id).await.unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not reach a terminal state");
    }

    #[tokio::test]
    async fn unreachable_target_fails_job_with_message() {
        let orch = orchestrator();
        let id = orch.submit(&tenant(), request()).await.unwrap();

        let view = wait_terminal(&orch, 7, id).await;
        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.error.unwrap().contains("no route to host"));
    }

    #[tokio::test]
    async fn foreign_tenant_sees_not_found() {
        let orch = orchestrator();
        let id = orch.submit(&tenant(), request()).await.unwrap();

        assert!(matches!(
            orch.get(999, id).await,
            Err(EngineError::JobNotFound)
        ));
        assert!(matches!(
            orch.archive_path(999, id).await,
            Err(EngineError::JobNotFound)
        ));
        // The owner can see it.
        assert!(orch.get(7, id).await.is_ok());
    }

    #[tokio::test]
    async fn archive_unavailable_until_completed() {
        let orch = orchestrator();
        let id = orch.submit(&tenant(), request()).await.unwrap();

        let view = wait_terminal(&orch, 7, id).await;
        assert_eq!(view.status, JobStatus::Failed);
        assert!(matches!(
            orch.archive_path(7, id).await,
            Err(EngineError::ArchiveNotReady)
        ));
    }

    #[tokio::test]
    async fn malformed_identifiers_are_rejected_synchronously() {
        let orch = orchestrator();
        let mut bad = request();
        bad.target_table = "".into();
        assert!(matches!(
            orch.submit(&tenant(), bad).await,
            Err(EngineError::ValidationError { .. })
        ));
    }
}
