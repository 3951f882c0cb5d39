// Veil Engine - PII discovery and irreversible pseudonymization
// Core library

pub mod audit;
pub mod certificate;
pub mod classify;
pub mod config;
pub mod engine;
pub mod introspect;
pub mod jobs;
pub mod observability;
pub mod redact;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use audit::{AuditStore, PgAuditStore};
use config::EngineConfig;
use engine::error::EngineResult;
use engine::target::{PostgresTarget, TargetConnector};
use engine::types::{ConnectionDescriptor, ErasureRequest, Tenant};
use introspect::ScanReport;
use jobs::orchestrator::Orchestrator;
use jobs::reaper::RetentionReaper;
use jobs::{JobId, JobStore, JobView, MemoryJobStore};

/// Fully wired engine. This is the seam the surrounding plumbing (HTTP
/// routing, auth) talks to; everything behind it is this crate's problem.
pub struct EngineState {
    pub config: EngineConfig,
    pub job_store: Arc<dyn JobStore>,
    pub audit_store: Arc<dyn AuditStore>,
    pub connector: Arc<dyn TargetConnector>,
    pub orchestrator: Arc<Orchestrator>,
    reaper_handle: tokio::task::JoinHandle<()>,
}

impl EngineState {
    /// Production wiring: configuration from the environment, Postgres
    /// audit store, in-process job store, real target connector.
    pub async fn init() -> EngineResult<Self> {
        let config = EngineConfig::load();
        let audit_store: Arc<dyn AuditStore> = Arc::new(
            PgAuditStore::connect(
                config.audit_dsn.expose(),
                config.audit_pool_min,
                config.audit_pool_max,
            )
            .await?,
        );
        Ok(Self::with_parts(
            config,
            Arc::new(MemoryJobStore::new()),
            audit_store,
            Arc::new(PostgresTarget),
        ))
    }

    /// Wiring with injected stores and connector, for embedding and tests.
    pub fn with_parts(
        config: EngineConfig,
        job_store: Arc<dyn JobStore>,
        audit_store: Arc<dyn AuditStore>,
        connector: Arc<dyn TargetConnector>,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            &config,
            Arc::clone(&job_store),
            Arc::clone(&audit_store),
            Arc::clone(&connector),
        );
        let reaper_handle =
            RetentionReaper::new(&config, Arc::clone(&job_store)).spawn();

        Self {
            config,
            job_store,
            audit_store,
            connector,
            orchestrator,
            reaper_handle,
        }
    }

    /// Scans a target database and suggests a redaction strategy per column.
    pub async fn scan_target(&self, descriptor: &ConnectionDescriptor) -> EngineResult<ScanReport> {
        introspect::scan_target(self.connector.as_ref(), descriptor).await
    }

    /// Fetches the stringified records a caller is about to erase.
    pub async fn preview_batch(
        &self,
        descriptor: &ConnectionDescriptor,
        table: &str,
        pk_col: &str,
        ids: &[String],
    ) -> EngineResult<Vec<BTreeMap<String, String>>> {
        introspect::preview_batch(self.connector.as_ref(), descriptor, table, pk_col, ids).await
    }

    /// Submits an erasure job; returns immediately with the job id.
    pub async fn submit_erasure(
        &self,
        tenant: &Tenant,
        request: ErasureRequest,
    ) -> EngineResult<JobId> {
        self.orchestrator.submit(tenant, request).await
    }

    /// Tenant-scoped job status.
    pub async fn job_status(&self, tenant_id: i64, job_id: JobId) -> EngineResult<JobView> {
        self.orchestrator.get(tenant_id, job_id).await
    }

    /// Tenant-scoped archive location, available once the job completed.
    pub async fn archive_path(&self, tenant_id: i64, job_id: JobId) -> EngineResult<PathBuf> {
        self.orchestrator.archive_path(tenant_id, job_id).await
    }

    /// Stops the background reaper. Running jobs are unaffected.
    pub fn shutdown(&self) {
        self.reaper_handle.abort();
    }
}
