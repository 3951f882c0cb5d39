//! Background erasure execution
//!
//! One invocation of [`run_erasure_job`] owns a job from `Queued` to a
//! terminal state: it opens the job's single transient target connection,
//! walks the target ids, applies the confirmed redaction rules per record
//! inside a transaction, and emits the audit row and certificate for every
//! record that was actually erased. Per-record failures are logged and
//! skipped; only connection- or archive-level errors are fatal.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::audit::{AuditRecord, AuditStore};
use crate::certificate::{archive_filename, ArchiveWriter, Certificate};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::target::TargetConnector;
use crate::engine::types::ErasureRequest;
use crate::jobs::{ErasureJob, JobId, JobStatus, JobStore};
use crate::redact::{replacement_for, JobSalt, RedactionRule};

/// Everything a job run needs, shared by the dispatcher across runs.
pub struct JobContext {
    pub pepper: String,
    pub archive_dir: std::path::PathBuf,
    pub store: Arc<dyn JobStore>,
    pub audit: Arc<dyn AuditStore>,
    pub connector: Arc<dyn TargetConnector>,
}

/// Loads, mutates, and writes back one job record.
async fn with_job<F>(store: &dyn JobStore, id: JobId, mutate: F) -> EngineResult<()>
where
    F: FnOnce(&mut ErasureJob) -> EngineResult<()>,
{
    let mut job = store.get(id).await?.ok_or(EngineError::JobNotFound)?;
    mutate(&mut job)?;
    store.put(job).await
}

/// Marks a job failed with its fatal error message. Nothing runs for the
/// job after this.
async fn fail_job(store: &dyn JobStore, id: JobId, message: String) {
    error!(job_id = %id, error = %message, "erasure job failed");
    let result = with_job(store, id, |job| {
        job.error = Some(message.clone());
        job.advance(JobStatus::Failed)
    })
    .await;
    if let Err(e) = result {
        error!(job_id = %id, "could not record job failure: {}", e);
    }
}

#[instrument(skip(ctx, request), fields(job_id = %job_id, target_table = %request.target_table))]
pub async fn run_erasure_job(ctx: Arc<JobContext>, job_id: JobId, request: ErasureRequest) {
    // The salt lives for exactly one job: every record in this run shares
    // it, and a re-run gets a fresh one.
    let salt = JobSalt::generate();

    if let Err(e) = with_job(ctx.store.as_ref(), job_id, |job| {
        job.advance(JobStatus::EstablishingUplink)
    })
    .await
    {
        error!(job_id = %job_id, "could not mark job as establishing uplink: {}", e);
        return;
    }

    let mut session = match ctx.connector.open(&request.connection).await {
        Ok(session) => session,
        Err(e) => {
            fail_job(ctx.store.as_ref(), job_id, e.to_string()).await;
            return;
        }
    };

    let archive_path = ctx.archive_dir.join(archive_filename(&job_id.to_string()));
    let mut archive = match ArchiveWriter::create(&archive_path) {
        Ok(archive) => archive,
        Err(e) => {
            fail_job(ctx.store.as_ref(), job_id, e.to_string()).await;
            return;
        }
    };

    let mut tenant_id = 0i64;
    let mut organization = String::new();
    let mut operator = String::new();
    if let Err(e) = with_job(ctx.store.as_ref(), job_id, |job| {
        job.archive_path = Some(archive_path.clone());
        tenant_id = job.tenant_id;
        organization = job.organization.clone();
        operator = job.operator.clone();
        job.advance(JobStatus::ExecutingErasure)
    })
    .await
    {
        error!(job_id = %job_id, "could not mark job as executing: {}", e);
        return;
    }

    let destructive_rules: Vec<&RedactionRule> = request
        .rules
        .iter()
        .filter(|rule| {
            if rule.strategy.is_destructive() {
                true
            } else {
                warn!(
                    column = %rule.column,
                    strategy = ?rule.strategy,
                    "rule performs no mutation, column skipped"
                );
                false
            }
        })
        .collect();

    for target_id in &request.target_ids {
        let row = match session
            .fetch_row(&request.target_table, &request.target_id_col, target_id)
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(record = %target_id, "target record not found, skipped");
                bump_progress(ctx.store.as_ref(), job_id).await;
                continue;
            }
            Err(e) => {
                warn!(record = %target_id, "pre-erasure fetch failed, record skipped: {}", e);
                bump_progress(ctx.store.as_ref(), job_id).await;
                continue;
            }
        };

        let mut updates: Vec<(String, String)> = Vec::new();
        for rule in &destructive_rules {
            let Some(original) = row.get(&rule.column) else {
                warn!(record = %target_id, column = %rule.column, "column missing from row, skipped");
                continue;
            };
            if original.is_null() {
                continue;
            }
            if let Some(replacement) =
                replacement_for(rule.strategy, &ctx.pepper, &salt, &original.as_text())
            {
                updates.push((rule.column.clone(), replacement));
            }
        }

        if let Err(e) = session
            .apply_updates(&request.target_table, &request.target_id_col, target_id, &updates)
            .await
        {
            warn!(record = %target_id, "record transaction failed, record skipped: {}", e);
            bump_progress(ctx.store.as_ref(), job_id).await;
            continue;
        }

        // The audit write is a separate transaction against a separate
        // store; a crash between the target commit and this append leaves
        // the mutation unaudited (at-least-once, documented).
        if let Err(e) = ctx
            .audit
            .append(AuditRecord::success(
                tenant_id,
                request.connection.database.clone(),
                request.target_table.clone(),
                target_id.clone(),
            ))
            .await
        {
            error!(record = %target_id, "audit append failed: {}", e);
        }

        let certificate = Certificate::for_record(
            organization.clone(),
            operator.clone(),
            target_id.clone(),
            request.target_table.clone(),
            &row,
        );
        if let Err(e) = archive.append_certificate(&certificate) {
            // The erasure already committed; the record counts as erased
            // even though its certificate is missing from the bundle.
            error!(record = %target_id, "certificate generation failed: {}", e);
        }

        bump_progress(ctx.store.as_ref(), job_id).await;
    }

    let certificates = archive.entries();
    if let Err(e) = archive.finish() {
        fail_job(ctx.store.as_ref(), job_id, e.to_string()).await;
        return;
    }

    if let Err(e) =
        with_job(ctx.store.as_ref(), job_id, |job| job.advance(JobStatus::Completed)).await
    {
        error!(job_id = %job_id, "could not mark job completed: {}", e);
        return;
    }

    info!(
        job_id = %job_id,
        records = request.target_ids.len(),
        certificates,
        "erasure job finalized"
    );
}

async fn bump_progress(store: &dyn JobStore, id: JobId) {
    let result = with_job(store, id, |job| {
        job.processed_records += 1;
        Ok(())
    })
    .await;
    if let Err(e) = result {
        warn!(job_id = %id, "could not update job progress: {}", e);
    }
}
