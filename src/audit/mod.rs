// SPDX-License-Identifier: Apache-2.0

//! Audit Log Store
//!
//! Append-only proof-of-erasure records, persisted in a durable store that
//! is distinct from any target database. Records are never updated or
//! deleted; the store intentionally exposes no mutation beyond `append`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::engine::error::{EngineError, EngineResult};

/// Status literal written for every successfully erased record.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// One immutable proof-of-erasure entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub tenant_id: i64,
    pub target_db: String,
    pub target_table: String,
    pub target_pk: String,
    pub status: String,
    pub executed_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn success(
        tenant_id: i64,
        target_db: impl Into<String>,
        target_table: impl Into<String>,
        target_pk: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            target_db: target_db.into(),
            target_table: target_table.into(),
            target_pk: target_pk.into(),
            status: STATUS_SUCCESS.to_string(),
            executed_at: Utc::now(),
        }
    }
}

/// The audit persistence seam. The engine depends only on append/query
/// capabilities, not on the storage technology behind them.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends one record. Append-only by contract.
    async fn append(&self, record: AuditRecord) -> EngineResult<()>;

    /// Most recent records for one tenant, newest first.
    async fn for_tenant(&self, tenant_id: i64, limit: u32) -> EngineResult<Vec<AuditRecord>>;

    /// Most recent records across all tenants, newest first. Administrative
    /// read path; tenant scoping is the caller's responsibility.
    async fn recent(&self, limit: u32) -> EngineResult<Vec<AuditRecord>>;

    /// Total number of records ever appended.
    async fn total_count(&self) -> EngineResult<u64>;
}

/// PostgreSQL-backed store over a shared bounded pool. Pool exhaustion
/// makes callers wait for a connection rather than fail.
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub async fn connect(dsn: &str, min_connections: u32, max_connections: u32) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(dsn)
            .await
            .map_err(|e| EngineError::audit(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                log_id       BIGSERIAL PRIMARY KEY,
                tenant_id    BIGINT NOT NULL,
                target_db    TEXT NOT NULL,
                target_table TEXT NOT NULL,
                target_pk    TEXT NOT NULL,
                status       TEXT NOT NULL,
                executed_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::audit(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, record: AuditRecord) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (tenant_id, target_db, target_table, target_pk, status, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.tenant_id)
        .bind(&record.target_db)
        .bind(&record.target_table)
        .bind(&record.target_pk)
        .bind(&record.status)
        .bind(record.executed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::audit(e.to_string()))?;
        Ok(())
    }

    async fn for_tenant(&self, tenant_id: i64, limit: u32) -> EngineResult<Vec<AuditRecord>> {
        sqlx::query_as(
            r#"
            SELECT tenant_id, target_db, target_table, target_pk, status, executed_at
            FROM audit_logs
            WHERE tenant_id = $1
            ORDER BY executed_at DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::audit(e.to_string()))
    }

    async fn recent(&self, limit: u32) -> EngineResult<Vec<AuditRecord>> {
        sqlx::query_as(
            r#"
            SELECT tenant_id, target_db, target_table, target_pk, status, executed_at
            FROM audit_logs
            ORDER BY executed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::audit(e.to_string()))
    }

    async fn total_count(&self) -> EngineResult<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::audit(e.to_string()))?;
        Ok(count.0 as u64)
    }
}

/// In-memory store for tests and embedded use. Same append-only contract.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: std::sync::RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> EngineResult<()> {
        self.records
            .write()
            .map_err(|_| EngineError::audit("audit store lock poisoned"))?
            .push(record);
        Ok(())
    }

    async fn for_tenant(&self, tenant_id: i64, limit: u32) -> EngineResult<Vec<AuditRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| EngineError::audit("audit store lock poisoned"))?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn recent(&self, limit: u32) -> EngineResult<Vec<AuditRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| EngineError::audit("audit store lock poisoned"))?;
        Ok(records.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn total_count(&self) -> EngineResult<u64> {
        let records = self
            .records
            .read()
            .map_err(|_| EngineError::audit("audit store lock poisoned"))?;
        Ok(records.len() as u64)
    }
}
