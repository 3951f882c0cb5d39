//! Target Connector
//!
//! Opens a transient, job-scoped connection to a caller-supplied external
//! database. One job owns exactly one connection for its whole lifetime;
//! connections to arbitrary hosts are never pooled or reused across jobs.
//!
//! ## Transaction handling
//!
//! Each record's full set of column updates executes inside one transaction
//! on the session's connection: all updates for that record commit together
//! or not at all. Failures surface per record so the batch can continue.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::{Column, ConnectOptions, Connection, Row};
use tokio::time::{timeout, Duration};
use tracing::{instrument, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql_safety::{quote_ident, quote_qualified};
use crate::engine::types::{ColumnMeta, ConnectionDescriptor, RowData, Value};

const CONNECT_TIMEOUT_MS: u64 = 15000;

/// Opens sessions against target databases. The seam exists so the job
/// runner and the introspection operations can be driven against test
/// doubles.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    async fn open(&self, descriptor: &ConnectionDescriptor)
        -> EngineResult<Box<dyn TargetSession>>;
}

/// A live session against one target database.
///
/// Sessions take `&mut self` throughout: a target session is owned by
/// exactly one operation and never shared.
#[async_trait]
pub trait TargetSession: Send {
    /// All user-table columns in the public schema, in declaration order.
    async fn list_columns(&mut self) -> EngineResult<Vec<ColumnMeta>>;

    /// Primary key column per table, where one exists.
    async fn primary_keys(&mut self) -> EngineResult<HashMap<String, String>>;

    /// Up to `limit` non-null values of one column, stringified.
    async fn sample_column(
        &mut self,
        table: &str,
        column: &str,
        limit: u32,
    ) -> EngineResult<Vec<String>>;

    /// Rows whose primary key matches one of `ids`, capped at `limit`.
    async fn fetch_rows_by_ids(
        &mut self,
        table: &str,
        pk_col: &str,
        ids: &[String],
        limit: u32,
    ) -> EngineResult<Vec<RowData>>;

    /// Pre-erasure snapshot of a single record.
    async fn fetch_row(
        &mut self,
        table: &str,
        pk_col: &str,
        id: &str,
    ) -> EngineResult<Option<RowData>>;

    /// Applies every column update for one record in a single transaction.
    /// Replacement values are bound as parameters, never interpolated.
    async fn apply_updates(
        &mut self,
        table: &str,
        pk_col: &str,
        id: &str,
        updates: &[(String, String)],
    ) -> EngineResult<()>;
}

/// PostgreSQL implementation over a single transient connection.
pub struct PostgresTarget;

pub struct PostgresTargetSession {
    conn: PgConnection,
}

#[async_trait]
impl TargetConnector for PostgresTarget {
    #[instrument(
        skip(self, descriptor),
        fields(
            host = %descriptor.host,
            port = descriptor.port,
            database = %descriptor.database,
            tls = descriptor.tls,
        )
    )]
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> EngineResult<Box<dyn TargetSession>> {
        let ssl_mode = match (descriptor.tls, descriptor.accept_invalid_certs) {
            (false, _) => PgSslMode::Disable,
            (true, false) => PgSslMode::VerifyFull,
            (true, true) => {
                // Explicit opt-in only; `Require` encrypts without verifying
                // the server certificate.
                warn!(
                    target_host = %descriptor.host,
                    "accepting unverified TLS certificates for target connection"
                );
                PgSslMode::Require
            }
        };

        let options = PgConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.port)
            .database(&descriptor.database)
            .username(&descriptor.username)
            .password(descriptor.password.expose())
            .ssl_mode(ssl_mode);

        let connect_future = options.connect();
        let conn = match timeout(Duration::from_millis(CONNECT_TIMEOUT_MS), connect_future).await
        {
            Ok(result) => result.map_err(EngineError::from_connect)?,
            Err(_) => {
                return Err(EngineError::connection_failed(format!(
                    "timed out after {}ms connecting to {}",
                    CONNECT_TIMEOUT_MS,
                    descriptor.display_name()
                )))
            }
        };

        Ok(Box::new(PostgresTargetSession { conn }))
    }
}

impl PostgresTargetSession {
    /// Converts a driver row into the universal map representation.
    fn convert_row(pg_row: &PgRow) -> RowData {
        pg_row
            .columns()
            .iter()
            .map(|col| (col.name().to_string(), Self::extract_value(pg_row, col.ordinal())))
            .collect()
    }

    /// Extracts a value at the given index, trying common types in order
    /// and degrading to Null for anything unrecognized. Temporal types are
    /// rendered as ISO-8601 text immediately so nothing downstream needs
    /// driver-specific date handling.
    fn extract_value(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return v
                .map(|t| Value::Text(t.format("%H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }

        Value::Null
    }
}

#[async_trait]
impl TargetSession for PostgresTargetSession {
    async fn list_columns(&mut self) -> EngineResult<Vec<ColumnMeta>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT table_name::text, column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| EngineError::introspection(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(table, name, data_type)| ColumnMeta { table, name, data_type })
            .collect())
    }

    async fn primary_keys(&mut self) -> EngineResult<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT kcu.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tco
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tco.constraint_name
             AND kcu.table_schema = tco.table_schema
            WHERE tco.constraint_type = 'PRIMARY KEY'
              AND tco.table_schema = 'public'
            "#,
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| EngineError::introspection(e.to_string()))?;

        Ok(rows.into_iter().collect())
    }

    async fn sample_column(
        &mut self,
        table: &str,
        column: &str,
        limit: u32,
    ) -> EngineResult<Vec<String>> {
        let q_tbl = quote_qualified("public", table)?;
        let q_col = quote_ident(column)?;
        let sql = format!(
            "SELECT {}::text FROM {} WHERE {} IS NOT NULL LIMIT {}",
            q_col, q_tbl, q_col, limit
        );

        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;

        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    async fn fetch_rows_by_ids(
        &mut self,
        table: &str,
        pk_col: &str,
        ids: &[String],
        limit: u32,
    ) -> EngineResult<Vec<RowData>> {
        let q_tbl = quote_qualified("public", table)?;
        let q_pk = quote_ident(pk_col)?;
        // The key is text-cast so callers can address any primary key type
        // with string ids.
        let sql = format!(
            "SELECT * FROM {} WHERE {}::text = ANY($1) LIMIT {}",
            q_tbl, q_pk, limit
        );

        let rows: Vec<PgRow> = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;

        Ok(rows.iter().map(Self::convert_row).collect())
    }

    async fn fetch_row(
        &mut self,
        table: &str,
        pk_col: &str,
        id: &str,
    ) -> EngineResult<Option<RowData>> {
        let q_tbl = quote_qualified("public", table)?;
        let q_pk = quote_ident(pk_col)?;
        let sql = format!("SELECT * FROM {} WHERE {}::text = $1", q_tbl, q_pk);

        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;

        Ok(row.as_ref().map(Self::convert_row))
    }

    async fn apply_updates(
        &mut self,
        table: &str,
        pk_col: &str,
        id: &str,
        updates: &[(String, String)],
    ) -> EngineResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let q_tbl = quote_qualified("public", table)?;
        let q_pk = quote_ident(pk_col)?;

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| EngineError::transaction_error(e.to_string()))?;

        for (column, replacement) in updates {
            let q_col = quote_ident(column)?;
            let sql = format!(
                "UPDATE {} SET {} = $1 WHERE {}::text = $2",
                q_tbl, q_col, q_pk
            );
            sqlx::query(&sql)
                .bind(replacement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| EngineError::execution_error(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::transaction_error(e.to_string()))?;

        Ok(())
    }
}
