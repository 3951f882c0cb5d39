//! Schema scan and batch preview against a target database.
//!
//! Both operations are read-only and synchronous from the caller's point
//! of view: they open a transient session, do their work, and surface any
//! failure directly — no job record is ever created for them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::classify::{self, Classification};
use crate::engine::error::EngineResult;
use crate::engine::target::TargetConnector;
use crate::engine::types::ConnectionDescriptor;

/// Samples fetched per column during deep-scan classification.
const SAMPLE_LIMIT: u32 = 5;

/// Row cap for batch previews.
const PREVIEW_LIMIT: u32 = 100;

/// Scan result for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableScan {
    pub primary_key: Option<String>,
    pub columns: Vec<Classification>,
}

/// Full scan result: table name → primary key and per-column suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub tables: BTreeMap<String, TableScan>,
}

/// Connects to the target, walks its public schema, and suggests a
/// redaction strategy per column. Suggestions are advisory; erasure only
/// ever runs on a caller-confirmed rule list.
#[instrument(skip(connector, descriptor), fields(target = %descriptor.display_name()))]
pub async fn scan_target(
    connector: &dyn TargetConnector,
    descriptor: &ConnectionDescriptor,
) -> EngineResult<ScanReport> {
    let mut session = connector.open(descriptor).await?;

    let columns = session.list_columns().await?;
    let primary_keys = session.primary_keys().await?;

    let mut tables: BTreeMap<String, TableScan> = BTreeMap::new();
    for column in columns {
        // Sampling is best-effort: a permission error on one table must
        // not sink the whole scan, it just degrades that column's verdict.
        let samples = if classify::needs_samples(&column) {
            session
                .sample_column(&column.table, &column.name, SAMPLE_LIMIT)
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let classification = classify::classify(&column, &samples);
        tables
            .entry(column.table.clone())
            .or_insert_with(|| TableScan {
                primary_key: primary_keys.get(&column.table).cloned(),
                columns: Vec::new(),
            })
            .columns
            .push(classification);
    }

    Ok(ScanReport { tables })
}

/// Fetches the records matching `ids` with every value stringified
/// (temporal values ISO-8601), for the caller's pre-erasure review.
#[instrument(skip(connector, descriptor, ids), fields(target = %descriptor.display_name(), table = %table))]
pub async fn preview_batch(
    connector: &dyn TargetConnector,
    descriptor: &ConnectionDescriptor,
    table: &str,
    pk_col: &str,
    ids: &[String],
) -> EngineResult<Vec<BTreeMap<String, String>>> {
    let mut session = connector.open(descriptor).await?;

    let rows = session
        .fetch_rows_by_ids(table, pk_col, ids, PREVIEW_LIMIT)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(column, value)| (column, value.as_text()))
                .collect()
        })
        .collect())
}
