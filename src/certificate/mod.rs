//! Certificate of Erasure generation
//!
//! One compliance document per successfully erased record, bundled into a
//! single compressed archive per job. The document carries a masked
//! rendering of the pre-erasure row; the unmasked row never leaves the
//! runner and is never written to any log or disk artifact.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::RowData;

const DISCLAIMER: &str = "This document serves as proof that the PII associated with the \
above record has been irreversibly pseudonymized. The original data is no longer stored \
in plain text.";

/// Masks a single field value for inclusion in a certificate: first two
/// characters retained, remainder replaced; values of four characters or
/// fewer are masked entirely.
pub fn mask_field(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 4 {
        let head: String = chars[..2].iter().collect();
        format!("{}********", head)
    } else {
        "****".to_string()
    }
}

/// A per-record compliance document. Exists only transiently while the
/// archive entry is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub title: String,
    pub organization: String,
    pub operator: String,
    pub record_id: String,
    pub target_table: String,
    pub issued_at: DateTime<Utc>,
    /// Field-by-field masked snapshot of the pre-erasure row. BTreeMap for
    /// a stable field order in the rendered document.
    pub masked_snapshot: BTreeMap<String, String>,
    pub disclaimer: String,
}

impl Certificate {
    /// Builds the certificate directly from the pre-erasure row, masking
    /// every value on the way in so no unmasked copy lives on this type.
    pub fn for_record(
        organization: impl Into<String>,
        operator: impl Into<String>,
        record_id: impl Into<String>,
        target_table: impl Into<String>,
        row: &RowData,
    ) -> Self {
        let masked_snapshot = row
            .iter()
            .map(|(column, value)| (column.clone(), mask_field(&value.as_text())))
            .collect();

        Self {
            title: "CERTIFICATE OF ERASURE".to_string(),
            organization: organization.into(),
            operator: operator.into(),
            record_id: record_id.into(),
            target_table: target_table.into(),
            issued_at: Utc::now(),
            masked_snapshot,
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

/// Deterministic archive file name for a job.
pub fn archive_filename(job_token: &str) -> String {
    let prefix: String = job_token.chars().take(8).collect();
    format!("erasure_report_{}.zip", prefix)
}

/// Streams certificates into a growing deflate archive on disk.
pub struct ArchiveWriter {
    writer: ZipWriter<File>,
    path: PathBuf,
    entries: usize,
}

impl ArchiveWriter {
    pub fn create(path: &Path) -> EngineResult<Self> {
        let file = File::create(path).map_err(|e| {
            EngineError::archive(format!("cannot create {}: {}", path.display(), e))
        })?;
        Ok(Self {
            writer: ZipWriter::new(file),
            path: path.to_path_buf(),
            entries: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Appends one certificate as a JSON entry named by record identifier.
    pub fn append_certificate(&mut self, certificate: &Certificate) -> EngineResult<()> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let entry_name = format!("certificate_{}.json", certificate.record_id);

        self.writer
            .start_file(entry_name, options)
            .map_err(|e| EngineError::archive(e.to_string()))?;

        let body = serde_json::to_vec_pretty(certificate)
            .map_err(|e| EngineError::archive(e.to_string()))?;
        self.writer
            .write_all(&body)
            .map_err(|e| EngineError::archive(e.to_string()))?;

        self.entries += 1;
        Ok(())
    }

    /// Finalizes the archive. Must be called even for an empty job so the
    /// bundle is a valid zip.
    pub fn finish(self) -> EngineResult<PathBuf> {
        self.writer
            .finish()
            .map_err(|e| EngineError::archive(e.to_string()))?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Value;

    #[test]
    fn mask_retains_two_chars_only() {
        assert_eq!(mask_field("alice@example.com"), "al********");
        assert_eq!(mask_field("12345"), "12********");
    }

    #[test]
    fn short_values_are_fully_masked() {
        assert_eq!(mask_field("abcd"), "****");
        assert_eq!(mask_field(""), "****");
    }

    #[test]
    fn certificate_snapshot_never_contains_originals() {
        let mut row = RowData::new();
        row.insert("email".to_string(), Value::Text("alice@example.com".into()));
        row.insert("ssn".to_string(), Value::Text("123-45-6789".into()));

        let cert = Certificate::for_record("Acme", "op@acme.io", "42", "users", &row);
        let rendered = serde_json::to_string(&cert).unwrap();
        assert!(!rendered.contains("alice@example.com"));
        assert!(!rendered.contains("123-45-6789"));
        assert_eq!(cert.masked_snapshot["email"], "al********");
    }

    #[test]
    fn archive_name_is_deterministic() {
        let token = "0a1b2c3d-0000-4000-8000-000000000000";
        assert_eq!(archive_filename(token), "erasure_report_0a1b2c3d.zip");
        assert_eq!(archive_filename(token), archive_filename(token));
    }

    #[test]
    fn archive_holds_one_entry_per_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.zip");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        for id in ["7", "9"] {
            let mut row = RowData::new();
            row.insert("name".to_string(), Value::Text("Some Person".into()));
            let cert = Certificate::for_record("Acme", "op@acme.io", id, "users", &row);
            writer.append_certificate(&cert).unwrap();
        }
        assert_eq!(writer.entries(), 2);
        let path = writer.finish().unwrap();

        let archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let names: Vec<_> = archive.file_names().collect();
        assert!(names.contains(&"certificate_7.json"));
        assert!(names.contains(&"certificate_9.json"));
    }
}
