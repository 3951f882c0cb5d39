//! Universal data types for the erasure engine
//!
//! These types provide a normalized representation of the caller-supplied
//! target database and of the values read back from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::observability::Sensitive;
use crate::redact::RedactionRule;

/// Connection details for a caller-supplied target database.
///
/// Ephemeral by design: descriptors are supplied per request, held only for
/// the lifetime of the operation they serve, and never persisted. The
/// password never appears in Debug/Serialize output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Sensitive<String>,
    /// Negotiate TLS with certificate verification.
    #[serde(default = "default_true")]
    pub tls: bool,
    /// Accept self-signed/untrusted server certificates. Off by default;
    /// turning it on is logged as a warning when the connection opens.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_true() -> bool {
    true
}

impl ConnectionDescriptor {
    /// Display label safe for logs: no credentials.
    pub fn display_name(&self) -> String {
        format!("{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}

/// Universal value representation for rows read from a target database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(serde_json::Value),
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl Value {
    /// Renders the value as text the way the wire surfaces it: dates are
    /// already ISO-8601 text by the time they reach a `Value`, bytes are
    /// base64, JSON is compact.
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => {
                use base64::{engine::general_purpose::STANDARD, Engine};
                STANDARD.encode(b)
            }
            Value::Json(j) => j.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A single row keyed by column name.
pub type RowData = HashMap<String, Value>;

/// Column metadata as reported by target introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub table: String,
    pub name: String,
    pub data_type: String,
}

impl ColumnMeta {
    /// Textual columns are the only ones the engine will hash or sample.
    pub fn is_textual(&self) -> bool {
        matches!(self.data_type.as_str(), "text" | "character varying")
    }
}

/// The account on whose behalf an operation runs.
///
/// Identity resolution (tokens, sessions) happens outside this crate; by the
/// time a call reaches the engine the tenant is already authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub organization: String,
    pub operator: String,
}

/// Everything needed to run one erasure job against a target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureRequest {
    pub connection: ConnectionDescriptor,
    pub target_table: String,
    pub target_id_col: String,
    pub target_ids: Vec<String>,
    pub rules: Vec<RedactionRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_serializes_without_password() {
        let desc = ConnectionDescriptor {
            host: "db.example.com".into(),
            port: 5432,
            database: "crm".into(),
            username: "readonly".into(),
            password: Sensitive::new("hunter2".into()),
            tls: true,
            accept_invalid_certs: false,
        };

        let json = serde_json::to_string(&desc).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{:?}", desc).contains("hunter2"));
    }

    #[test]
    fn value_as_text_matches_wire_shape() {
        assert_eq!(Value::Int(42).as_text(), "42");
        assert_eq!(Value::Text("a@b.c".into()).as_text(), "a@b.c");
        assert_eq!(Value::Null.as_text(), "");
        assert_eq!(Value::Bool(true).as_text(), "true");
    }

    #[test]
    fn textual_column_detection() {
        let col = ColumnMeta {
            table: "users".into(),
            name: "full_name".into(),
            data_type: "character varying".into(),
        };
        assert!(col.is_textual());

        let col = ColumnMeta {
            table: "users".into(),
            name: "age".into(),
            data_type: "integer".into(),
        };
        assert!(!col.is_textual());
    }
}
