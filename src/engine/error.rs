// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the erasure engine
//!
//! Driver-level and store-level failures are mapped to these unified error
//! types so callers see consistent error handling across the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all engine operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Introspection error: {message}")]
    IntrospectionError { message: String },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Job not found")]
    JobNotFound,

    #[error("Archive not ready")]
    ArchiveNotReady,

    #[error("Archive error: {message}")]
    ArchiveError { message: String },

    #[error("Audit store error: {message}")]
    AuditError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: msg.into() }
    }

    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::IntrospectionError { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn transaction_error(msg: impl Into<String>) -> Self {
        Self::TransactionError { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::ArchiveError { message: msg.into() }
    }

    pub fn audit(msg: impl Into<String>) -> Self {
        Self::AuditError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Maps a driver error raised while opening a target connection,
    /// distinguishing authentication failures from plain connectivity
    /// problems.
    pub fn from_connect(err: sqlx::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("password authentication failed") {
            Self::auth_failed(msg)
        } else {
            Self::connection_failed(msg)
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
