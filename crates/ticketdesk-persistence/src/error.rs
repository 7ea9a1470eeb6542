//! Error types for persistence operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to read from file system.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to file system.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize data to JSON.
    #[error("failed to serialize: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Failed to create directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Item not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// A document with the same key already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: String, id: String },

    /// Optimistic concurrency check failed.
    #[error("stale write for {id}: expected version {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A blocking file task panicked or was cancelled.
    #[error("file task failed: {0}")]
    TaskFailed(String),
}

impl PersistenceError {
    /// Shorthand for a missing ticket.
    pub fn ticket_not_found(id: impl std::fmt::Display) -> Self {
        PersistenceError::NotFound {
            kind: "ticket".to_string(),
            id: id.to_string(),
        }
    }

    /// Returns true for the optimistic-concurrency failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PersistenceError::Conflict { .. })
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
