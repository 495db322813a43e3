//! Error types for storage operations.

use crate::types::ViewId;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors reported by the storage collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The view does not exist (or was deleted).
    #[error("view not found: {0}")]
    ViewNotFound(ViewId),

    /// The document does not exist or is deleted.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// A document update was based on a stale revision.
    #[error("revision conflict on {doc_id}: expected {expected}, current {current}")]
    Conflict {
        /// The document being updated.
        doc_id: String,
        /// The revision the caller based its update on.
        expected: String,
        /// The current revision.
        current: String,
    },

    /// A fault injected by a test harness.
    #[error("injected fault: {0}")]
    Injected(String),
}
