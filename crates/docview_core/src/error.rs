//! Error types for docview core.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in view indexing and querying.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The view does not exist or has been deleted.
    #[error("view not found: {name}")]
    ViewNotFound {
        /// Name of the view.
        name: String,
    },

    /// The view has no map function registered.
    #[error("view {view} has no map function")]
    MapFunctionMissing {
        /// Name of the view.
        view: String,
    },

    /// Reduce was requested on a view without a reduce function.
    #[error("view {view} has no reduce function")]
    ReduceFunctionMissing {
        /// Name of the view.
        view: String,
    },

    /// The query options are contradictory.
    #[error("invalid query options: {message}")]
    InvalidOptions {
        /// Description of the problem.
        message: String,
    },

    /// A view compiler rejected the function source.
    #[error("failed to compile view {view}: {message}")]
    CompileFailed {
        /// Name of the view.
        view: String,
        /// Description of the failure.
        message: String,
    },

    /// Storage collaborator error.
    #[error("storage error: {0}")]
    Storage(#[from] docview_storage::StorageError),

    /// Key or value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] docview_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A map function failed on one document.
    ///
    /// Only logged; the update pass continues with the next document.
    #[error("map function of view {view} failed on {doc_id}: {message}")]
    MapFunction {
        /// Name of the view.
        view: String,
        /// Document the function was applied to.
        doc_id: String,
        /// Failure message.
        message: String,
    },

    /// The operation was cancelled before it finished.
    #[error("operation cancelled")]
    Cancelled,

    /// The live query was stopped while a caller waited for rows.
    #[error("live query stopped")]
    LiveQueryStopped,

    /// A background query failed; the error is shared with every observer.
    #[error("query failed: {0}")]
    QueryFailed(Arc<CoreError>),
}

impl CoreError {
    /// Creates a view not found error.
    pub fn view_not_found(name: impl Into<String>) -> Self {
        Self::ViewNotFound { name: name.into() }
    }

    /// Creates an invalid options error.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Creates a compile failure error.
    pub fn compile_failed(view: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CompileFailed {
            view: view.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors caused by how a view or query is set up.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::ViewNotFound { .. }
            | Self::MapFunctionMissing { .. }
            | Self::ReduceFunctionMissing { .. }
            | Self::InvalidOptions { .. }
            | Self::CompileFailed { .. } => true,
            Self::QueryFailed(inner) => inner.is_configuration(),
            _ => false,
        }
    }

    /// Returns true if running the operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::QueryFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(CoreError::view_not_found("v").is_configuration());
        assert!(CoreError::invalid_options("x").is_configuration());
        assert!(!CoreError::Cancelled.is_configuration());
        assert!(CoreError::Cancelled.is_retryable());
        assert!(CoreError::QueryFailed(Arc::new(CoreError::Cancelled)).is_retryable());
        assert!(!CoreError::LiveQueryStopped.is_retryable());
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError =
            docview_storage::StorageError::DocumentNotFound("doc".into()).into();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(err.to_string(), "storage error: document not found: doc");
    }
}
