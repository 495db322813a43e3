//! Database configuration.

use crate::query::IndexUpdateMode;
use docview_codec::Collation;

/// Configuration for opening a view database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of threads of the background executor.
    pub worker_threads: usize,

    /// Name given to background executor threads.
    pub thread_name: String,

    /// Index update mode of newly created queries.
    pub default_index_update_mode: IndexUpdateMode,

    /// Collation of newly created views.
    pub default_collation: Collation,

    /// Documents whose ID starts with this prefix are never indexed.
    pub design_doc_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            thread_name: "docview-worker".to_string(),
            default_index_update_mode: IndexUpdateMode::Before,
            default_collation: Collation::Unicode,
            design_doc_prefix: "_design/".to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of executor threads.
    #[must_use]
    pub const fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the executor thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the default index update mode.
    #[must_use]
    pub const fn default_index_update_mode(mut self, mode: IndexUpdateMode) -> Self {
        self.default_index_update_mode = mode;
        self
    }

    /// Sets the collation of new views.
    #[must_use]
    pub const fn default_collation(mut self, collation: Collation) -> Self {
        self.default_collation = collation;
        self
    }

    /// Sets the design document prefix.
    #[must_use]
    pub fn design_doc_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.design_doc_prefix = prefix.into();
        self
    }
}
