//! Compiling view functions from source text.

use crate::view::{MapFunction, ReduceFunction};
use std::sync::Arc;

/// Source text of a view's functions, as stored in a design document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSource {
    /// Map function source.
    pub map: String,
    /// Reduce function source, or a built-in name like `_sum`.
    pub reduce: Option<String>,
    /// Language the sources are written in.
    pub language: String,
    /// Explicit version tag. Defaults to one derived from the sources.
    pub version: Option<String>,
}

impl ViewSource {
    /// Creates a source with only a map function.
    pub fn new(map: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            reduce: None,
            language: "javascript".to_string(),
            version: None,
        }
    }

    /// Sets the reduce source.
    #[must_use]
    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }

    /// Sets the language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets an explicit version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns the version tag, deriving one from the sources if unset.
    ///
    /// Any edit to the map or reduce source yields a different tag, which
    /// forces the index to be rebuilt.
    pub fn effective_version(&self) -> String {
        if let Some(version) = &self.version {
            return version.clone();
        }
        match &self.reduce {
            Some(reduce) => format!("{}|{}|{}", self.language, self.map, reduce),
            None => format!("{}|{}", self.language, self.map),
        }
    }
}

/// Turns function source text into callable functions.
///
/// Passed explicitly to [`Database::compile_view`](crate::Database::compile_view).
pub trait ViewCompiler: Send + Sync {
    /// Compiles a map function. Returns `None` if the source is rejected.
    fn compile_map(&self, source: &str, language: &str) -> Option<Arc<dyn MapFunction>>;

    /// Compiles a reduce function. Returns `None` if the source is rejected.
    fn compile_reduce(&self, source: &str, language: &str) -> Option<Arc<dyn ReduceFunction>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tracks_sources() {
        let a = ViewSource::new("emit(doc.a)");
        let b = ViewSource::new("emit(doc.b)");
        let c = ViewSource::new("emit(doc.a)").with_reduce("_sum");
        assert_ne!(a.effective_version(), b.effective_version());
        assert_ne!(a.effective_version(), c.effective_version());
        assert_eq!(a.effective_version(), ViewSource::new("emit(doc.a)").effective_version());
    }

    #[test]
    fn explicit_version_wins() {
        let source = ViewSource::new("emit(doc.a)").with_version("7");
        assert_eq!(source.effective_version(), "7");
        assert_eq!(source.language, "javascript");
    }
}
