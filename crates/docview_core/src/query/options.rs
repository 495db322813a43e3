//! Query parameters.

use crate::query::QueryRow;
use docview_codec::Value;
use std::fmt;
use std::sync::Arc;

/// How a query treats an index that is behind the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexUpdateMode {
    /// Bring the index up to date before scanning.
    #[default]
    Before,
    /// Scan the index as it is.
    Never,
    /// Scan the index as it is, then update it in the background.
    After,
}

/// Predicate applied to each row before `skip` and `limit`.
pub type PostFilter = Arc<dyn Fn(&QueryRow) -> bool + Send + Sync>;

/// Options controlling a query.
///
/// Built with chained setters:
///
/// ```
/// use docview_core::QueryOptions;
/// use serde_json::json;
///
/// let options = QueryOptions::new()
///     .start_key(json!("a"))
///     .end_key(json!("m"))
///     .inclusive_end(false)
///     .limit(10);
/// assert_eq!(options.limit, 10);
/// ```
#[derive(Clone)]
pub struct QueryOptions {
    /// First key to return. `None` starts at the beginning.
    pub start_key: Option<Value>,
    /// Last key to return. `None` runs to the end.
    pub end_key: Option<Value>,
    /// Among rows whose key equals `start_key`, the first document ID to return.
    pub start_key_doc_id: Option<String>,
    /// Among rows whose key equals `end_key`, the last document ID to return.
    pub end_key_doc_id: Option<String>,
    /// Exact keys to look up, in this order. Overrides the key range and
    /// `descending`.
    pub keys: Option<Vec<Value>>,
    /// Rows to skip.
    pub skip: usize,
    /// Maximum number of rows.
    pub limit: usize,
    /// Return rows in descending key order.
    pub descending: bool,
    /// Whether rows equal to `start_key` are returned.
    pub inclusive_start: bool,
    /// Whether rows equal to `end_key` are returned.
    pub inclusive_end: bool,
    /// Whether to reduce. `None` reduces exactly when the view has a reduce
    /// function.
    pub reduce: Option<bool>,
    /// Group rows by their full key.
    pub group: bool,
    /// Group array keys by their first `group_level` elements.
    pub group_level: usize,
    /// Extends `end_key` to every key it is a prefix of, at this depth.
    pub prefix_match_level: usize,
    /// Attach document bodies to rows.
    pub include_docs: bool,
    /// Staleness mode.
    pub index_update_mode: IndexUpdateMode,
    /// Row predicate.
    pub post_filter: Option<PostFilter>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            start_key: None,
            end_key: None,
            start_key_doc_id: None,
            end_key_doc_id: None,
            keys: None,
            skip: 0,
            limit: usize::MAX,
            descending: false,
            inclusive_start: true,
            inclusive_end: true,
            reduce: None,
            group: false,
            group_level: 0,
            prefix_match_level: 0,
            include_docs: false,
            index_update_mode: IndexUpdateMode::Before,
            post_filter: None,
        }
    }
}

impl QueryOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start key.
    #[must_use]
    pub fn start_key(mut self, key: impl Into<Value>) -> Self {
        self.start_key = Some(key.into());
        self
    }

    /// Sets the end key.
    #[must_use]
    pub fn end_key(mut self, key: impl Into<Value>) -> Self {
        self.end_key = Some(key.into());
        self
    }

    /// Sets the start key document ID.
    #[must_use]
    pub fn start_key_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.start_key_doc_id = Some(doc_id.into());
        self
    }

    /// Sets the end key document ID.
    #[must_use]
    pub fn end_key_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.end_key_doc_id = Some(doc_id.into());
        self
    }

    /// Sets the exact keys to look up.
    #[must_use]
    pub fn keys(mut self, keys: Vec<Value>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Sets the number of rows to skip.
    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets descending order.
    #[must_use]
    pub const fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    /// Sets whether the start key is inclusive.
    #[must_use]
    pub const fn inclusive_start(mut self, inclusive: bool) -> Self {
        self.inclusive_start = inclusive;
        self
    }

    /// Sets whether the end key is inclusive.
    #[must_use]
    pub const fn inclusive_end(mut self, inclusive: bool) -> Self {
        self.inclusive_end = inclusive;
        self
    }

    /// Forces reduce on or off.
    #[must_use]
    pub const fn reduce(mut self, reduce: bool) -> Self {
        self.reduce = Some(reduce);
        self
    }

    /// Sets full-key grouping.
    #[must_use]
    pub const fn group(mut self, group: bool) -> Self {
        self.group = group;
        self
    }

    /// Sets the group level.
    #[must_use]
    pub const fn group_level(mut self, level: usize) -> Self {
        self.group_level = level;
        self
    }

    /// Sets the prefix match level.
    #[must_use]
    pub const fn prefix_match_level(mut self, level: usize) -> Self {
        self.prefix_match_level = level;
        self
    }

    /// Sets whether document bodies are attached.
    #[must_use]
    pub const fn include_docs(mut self, include: bool) -> Self {
        self.include_docs = include;
        self
    }

    /// Sets the staleness mode.
    #[must_use]
    pub const fn index_update_mode(mut self, mode: IndexUpdateMode) -> Self {
        self.index_update_mode = mode;
        self
    }

    /// Sets a row predicate.
    #[must_use]
    pub fn post_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&QueryRow) -> bool + Send + Sync + 'static,
    {
        self.post_filter = Some(Arc::new(filter));
        self
    }

    /// Returns true if rows are grouped.
    pub fn is_grouped(&self) -> bool {
        self.group || self.group_level > 0
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("start_key", &self.start_key)
            .field("end_key", &self.end_key)
            .field("start_key_doc_id", &self.start_key_doc_id)
            .field("end_key_doc_id", &self.end_key_doc_id)
            .field("keys", &self.keys)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("descending", &self.descending)
            .field("inclusive_start", &self.inclusive_start)
            .field("inclusive_end", &self.inclusive_end)
            .field("reduce", &self.reduce)
            .field("group", &self.group)
            .field("group_level", &self.group_level)
            .field("prefix_match_level", &self.prefix_match_level)
            .field("include_docs", &self.include_docs)
            .field("index_update_mode", &self.index_update_mode)
            .field("post_filter", &self.post_filter.is_some())
            .finish()
    }
}
