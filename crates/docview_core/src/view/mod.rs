//! Views: named map/reduce indexes over the document store.
//!
//! A [`View`] binds a map function (and optionally a reduce function) to a
//! persistent index kept by the storage collaborator. Functions are code and
//! are never persisted; they must be registered again with
//! [`View::set_map_reduce`] after the process starts. The persisted version
//! tag decides whether the existing index is still valid for them.

mod compiler;
mod emit;
mod registry;
mod updater;

pub use compiler::{ViewCompiler, ViewSource};
pub use emit::{map_fn, reduce_fn, Emitter, FunctionError, MapFunction, ReduceFunction};
pub(crate) use registry::ViewRegistry;

use crate::database::DatabaseInner;
use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::stats::{UpdateStats, ViewStats};
use docview_codec::{decode, Collation, Value};
use docview_storage::{KeyRange, ScanDirection, SequenceFilter, StorageError, ViewId, ViewStorage};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Functions currently bound to a view.
#[derive(Clone, Default)]
pub(crate) struct ViewFunctions {
    pub(crate) map: Option<Arc<dyn MapFunction>>,
    pub(crate) reduce: Option<Arc<dyn ReduceFunction>>,
    pub(crate) version: Option<String>,
}

/// State shared by every handle to the same view.
pub(crate) struct ViewInner {
    name: String,
    id: ViewId,
    functions: RwLock<ViewFunctions>,
    stats: ViewStats,
    deleted: AtomicBool,
}

impl ViewInner {
    pub(crate) fn new(name: impl Into<String>, id: ViewId) -> Self {
        Self {
            name: name.into(),
            id,
            functions: RwLock::new(ViewFunctions::default()),
            stats: ViewStats::new(),
            deleted: AtomicBool::new(false),
        }
    }
}

/// One row of [`View::dump`].
#[derive(Debug, Clone, PartialEq)]
pub struct DumpRow {
    /// Sequence of the revision that emitted the row.
    pub sequence: u64,
    /// ID of the emitting document.
    pub doc_id: String,
    /// Emitted key.
    pub key: Value,
    /// Emitted value.
    pub value: Value,
}

/// Handle to a view.
///
/// Handles are cheap to clone. All handles with the same name share function
/// bindings and statistics.
#[derive(Clone)]
pub struct View {
    pub(crate) inner: Arc<ViewInner>,
    pub(crate) db: Arc<DatabaseInner>,
}

impl View {
    pub(crate) fn new(inner: Arc<ViewInner>, db: Arc<DatabaseInner>) -> Self {
        Self { inner, db }
    }

    /// Returns the view name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the storage ID of the view.
    pub fn id(&self) -> ViewId {
        self.inner.id
    }

    /// Binds map and reduce functions.
    ///
    /// `version` identifies the function code. When it differs from the
    /// version the index was built with, the index is invalidated and the
    /// next update rebuilds it from scratch. Returns whether that happened.
    pub fn set_map_reduce(
        &self,
        map: Arc<dyn MapFunction>,
        reduce: Option<Arc<dyn ReduceFunction>>,
        version: &str,
    ) -> CoreResult<bool> {
        self.ensure_live()?;
        {
            let mut functions = self.inner.functions.write();
            functions.map = Some(map);
            functions.reduce = reduce;
            functions.version = Some(version.to_string());
        }
        let changed = self
            .store()
            .set_version(self.id(), version)
            .map_err(|e| self.storage_err(e))?;
        if changed {
            tracing::info!(view = %self.name(), version, "view version changed; index will be rebuilt");
        }
        Ok(changed)
    }

    /// Binds a map function without a reduce function.
    pub fn set_map(&self, map: Arc<dyn MapFunction>, version: &str) -> CoreResult<bool> {
        self.set_map_reduce(map, None, version)
    }

    /// Returns true if a map function is bound.
    pub fn has_map(&self) -> bool {
        self.inner.functions.read().map.is_some()
    }

    /// Returns true if a reduce function is bound.
    pub fn has_reduce(&self) -> bool {
        self.inner.functions.read().reduce.is_some()
    }

    /// Returns the version tag of the bound functions.
    pub fn version(&self) -> Option<String> {
        self.inner.functions.read().version.clone()
    }

    /// Returns the collation of the view's keys.
    pub fn collation(&self) -> CoreResult<Collation> {
        self.ensure_live()?;
        Ok(self
            .store()
            .view_metadata(self.id())
            .map_err(|e| self.storage_err(e))?
            .collation)
    }

    /// Changes the collation of the view's keys.
    pub fn set_collation(&self, collation: Collation) -> CoreResult<()> {
        self.ensure_live()?;
        self.store()
            .set_collation(self.id(), collation)
            .map_err(|e| self.storage_err(e))
    }

    /// Brings the index up to date with the document store.
    pub fn update_index(&self) -> CoreResult<UpdateStats> {
        updater::update_index(self, None)
    }

    pub(crate) fn update_index_with(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> CoreResult<UpdateStats> {
        updater::update_index(self, cancel)
    }

    /// Removes every row and resets the watermark.
    pub fn delete_index(&self) -> CoreResult<()> {
        self.ensure_live()?;
        let mut txn = self
            .store()
            .begin_update(self.id())
            .map_err(|e| self.storage_err(e))?;
        txn.delete_rows(SequenceFilter::All)?;
        txn.set_watermark(0)?;
        let summary = txn.commit().map_err(|e| self.storage_err(e))?;
        tracing::info!(view = %self.name(), deleted = summary.rows_deleted, "index deleted");
        Ok(())
    }

    /// Deletes the view and its index.
    ///
    /// Afterwards every handle to the view reports
    /// [`CoreError::ViewNotFound`].
    pub fn delete(&self) -> CoreResult<()> {
        self.ensure_live()?;
        self.store()
            .delete_view(self.id())
            .map_err(|e| self.storage_err(e))?;
        self.inner.deleted.store(true, Ordering::SeqCst);
        self.db.views.remove(self.name(), &self.inner);
        tracing::info!(view = %self.name(), "view deleted");
        Ok(())
    }

    /// Returns true if the view was deleted.
    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    /// Returns the number of rows in the index, without updating it.
    pub fn total_rows(&self) -> CoreResult<u64> {
        self.ensure_live()?;
        self.store()
            .row_count(self.id())
            .map_err(|e| self.storage_err(e))
    }

    /// Returns the watermark of the index.
    pub fn last_sequence_indexed(&self) -> CoreResult<u64> {
        self.ensure_live()?;
        self.store()
            .watermark(self.id())
            .map_err(|e| self.storage_err(e))
    }

    /// Returns true if documents changed after the index was last updated.
    pub fn is_stale(&self) -> CoreResult<bool> {
        let indexed = self.last_sequence_indexed()?;
        Ok(indexed < self.store().current_max_sequence()?)
    }

    /// Returns every row of the index in key order.
    pub fn dump(&self) -> CoreResult<Vec<DumpRow>> {
        let collation = self.collation()?;
        let cursor = self
            .store()
            .scan(self.id(), &KeyRange::all(collation), ScanDirection::Forward)
            .map_err(|e| self.storage_err(e))?;
        cursor
            .map(|item| -> CoreResult<DumpRow> {
                let row = item?;
                Ok(DumpRow {
                    key: decode(&row.key)?,
                    value: decode(&row.value)?,
                    sequence: row.sequence,
                    doc_id: row.doc_id,
                })
            })
            .collect()
    }

    /// Creates a query over this view.
    pub fn create_query(&self) -> Query {
        Query::new(self.clone())
    }

    /// Returns the view's cumulative statistics.
    pub fn stats(&self) -> &ViewStats {
        &self.inner.stats
    }

    pub(crate) fn functions(&self) -> ViewFunctions {
        self.inner.functions.read().clone()
    }

    pub(crate) fn store(&self) -> &dyn ViewStorage {
        self.db.store.as_ref()
    }

    pub(crate) fn ensure_live(&self) -> CoreResult<()> {
        if self.is_deleted() {
            return Err(CoreError::view_not_found(self.name()));
        }
        Ok(())
    }

    /// Maps a storage error, naming this view when it has gone missing.
    pub(crate) fn storage_err(&self, err: StorageError) -> CoreError {
        match err {
            StorageError::ViewNotFound(_) => CoreError::view_not_found(self.name()),
            other => CoreError::Storage(other),
        }
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{amount_map, open_db};
    use crate::CoreError;
    use docview_codec::Collation;
    use serde_json::json;

    #[test]
    fn version_change_invalidates_index() {
        let (db, store) = open_db();
        store.put("a", json!({"type": "x", "amount": 1})).unwrap();
        let view = db.view("amounts").unwrap();

        assert!(view.set_map(amount_map(), "1").unwrap());
        view.update_index().unwrap();
        assert_eq!(view.last_sequence_indexed().unwrap(), 1);

        assert!(!view.set_map(amount_map(), "1").unwrap());
        assert_eq!(view.last_sequence_indexed().unwrap(), 1);

        assert!(view.set_map(amount_map(), "2").unwrap());
        assert_eq!(view.last_sequence_indexed().unwrap(), 0);
        assert!(view.is_stale().unwrap());
    }

    #[test]
    fn delete_index_clears_rows() {
        let (db, store) = open_db();
        store.put("a", json!({"type": "x", "amount": 1})).unwrap();
        store.put("b", json!({"type": "y", "amount": 2})).unwrap();
        let view = db.view("amounts").unwrap();
        view.set_map(amount_map(), "1").unwrap();
        view.update_index().unwrap();
        assert_eq!(view.total_rows().unwrap(), 2);

        view.delete_index().unwrap();
        assert_eq!(view.total_rows().unwrap(), 0);
        assert_eq!(view.last_sequence_indexed().unwrap(), 0);

        view.update_index().unwrap();
        assert_eq!(view.total_rows().unwrap(), 2);
    }

    #[test]
    fn deleted_view_reports_not_found() {
        let (db, _store) = open_db();
        let view = db.view("gone").unwrap();
        let other = db.view("gone").unwrap();
        view.set_map(amount_map(), "1").unwrap();
        view.delete().unwrap();

        assert!(other.is_deleted());
        assert!(matches!(other.total_rows(), Err(CoreError::ViewNotFound { .. })));
        assert!(matches!(view.update_index(), Err(CoreError::ViewNotFound { .. })));
        assert!(matches!(view.delete(), Err(CoreError::ViewNotFound { .. })));

        let fresh = db.view("gone").unwrap();
        assert!(!fresh.is_deleted());
        assert!(!fresh.has_map());
    }

    #[test]
    fn dump_lists_rows_in_key_order() {
        let (db, store) = open_db();
        store.put("a", json!({"type": "b", "amount": 1})).unwrap();
        store.put("b", json!({"type": "a", "amount": 2})).unwrap();
        let view = db.view("amounts").unwrap();
        view.set_map(amount_map(), "1").unwrap();
        view.update_index().unwrap();

        let rows = view.dump().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, json!("a"));
        assert_eq!(rows[0].doc_id, "b");
        assert_eq!(rows[0].sequence, 2);
        assert_eq!(rows[1].value, json!(1));
    }

    #[test]
    fn collation_can_be_changed() {
        let (db, _store) = open_db();
        let view = db.view("v").unwrap();
        assert_eq!(view.collation().unwrap(), Collation::Unicode);
        view.set_collation(Collation::Raw).unwrap();
        assert_eq!(view.collation().unwrap(), Collation::Raw);
    }

    #[test]
    fn handles_share_bindings() {
        let (db, _store) = open_db();
        let first = db.view("shared").unwrap();
        first.set_map(amount_map(), "1").unwrap();
        let second = db.view("shared").unwrap();
        assert!(second.has_map());
        assert!(!second.has_reduce());
        assert_eq!(second.version().as_deref(), Some("1"));
    }
}
