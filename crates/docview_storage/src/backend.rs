//! Collaborator interfaces used by the view engine.
//!
//! The view engine does not own documents or index rows. It talks to three
//! collaborators:
//!
//! - [`DocumentChangeSource`] reports what changed since a sequence.
//! - [`IndexStore`] persists rows and per-view metadata.
//! - [`DocumentResolver`] loads document bodies by ID.
//!
//! [`ViewStorage`] bundles all three for implementors that provide them
//! together, such as [`crate::MemoryStore`].

use crate::change_feed::ChangeFeed;
use crate::error::StorageResult;
use crate::key_range::KeyRange;
use crate::types::{
    ChangeSnapshot, DocumentChange, IndexRow, ResolvedDocument, ScanDirection, SequenceFilter,
    TransactionSummary, ViewId, ViewMetadata,
};
use docview_codec::Collation;

/// An ordered cursor over index rows.
///
/// Errors are yielded in-band so a failing store can abort a scan midway.
pub type RowCursor = Box<dyn Iterator<Item = StorageResult<IndexRow>> + Send>;

/// Source of document changes.
pub trait DocumentChangeSource: Send + Sync {
    /// Returns the sequence of the most recent document write.
    fn current_max_sequence(&self) -> StorageResult<u64>;

    /// Returns the winning revision of every document changed after `since`.
    ///
    /// Entries are ordered by document ID. Tombstones are included with
    /// `deleted` set. Design documents are not filtered out.
    fn changed_documents_since(&self, since: u64) -> StorageResult<Vec<DocumentChange>>;

    /// Returns the sequences whose index rows became obsolete after `since`.
    ///
    /// A sequence is obsolete when it was a document's current revision at
    /// `since` and a newer revision of that document has been written.
    fn superseded_sequences(&self, since: u64) -> StorageResult<Vec<u64>>;

    /// Reads the maximum sequence, the changes and the superseded sequences
    /// after `since` together.
    ///
    /// The default calls the three methods in turn. Stores that accept writes
    /// while an index update runs should override it to read all three from
    /// one consistent state.
    fn snapshot_since(&self, since: u64) -> StorageResult<ChangeSnapshot> {
        let max_sequence = self.current_max_sequence()?;
        let superseded = self.superseded_sequences(since)?;
        let changes = self.changed_documents_since(since)?;
        Ok(ChangeSnapshot {
            max_sequence,
            changes,
            superseded,
        })
    }
}

/// Persistent ordered storage of index rows and view metadata.
///
/// # Invariants
///
/// - Scans yield rows ordered by key under the view's collation, then by
///   document ID, then by sequence.
/// - Only one [`IndexTransaction`] is open at a time; `begin_update` blocks
///   until the previous one finishes.
/// - Changes made through a transaction are invisible until `commit` and
///   discarded if the transaction is dropped.
pub trait IndexStore: Send + Sync {
    /// Returns the ID of the named view, creating it if needed.
    fn create_view(&self, name: &str, collation: Collation) -> StorageResult<ViewId>;

    /// Looks up a view by name.
    fn view_id(&self, name: &str) -> StorageResult<Option<ViewId>>;

    /// Returns the names of all views.
    fn view_names(&self) -> StorageResult<Vec<String>>;

    /// Returns a view's persisted metadata.
    fn view_metadata(&self, view: ViewId) -> StorageResult<ViewMetadata>;

    /// Records a new map/reduce version tag.
    ///
    /// When the tag differs from the stored one the watermark is reset to
    /// zero and `true` is returned.
    fn set_version(&self, view: ViewId, version: &str) -> StorageResult<bool>;

    /// Changes the collation rows are ordered by, re-sorting existing rows.
    fn set_collation(&self, view: ViewId, collation: Collation) -> StorageResult<()>;

    /// Removes a view and all of its rows.
    fn delete_view(&self, view: ViewId) -> StorageResult<()>;

    /// Returns the view's watermark.
    fn watermark(&self, view: ViewId) -> StorageResult<u64> {
        Ok(self.view_metadata(view)?.last_sequence)
    }

    /// Opens the single-writer transaction used to update a view's rows.
    fn begin_update(&self, view: ViewId) -> StorageResult<Box<dyn IndexTransaction + '_>>;

    /// Scans rows within `range` in the given direction.
    fn scan(&self, view: ViewId, range: &KeyRange, direction: ScanDirection)
        -> StorageResult<RowCursor>;

    /// Returns the number of rows in the view.
    fn row_count(&self, view: ViewId) -> StorageResult<u64>;

    /// Returns the feed of committed document changes.
    fn change_feed(&self) -> &ChangeFeed;
}

/// An open index update.
///
/// Operations are buffered and applied atomically by [`commit`](Self::commit).
pub trait IndexTransaction {
    /// Deletes rows selected by `filter`.
    fn delete_rows(&mut self, filter: SequenceFilter) -> StorageResult<()>;

    /// Inserts a row.
    fn insert_row(&mut self, row: IndexRow) -> StorageResult<()>;

    /// Sets the watermark.
    fn set_watermark(&mut self, sequence: u64) -> StorageResult<()>;

    /// Applies all buffered operations.
    fn commit(self: Box<Self>) -> StorageResult<TransactionSummary>;
}

/// Loads document bodies.
pub trait DocumentResolver: Send + Sync {
    /// Returns a document's body.
    ///
    /// With `rev_id` of `None` the current revision is returned, or `None`
    /// when the document is missing or deleted.
    fn document(&self, doc_id: &str, rev_id: Option<&str>)
        -> StorageResult<Option<ResolvedDocument>>;
}

/// Everything the view engine needs from storage.
pub trait ViewStorage: DocumentChangeSource + IndexStore + DocumentResolver {}

impl<T> ViewStorage for T where T: DocumentChangeSource + IndexStore + DocumentResolver {}
