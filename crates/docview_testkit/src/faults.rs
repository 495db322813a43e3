//! Fault injection for atomicity tests.
//!
//! [`FaultyStore`] wraps a [`MemoryStore`] and fails chosen index operations
//! with [`StorageError::Injected`], so tests can check that a failed update
//! leaves rows and watermark untouched.

use docview_codec::Collation;
use docview_storage::{
    ChangeFeed, ChangeSnapshot, DocumentChange, DocumentChangeSource, DocumentResolver, IndexRow,
    IndexStore, IndexTransaction, KeyRange, MemoryStore, ResolvedDocument, RowCursor,
    ScanDirection, SequenceFilter, StorageError, StorageResult, TransactionSummary, ViewId,
    ViewMetadata,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A [`MemoryStore`] that fails on request.
///
/// Faults are armed once and disarm themselves when they fire.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_insert_at: AtomicU64,
    inserts: AtomicU64,
    fail_commit: AtomicBool,
    fail_scan: AtomicBool,
    fail_view_delete: AtomicBool,
}

impl FaultyStore {
    /// Creates a store with no faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped store, for writing documents.
    pub fn documents(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fails the `n`th row insert from now (1-based).
    pub fn fail_insert(&self, n: u64) {
        self.inserts.store(0, Ordering::SeqCst);
        self.fail_insert_at.store(n, Ordering::SeqCst);
    }

    /// Fails the next commit.
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    /// Fails the next scan.
    pub fn fail_next_scan(&self) {
        self.fail_scan.store(true, Ordering::SeqCst);
    }

    /// Fails the next view deletion.
    pub fn fail_next_view_delete(&self) {
        self.fail_view_delete.store(true, Ordering::SeqCst);
    }

    fn insert_fault(&self) -> StorageResult<()> {
        let target = self.fail_insert_at.load(Ordering::SeqCst);
        if target == 0 {
            return Ok(());
        }
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == target {
            self.fail_insert_at.store(0, Ordering::SeqCst);
            tracing::debug!(n, "injecting insert failure");
            return Err(StorageError::Injected(format!("insert {n}")));
        }
        Ok(())
    }
}

struct FaultyTransaction<'a> {
    inner: Box<dyn IndexTransaction + 'a>,
    store: &'a FaultyStore,
}

impl IndexTransaction for FaultyTransaction<'_> {
    fn delete_rows(&mut self, filter: SequenceFilter) -> StorageResult<()> {
        self.inner.delete_rows(filter)
    }

    fn insert_row(&mut self, row: IndexRow) -> StorageResult<()> {
        self.store.insert_fault()?;
        self.inner.insert_row(row)
    }

    fn set_watermark(&mut self, sequence: u64) -> StorageResult<()> {
        self.inner.set_watermark(sequence)
    }

    fn commit(self: Box<Self>) -> StorageResult<TransactionSummary> {
        if self.store.fail_commit.swap(false, Ordering::SeqCst) {
            tracing::debug!("injecting commit failure");
            return Err(StorageError::Injected("commit".to_string()));
        }
        self.inner.commit()
    }
}

impl DocumentChangeSource for FaultyStore {
    fn current_max_sequence(&self) -> StorageResult<u64> {
        self.inner.current_max_sequence()
    }

    fn changed_documents_since(&self, since: u64) -> StorageResult<Vec<DocumentChange>> {
        self.inner.changed_documents_since(since)
    }

    fn superseded_sequences(&self, since: u64) -> StorageResult<Vec<u64>> {
        self.inner.superseded_sequences(since)
    }

    fn snapshot_since(&self, since: u64) -> StorageResult<ChangeSnapshot> {
        self.inner.snapshot_since(since)
    }
}

impl IndexStore for FaultyStore {
    fn create_view(&self, name: &str, collation: Collation) -> StorageResult<ViewId> {
        self.inner.create_view(name, collation)
    }

    fn view_id(&self, name: &str) -> StorageResult<Option<ViewId>> {
        self.inner.view_id(name)
    }

    fn view_names(&self) -> StorageResult<Vec<String>> {
        self.inner.view_names()
    }

    fn view_metadata(&self, view: ViewId) -> StorageResult<ViewMetadata> {
        self.inner.view_metadata(view)
    }

    fn set_version(&self, view: ViewId, version: &str) -> StorageResult<bool> {
        self.inner.set_version(view, version)
    }

    fn set_collation(&self, view: ViewId, collation: Collation) -> StorageResult<()> {
        self.inner.set_collation(view, collation)
    }

    fn delete_view(&self, view: ViewId) -> StorageResult<()> {
        if self.fail_view_delete.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Injected("delete view".to_string()));
        }
        self.inner.delete_view(view)
    }

    fn begin_update(&self, view: ViewId) -> StorageResult<Box<dyn IndexTransaction + '_>> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin_update(view)?,
            store: self,
        }))
    }

    fn scan(
        &self,
        view: ViewId,
        range: &KeyRange,
        direction: ScanDirection,
    ) -> StorageResult<RowCursor> {
        if self.fail_scan.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Injected("scan".to_string()));
        }
        self.inner.scan(view, range, direction)
    }

    fn row_count(&self, view: ViewId) -> StorageResult<u64> {
        self.inner.row_count(view)
    }

    fn change_feed(&self) -> &ChangeFeed {
        self.inner.change_feed()
    }
}

impl DocumentResolver for FaultyStore {
    fn document(
        &self,
        doc_id: &str,
        rev_id: Option<&str>,
    ) -> StorageResult<Option<ResolvedDocument>> {
        self.inner.document(doc_id, rev_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_codec::encode;
    use serde_json::json;

    fn row(sequence: u64) -> IndexRow {
        IndexRow {
            sequence,
            doc_id: format!("d{sequence}"),
            key: encode(&json!(sequence)),
            value: encode(&json!(null)),
        }
    }

    #[test]
    fn insert_fault_fires_once() {
        let store = FaultyStore::new();
        let view = store.create_view("v", Collation::Unicode).unwrap();
        store.fail_insert(2);

        let mut txn = store.begin_update(view).unwrap();
        txn.insert_row(row(1)).unwrap();
        assert!(matches!(txn.insert_row(row(2)), Err(StorageError::Injected(_))));
        drop(txn);
        assert_eq!(store.row_count(view).unwrap(), 0);

        let mut txn = store.begin_update(view).unwrap();
        txn.insert_row(row(1)).unwrap();
        txn.insert_row(row(2)).unwrap();
        txn.commit().unwrap();
        assert_eq!(store.row_count(view).unwrap(), 2);
    }

    #[test]
    fn commit_fault_rolls_back() {
        let store = FaultyStore::new();
        let view = store.create_view("v", Collation::Unicode).unwrap();
        store.fail_next_commit();

        let mut txn = store.begin_update(view).unwrap();
        txn.insert_row(row(1)).unwrap();
        txn.set_watermark(1).unwrap();
        assert!(txn.commit().is_err());
        assert_eq!(store.row_count(view).unwrap(), 0);
        assert_eq!(store.watermark(view).unwrap(), 0);
    }
}
