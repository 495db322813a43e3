//! In-memory storage for testing and ephemeral databases.

use crate::backend::{DocumentChangeSource, DocumentResolver, IndexStore, IndexTransaction, RowCursor};
use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::error::{StorageError, StorageResult};
use crate::key_range::KeyRange;
use crate::types::{
    ChangeSnapshot, DocumentChange, IndexRow, ResolvedDocument, Revision, ScanDirection, SequenceFilter,
    TransactionSummary, ViewId, ViewMetadata,
};
use docview_codec::{Collation, Value};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{self, AtomicU32, AtomicU64};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredRevision {
    rev_id: String,
    sequence: u64,
    deleted: bool,
    properties: Option<Value>,
}

#[derive(Debug, Default)]
struct Documents {
    /// Revision history per document, oldest first.
    by_id: BTreeMap<String, Vec<StoredRevision>>,
    last_sequence: u64,
}

impl Documents {
    fn changed_since(&self, since: u64) -> Vec<DocumentChange> {
        self.by_id
            .iter()
            .filter_map(|(doc_id, revs)| {
                let current = revs.last()?;
                (current.sequence > since).then(|| DocumentChange {
                    doc_id: doc_id.clone(),
                    sequence: current.sequence,
                    rev_id: current.rev_id.clone(),
                    deleted: current.deleted,
                    properties: current.properties.clone(),
                })
            })
            .collect()
    }

    fn superseded_since(&self, since: u64) -> Vec<u64> {
        let mut sequences: Vec<u64> = self
            .by_id
            .values()
            .filter(|revs| revs.last().is_some_and(|rev| rev.sequence > since))
            .filter_map(|revs| {
                revs.iter()
                    .rev()
                    .find(|rev| rev.sequence <= since)
                    .map(|rev| rev.sequence)
            })
            .collect();
        sequences.sort_unstable();
        sequences
    }
}

#[derive(Debug)]
struct ViewState {
    meta: ViewMetadata,
    rows: Vec<IndexRow>,
}

impl ViewState {
    fn insert_sorted(&mut self, row: IndexRow) {
        let collation = self.meta.collation;
        let pos = self
            .rows
            .partition_point(|existing| row_order(collation, existing, &row) != Ordering::Greater);
        self.rows.insert(pos, row);
    }
}

fn row_order(collation: Collation, a: &IndexRow, b: &IndexRow) -> Ordering {
    collation
        .compare(&a.key, &b.key)
        .then_with(|| a.doc_id.cmp(&b.doc_id))
        .then(a.sequence.cmp(&b.sequence))
}

/// An in-memory document store and index store.
///
/// Documents keep a linear revision history: every write creates a new
/// revision with the next sequence number and supersedes the previous one.
/// Index updates are serialized by a single writer lock.
///
/// # Example
///
/// ```rust
/// use docview_storage::{DocumentChangeSource, MemoryStore};
/// use serde_json::json;
///
/// let store = MemoryStore::new();
/// let rev = store.put("doc1", json!({"n": 1})).unwrap();
/// assert_eq!(rev.sequence, 1);
/// assert_eq!(store.current_max_sequence().unwrap(), 1);
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    docs: RwLock<Documents>,
    views: RwLock<BTreeMap<ViewId, ViewState>>,
    next_view_id: AtomicU32,
    write_lock: Mutex<()>,
    writes: AtomicU64,
    feed: ChangeFeed,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Documents::default()),
            views: RwLock::new(BTreeMap::new()),
            next_view_id: AtomicU32::new(1),
            write_lock: Mutex::new(()),
            writes: AtomicU64::new(0),
            feed: ChangeFeed::new(),
        }
    }

    /// Writes a new revision of a document, creating it if needed.
    pub fn put(&self, doc_id: &str, properties: Value) -> StorageResult<Revision> {
        self.write_revision(doc_id, None, Some(properties))
    }

    /// Writes a new revision only if `expected_rev` is still current.
    pub fn update(
        &self,
        doc_id: &str,
        expected_rev: &str,
        properties: Value,
    ) -> StorageResult<Revision> {
        self.write_revision(doc_id, Some(expected_rev), Some(properties))
    }

    /// Deletes a document by writing a tombstone revision.
    pub fn delete(&self, doc_id: &str) -> StorageResult<Revision> {
        self.write_revision(doc_id, None, None)
    }

    /// Returns the current body of a live document.
    pub fn get(&self, doc_id: &str) -> Option<Value> {
        let docs = self.docs.read();
        let current = docs.by_id.get(doc_id)?.last()?;
        if current.deleted {
            return None;
        }
        current.properties.clone()
    }

    /// Returns the number of live documents.
    pub fn document_count(&self) -> usize {
        self.docs
            .read()
            .by_id
            .values()
            .filter(|revs| revs.last().is_some_and(|rev| !rev.deleted))
            .count()
    }

    /// Returns the number of index operations committed so far.
    ///
    /// Each deleted or inserted row and each watermark change counts once.
    pub fn write_count(&self) -> u64 {
        self.writes.load(atomic::Ordering::SeqCst)
    }

    fn write_revision(
        &self,
        doc_id: &str,
        expected_rev: Option<&str>,
        properties: Option<Value>,
    ) -> StorageResult<Revision> {
        let (revision, deleted) = {
            let mut docs = self.docs.write();
            let (generation, current_rev, current_deleted) = match docs.by_id.get(doc_id) {
                Some(revs) => match revs.last() {
                    Some(last) => (revs.len() + 1, Some(last.rev_id.clone()), last.deleted),
                    None => (1, None, true),
                },
                None => (1, None, true),
            };

            if let Some(expected) = expected_rev {
                match &current_rev {
                    Some(current) if current == expected => {}
                    Some(current) => {
                        return Err(StorageError::Conflict {
                            doc_id: doc_id.to_string(),
                            expected: expected.to_string(),
                            current: current.clone(),
                        })
                    }
                    None => return Err(StorageError::DocumentNotFound(doc_id.to_string())),
                }
            }
            if properties.is_none() && current_deleted {
                return Err(StorageError::DocumentNotFound(doc_id.to_string()));
            }

            docs.last_sequence += 1;
            let sequence = docs.last_sequence;
            let rev_id = format!("{generation}-{}", Uuid::new_v4().simple());
            let deleted = properties.is_none();
            docs.by_id
                .entry(doc_id.to_string())
                .or_default()
                .push(StoredRevision {
                    rev_id: rev_id.clone(),
                    sequence,
                    deleted,
                    properties,
                });
            let revision = Revision {
                doc_id: doc_id.to_string(),
                rev_id,
                sequence,
            };
            (revision, deleted)
        };

        tracing::trace!(doc_id = %revision.doc_id, sequence = revision.sequence, "document written");
        self.feed.emit(ChangeEvent {
            sequence: revision.sequence,
            doc_id: revision.doc_id.clone(),
            rev_id: revision.rev_id.clone(),
            deleted,
        });
        Ok(revision)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentChangeSource for MemoryStore {
    fn current_max_sequence(&self) -> StorageResult<u64> {
        Ok(self.docs.read().last_sequence)
    }

    fn changed_documents_since(&self, since: u64) -> StorageResult<Vec<DocumentChange>> {
        Ok(self.docs.read().changed_since(since))
    }

    fn superseded_sequences(&self, since: u64) -> StorageResult<Vec<u64>> {
        Ok(self.docs.read().superseded_since(since))
    }

    fn snapshot_since(&self, since: u64) -> StorageResult<ChangeSnapshot> {
        let docs = self.docs.read();
        Ok(ChangeSnapshot {
            max_sequence: docs.last_sequence,
            changes: docs.changed_since(since),
            superseded: docs.superseded_since(since),
        })
    }
}

impl DocumentResolver for MemoryStore {
    fn document(
        &self,
        doc_id: &str,
        rev_id: Option<&str>,
    ) -> StorageResult<Option<ResolvedDocument>> {
        let docs = self.docs.read();
        let Some(revs) = docs.by_id.get(doc_id) else {
            return Ok(None);
        };
        let found = match rev_id {
            Some(rev_id) => revs.iter().find(|rev| rev.rev_id == rev_id),
            None => revs.last().filter(|rev| !rev.deleted),
        };
        Ok(found.and_then(|rev| {
            rev.properties.clone().map(|properties| ResolvedDocument {
                doc_id: doc_id.to_string(),
                rev_id: rev.rev_id.clone(),
                sequence: rev.sequence,
                properties,
            })
        }))
    }
}

impl IndexStore for MemoryStore {
    fn create_view(&self, name: &str, collation: Collation) -> StorageResult<ViewId> {
        let mut views = self.views.write();
        if let Some(state) = views.values().find(|state| state.meta.name == name) {
            return Ok(state.meta.id);
        }
        let id = ViewId::new(self.next_view_id.fetch_add(1, atomic::Ordering::SeqCst));
        views.insert(
            id,
            ViewState {
                meta: ViewMetadata {
                    id,
                    name: name.to_string(),
                    version: None,
                    last_sequence: 0,
                    collation,
                },
                rows: Vec::new(),
            },
        );
        Ok(id)
    }

    fn view_id(&self, name: &str) -> StorageResult<Option<ViewId>> {
        Ok(self
            .views
            .read()
            .values()
            .find(|state| state.meta.name == name)
            .map(|state| state.meta.id))
    }

    fn view_names(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .views
            .read()
            .values()
            .map(|state| state.meta.name.clone())
            .collect())
    }

    fn view_metadata(&self, view: ViewId) -> StorageResult<ViewMetadata> {
        self.views
            .read()
            .get(&view)
            .map(|state| state.meta.clone())
            .ok_or(StorageError::ViewNotFound(view))
    }

    fn set_version(&self, view: ViewId, version: &str) -> StorageResult<bool> {
        let _writer = self.write_lock.lock();
        let mut views = self.views.write();
        let state = views.get_mut(&view).ok_or(StorageError::ViewNotFound(view))?;
        if state.meta.version.as_deref() == Some(version) {
            return Ok(false);
        }
        state.meta.version = Some(version.to_string());
        state.meta.last_sequence = 0;
        Ok(true)
    }

    fn set_collation(&self, view: ViewId, collation: Collation) -> StorageResult<()> {
        let _writer = self.write_lock.lock();
        let mut views = self.views.write();
        let state = views.get_mut(&view).ok_or(StorageError::ViewNotFound(view))?;
        if state.meta.collation != collation {
            state.meta.collation = collation;
            state.rows.sort_by(|a, b| row_order(collation, a, b));
        }
        Ok(())
    }

    fn delete_view(&self, view: ViewId) -> StorageResult<()> {
        let _writer = self.write_lock.lock();
        self.views
            .write()
            .remove(&view)
            .map(|_| ())
            .ok_or(StorageError::ViewNotFound(view))
    }

    fn begin_update(&self, view: ViewId) -> StorageResult<Box<dyn IndexTransaction + '_>> {
        let guard = self.write_lock.lock();
        if !self.views.read().contains_key(&view) {
            return Err(StorageError::ViewNotFound(view));
        }
        Ok(Box::new(MemoryTransaction {
            store: self,
            view,
            ops: Vec::new(),
            _guard: guard,
        }))
    }

    fn scan(
        &self,
        view: ViewId,
        range: &KeyRange,
        direction: ScanDirection,
    ) -> StorageResult<RowCursor> {
        let views = self.views.read();
        let state = views.get(&view).ok_or(StorageError::ViewNotFound(view))?;
        let mut rows: Vec<IndexRow> = if range.is_empty() {
            Vec::new()
        } else {
            state
                .rows
                .iter()
                .filter(|row| range.contains(&row.key, &row.doc_id))
                .cloned()
                .collect()
        };
        if direction == ScanDirection::Reverse {
            rows.reverse();
        }
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn row_count(&self, view: ViewId) -> StorageResult<u64> {
        self.views
            .read()
            .get(&view)
            .map(|state| state.rows.len() as u64)
            .ok_or(StorageError::ViewNotFound(view))
    }

    fn change_feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

enum PendingOp {
    Delete(SequenceFilter),
    Insert(IndexRow),
    Watermark(u64),
}

/// Buffered index update holding the store's writer lock.
struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    view: ViewId,
    ops: Vec<PendingOp>,
    _guard: MutexGuard<'a, ()>,
}

impl IndexTransaction for MemoryTransaction<'_> {
    fn delete_rows(&mut self, filter: SequenceFilter) -> StorageResult<()> {
        self.ops.push(PendingOp::Delete(filter));
        Ok(())
    }

    fn insert_row(&mut self, row: IndexRow) -> StorageResult<()> {
        self.ops.push(PendingOp::Insert(row));
        Ok(())
    }

    fn set_watermark(&mut self, sequence: u64) -> StorageResult<()> {
        self.ops.push(PendingOp::Watermark(sequence));
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<TransactionSummary> {
        let mut views = self.store.views.write();
        let state = views
            .get_mut(&self.view)
            .ok_or(StorageError::ViewNotFound(self.view))?;

        let mut summary = TransactionSummary::default();
        let mut writes = 0u64;
        for op in self.ops {
            match op {
                PendingOp::Delete(filter) => {
                    let before = state.rows.len();
                    state.rows.retain(|row| !filter.matches(row.sequence));
                    let removed = (before - state.rows.len()) as u64;
                    summary.rows_deleted += removed;
                    writes += removed;
                }
                PendingOp::Insert(row) => {
                    state.insert_sorted(row);
                    summary.rows_inserted += 1;
                    writes += 1;
                }
                PendingOp::Watermark(sequence) => {
                    state.meta.last_sequence = sequence;
                    writes += 1;
                }
            }
        }
        self.store.writes.fetch_add(writes, atomic::Ordering::SeqCst);
        Ok(summary)
    }
}
