//! Query result snapshots.

use crate::query::QueryRow;
use docview_storage::ViewStorage;
use std::fmt;
use std::sync::Arc;

/// The rows of one query run, plus the store sequence they reflect.
///
/// An enumerator is a finite, resettable iterator with random access. Two
/// enumerators are equal when their rows are equal, whatever sequence they
/// were taken at.
#[derive(Clone)]
pub struct QueryEnumerator {
    rows: Vec<QueryRow>,
    position: usize,
    sequence: u64,
    source: Arc<dyn ViewStorage>,
}

impl QueryEnumerator {
    pub(crate) fn new(rows: Vec<QueryRow>, sequence: u64, source: Arc<dyn ViewStorage>) -> Self {
        Self {
            rows,
            position: 0,
            sequence,
            source,
        }
    }

    /// Returns the total number of rows, regardless of position.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the query matched nothing.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row at `index`.
    pub fn get(&self, index: usize) -> Option<&QueryRow> {
        self.rows.get(index)
    }

    /// Returns all rows.
    pub fn rows(&self) -> &[QueryRow] {
        &self.rows
    }

    /// Rewinds iteration to the first row.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Returns the store sequence captured when the query ran.
    pub fn sequence_number(&self) -> u64 {
        self.sequence
    }

    /// Returns true if documents changed since the query ran.
    ///
    /// A store that cannot report its sequence is treated as changed.
    pub fn is_stale(&self) -> bool {
        self.source
            .current_max_sequence()
            .map_or(true, |current| current > self.sequence)
    }

    /// Consumes the enumerator, returning its rows.
    pub fn into_rows(self) -> Vec<QueryRow> {
        self.rows
    }
}

impl Iterator for QueryEnumerator {
    type Item = QueryRow;

    fn next(&mut self) -> Option<QueryRow> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl PartialEq for QueryEnumerator {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl fmt::Debug for QueryEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEnumerator")
            .field("rows", &self.rows)
            .field("position", &self.position)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_storage::MemoryStore;
    use serde_json::json;

    fn rows() -> Vec<QueryRow> {
        vec![
            QueryRow::reduced(json!("a"), json!(1)),
            QueryRow::reduced(json!("b"), json!(2)),
        ]
    }

    #[test]
    fn iterate_and_reset() {
        let store: Arc<dyn ViewStorage> = Arc::new(MemoryStore::new());
        let mut e = QueryEnumerator::new(rows(), 0, store);
        assert_eq!(e.len(), 2);
        assert_eq!(e.next().map(|r| r.key), Some(json!("a")));
        assert_eq!(e.size_hint(), (1, Some(1)));
        assert_eq!(e.next().map(|r| r.key), Some(json!("b")));
        assert!(e.next().is_none());
        assert_eq!(e.len(), 2);

        e.reset();
        assert_eq!(e.by_ref().count(), 2);
        assert_eq!(e.get(1).map(|r| &r.value), Some(&json!(2)));
    }

    #[test]
    fn equality_ignores_sequence() {
        let store: Arc<dyn ViewStorage> = Arc::new(MemoryStore::new());
        let a = QueryEnumerator::new(rows(), 1, Arc::clone(&store));
        let b = QueryEnumerator::new(rows(), 9, Arc::clone(&store));
        let c = QueryEnumerator::new(Vec::new(), 1, store);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn staleness_tracks_store() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn ViewStorage> = memory.clone();
        let e = QueryEnumerator::new(Vec::new(), 0, store);
        assert!(!e.is_stale());
        memory.put("d", json!({})).unwrap();
        assert!(e.is_stale());
    }
}
