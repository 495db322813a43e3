//! Shared record types exchanged between the core and its collaborators.

use docview_codec::{Collation, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a view's index.
///
/// View IDs are assigned by the index store when the view is first created
/// and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewId(pub u32);

impl ViewId {
    /// Creates a new view ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view:{}", self.0)
    }
}

/// One entry of the document change stream.
///
/// Carries the winning revision of a document whose sequence is newer than
/// the requested starting point.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Document ID.
    pub doc_id: String,
    /// Sequence of this revision.
    pub sequence: u64,
    /// Revision ID.
    pub rev_id: String,
    /// Whether this revision is a deletion tombstone.
    pub deleted: bool,
    /// Revision body, `None` for tombstones.
    pub properties: Option<Value>,
}

/// Changes after a watermark, read from one consistent state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSnapshot {
    /// Sequence of the most recent write included.
    pub max_sequence: u64,
    /// Winning revisions changed after the watermark, ordered by document ID.
    pub changes: Vec<DocumentChange>,
    /// Sequences whose rows are obsolete.
    pub superseded: Vec<u64>,
}

/// A document body resolved by ID.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDocument {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID.
    pub rev_id: String,
    /// Sequence of the revision.
    pub sequence: u64,
    /// Document body.
    pub properties: Value,
}

/// A persisted index row.
///
/// Keys and values are stored in their encoded JSON form; see
/// [`docview_codec::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    /// Sequence of the document revision that emitted the row.
    pub sequence: u64,
    /// ID of the emitting document.
    pub doc_id: String,
    /// Encoded key.
    pub key: Vec<u8>,
    /// Encoded value.
    pub value: Vec<u8>,
}

/// Persisted per-view metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewMetadata {
    /// View ID.
    pub id: ViewId,
    /// Unique view name.
    pub name: String,
    /// Version tag of the map/reduce functions last indexed with.
    pub version: Option<String>,
    /// Watermark: highest sequence reflected in the rows.
    pub last_sequence: u64,
    /// Collation the rows are ordered by.
    pub collation: Collation,
}

/// Selects rows to delete inside an index transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceFilter {
    /// Every row of the view.
    All,
    /// Rows emitted by any of these sequences.
    In(Vec<u64>),
}

impl SequenceFilter {
    /// Returns whether a row with the given sequence is selected.
    pub fn matches(&self, sequence: u64) -> bool {
        match self {
            SequenceFilter::All => true,
            SequenceFilter::In(sequences) => sequences.contains(&sequence),
        }
    }
}

/// Iteration order of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Reverse,
}

/// Counts reported when an index transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionSummary {
    /// Rows removed.
    pub rows_deleted: u64,
    /// Rows added.
    pub rows_inserted: u64,
}

/// A new document revision written to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID.
    pub rev_id: String,
    /// Assigned sequence.
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_id_display() {
        assert_eq!(format!("{}", ViewId::new(7)), "view:7");
    }

    #[test]
    fn sequence_filter_matches() {
        assert!(SequenceFilter::All.matches(42));
        let filter = SequenceFilter::In(vec![1, 3]);
        assert!(filter.matches(3));
        assert!(!filter.matches(2));
    }
}
