//! # docview Storage
//!
//! Interfaces between the view engine and the database that owns documents
//! and index rows, plus an in-memory implementation.
//!
//! The view engine never interprets how rows are persisted. It asks an
//! [`IndexStore`] to delete and insert rows inside a single-writer
//! [`IndexTransaction`], and to scan rows within a [`KeyRange`] ordered by
//! the view's [`Collation`](docview_codec::Collation).
//!
//! ## Available Implementations
//!
//! - [`MemoryStore`] - documents, index rows and a change feed in memory
//!
//! ## Example
//!
//! ```rust
//! use docview_codec::{encode, Collation};
//! use docview_storage::{IndexRow, IndexStore, KeyRange, MemoryStore, ScanDirection};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let view = store.create_view("by_name", Collation::Unicode).unwrap();
//!
//! let mut txn = store.begin_update(view).unwrap();
//! txn.insert_row(IndexRow {
//!     sequence: 1,
//!     doc_id: "doc1".into(),
//!     key: encode(&json!("alice")),
//!     value: encode(&json!(null)),
//! })
//! .unwrap();
//! txn.set_watermark(1).unwrap();
//! txn.commit().unwrap();
//!
//! let rows: Vec<_> = store
//!     .scan(view, &KeyRange::all(Collation::Unicode), ScanDirection::Forward)
//!     .unwrap()
//!     .collect();
//! assert_eq!(rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod change_feed;
mod error;
mod key_range;
mod memory;
mod types;

pub use backend::{
    DocumentChangeSource, DocumentResolver, IndexStore, IndexTransaction, RowCursor, ViewStorage,
};
pub use change_feed::{ChangeEvent, ChangeFeed, ObserverId};
pub use error::{StorageError, StorageResult};
pub use key_range::{KeyBound, KeyRange};
pub use memory::MemoryStore;
pub use types::{
    ChangeSnapshot, DocumentChange, IndexRow, ResolvedDocument, Revision, ScanDirection, SequenceFilter,
    TransactionSummary, ViewId, ViewMetadata,
};
