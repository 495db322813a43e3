//! # docview Core
//!
//! Incremental map/reduce views over a versioned document store.
//!
//! This crate provides:
//! - Views binding a map (and optional reduce) function to a persistent index
//! - Incremental index updates that only look at documents changed since the
//!   last update
//! - Range, key-list, grouped and reduced queries
//! - Live queries that re-run as documents change
//!
//! Storage is provided by a collaborator implementing
//! [`ViewStorage`](docview_storage::ViewStorage), such as
//! [`MemoryStore`](docview_storage::MemoryStore).
//!
//! ## Usage
//!
//! ```rust
//! use docview_core::{map_fn, Config, Database, QueryOptions};
//! use docview_storage::MemoryStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.put("alice", json!({"age": 31})).unwrap();
//! store.put("bob", json!({"age": 27})).unwrap();
//!
//! let db = Database::open(store, Config::default()).unwrap();
//! let by_age = db.view("by_age").unwrap();
//! by_age
//!     .set_map(
//!         map_fn(|doc, emit| {
//!             emit.emit(doc["age"].clone(), doc["_id"].clone());
//!             Ok(())
//!         }),
//!         "1",
//!     )
//!     .unwrap();
//!
//! let rows = by_age
//!     .create_query()
//!     .with_options(QueryOptions::new().start_key(30))
//!     .run()
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows.get(0).unwrap().value, json!("alice"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod executor;
mod live;
mod query;
pub mod reducers;
mod stats;
mod view;

pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use executor::Executor;
pub use live::{ListenerId, LiveQuery, LiveQueryChange, LiveQueryState};
pub use query::{
    IndexUpdateMode, PostFilter, Query, QueryEnumerator, QueryHandle, QueryOptions, QueryRow,
};
pub use stats::{UpdateStats, ViewStats};
pub use view::{
    map_fn, reduce_fn, DumpRow, Emitter, FunctionError, MapFunction, ReduceFunction, View,
    ViewCompiler, ViewSource,
};

#[cfg(test)]
mod test_support {
    use crate::view::{map_fn, MapFunction};
    use crate::{Config, Database};
    use docview_storage::MemoryStore;
    use std::sync::Arc;

    pub(crate) fn open_db() -> (Database, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let db = Database::open(store.clone(), Config::default()).unwrap();
        (db, store)
    }

    /// Emits `(doc.type, doc.amount)`.
    pub(crate) fn amount_map() -> Arc<dyn MapFunction> {
        map_fn(|doc, emit| {
            emit.emit(doc["type"].clone(), doc["amount"].clone());
            Ok(())
        })
    }
}
