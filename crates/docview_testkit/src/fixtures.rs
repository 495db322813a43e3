//! Test fixtures and database helpers.
//!
//! Provides a database over a [`MemoryStore`] that keeps the store handle
//! around for writing documents, and the map functions used across tests.

use docview_core::{map_fn, reducers, Config, Database, MapFunction, View};
use docview_storage::{MemoryStore, Revision};
use serde_json::{json, Value};
use std::sync::Arc;

/// A test database together with its in-memory store.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The store documents are written to.
    pub store: Arc<MemoryStore>,
}

impl TestDatabase {
    /// Creates a database over an empty store with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a database over an empty store.
    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let db = Database::open(store.clone(), config).expect("Failed to open database");
        Self { db, store }
    }

    /// Writes documents in order.
    pub fn seed(&self, docs: &[(&str, Value)]) -> Vec<Revision> {
        docs.iter()
            .map(|(id, body)| self.store.put(id, body.clone()).expect("Failed to put document"))
            .collect()
    }

    /// Returns a view mapped by [`amount_map`] and reduced by `_sum`.
    pub fn amounts_view(&self, name: &str) -> View {
        let view = self.db.view(name).expect("Failed to open view");
        view.set_map_reduce(amount_map(), Some(reducers::sum()), "amounts-1")
            .expect("Failed to bind functions");
        view
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a fresh database.
pub fn with_test_db<F, R>(f: F) -> R
where
    F: FnOnce(&TestDatabase) -> R,
{
    let db = TestDatabase::new();
    f(&db)
}

/// Emits `(doc.type, doc.amount)` for documents that have a `type`.
pub fn amount_map() -> Arc<dyn MapFunction> {
    map_fn(|doc, emit| {
        if let Some(kind) = doc.get("type") {
            emit.emit(kind.clone(), doc.get("amount").cloned().unwrap_or(Value::Null));
        }
        Ok(())
    })
}

/// Emits `(doc.key, doc._id)`.
pub fn key_map() -> Arc<dyn MapFunction> {
    map_fn(|doc, emit| {
        if let Some(key) = doc.get("key") {
            emit.emit(key.clone(), doc["_id"].clone());
        }
        Ok(())
    })
}

/// The three sales documents used by the grouped-sum examples.
pub fn sales_documents() -> Vec<(&'static str, Value)> {
    vec![
        ("s1", json!({"type": "a", "amount": 1})),
        ("s2", json!({"type": "a", "amount": 2})),
        ("s3", json!({"type": "b", "amount": 5})),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_core::QueryOptions;

    #[test]
    fn seeded_sales_group() {
        let db = TestDatabase::new();
        let revisions = db.seed(&sales_documents());
        assert_eq!(revisions.last().map(|r| r.sequence), Some(3));

        let view = db.amounts_view("sales");
        let rows = view
            .create_query()
            .with_options(QueryOptions::new().group_level(1))
            .run()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn with_test_db_returns_value() {
        let count = with_test_db(|db| {
            db.seed(&[("k", json!({"key": 1}))]);
            db.store.document_count()
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn key_map_emits_ids() {
        let db = TestDatabase::new();
        db.seed(&[("d", json!({"key": "k"})), ("skip", json!({}))]);
        let view = db.view("keys").unwrap();
        view.set_map(key_map(), "1").unwrap();
        let rows = view.create_query().run().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get(0).unwrap().value, json!("d"));
    }
}
