//! Property-based test generators using proptest.
//!
//! Provides strategies for JSON index keys and documents.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for scalar JSON values that can serve as keys.
pub fn scalar_key_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        (-1000.0f64..1000.0).prop_map(|n| json!(n)),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,8}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for arbitrary JSON keys, nesting arrays and objects.
pub fn key_strategy() -> impl Strategy<Value = Value> {
    scalar_key_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..3)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for non-null keys, the only keys a map function can emit.
pub fn emittable_key_strategy() -> impl Strategy<Value = Value> {
    key_strategy().prop_filter("null keys are not indexed", |key| !key.is_null())
}

/// Strategy for documents of the form `{"key": .., "amount": ..}`.
pub fn document_strategy() -> impl Strategy<Value = Value> {
    (emittable_key_strategy(), 0i64..100).prop_map(|(key, amount)| json!({"key": key, "amount": amount}))
}

/// Strategy for a batch of documents with distinct IDs `doc0`, `doc1`, ...
pub fn documents_strategy(max: usize) -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec(document_strategy(), 0..max).prop_map(|docs| {
        docs.into_iter()
            .enumerate()
            .map(|(i, doc)| (format!("doc{i}"), doc))
            .collect()
    })
}

/// Strategy for grouped sales: `(type, amount)` pairs over a few types.
pub fn sales_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-e]", 0i64..50), 0..40)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn emittable_keys_are_never_null(key in emittable_key_strategy()) {
            prop_assert!(!key.is_null());
        }

        #[test]
        fn documents_have_distinct_ids(docs in documents_strategy(10)) {
            let mut ids: Vec<_> = docs.iter().map(|(id, _)| id.clone()).collect();
            ids.dedup();
            prop_assert_eq!(ids.len(), docs.len());
        }
    }
}
