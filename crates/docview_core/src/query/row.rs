//! Query result rows.

use crate::error::CoreResult;
use docview_codec::{decode, Value};
use docview_storage::IndexRow;
use serde::Serialize;

/// One row of a query result.
///
/// Map rows carry the emitting document's ID and sequence. Reduced rows have
/// neither; their key is the group key and their value the reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRow {
    /// ID of the emitting document.
    pub doc_id: Option<String>,
    /// Sequence of the emitting revision, or 0.
    pub sequence: u64,
    /// Emitted or group key.
    pub key: Value,
    /// Emitted or reduced value.
    pub value: Value,
    /// Document body, when `include_docs` was requested.
    pub document: Option<Value>,
}

impl QueryRow {
    pub(crate) fn from_index(row: IndexRow) -> CoreResult<Self> {
        Ok(Self {
            key: decode(&row.key)?,
            value: decode(&row.value)?,
            doc_id: Some(row.doc_id),
            sequence: row.sequence,
            document: None,
        })
    }

    pub(crate) fn reduced(key: Value, value: Value) -> Self {
        Self {
            doc_id: None,
            sequence: 0,
            key,
            value,
            document: None,
        }
    }

    /// Returns true if the row is the output of a reduction.
    pub fn is_reduced(&self) -> bool {
        self.doc_id.is_none()
    }

    /// Returns element `index` of an array key.
    pub fn key_at(&self, index: usize) -> Option<&Value> {
        self.key.as_array().and_then(|items| items.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_codec::encode;
    use serde_json::json;

    #[test]
    fn decodes_index_rows() {
        let row = QueryRow::from_index(IndexRow {
            sequence: 3,
            doc_id: "d".to_string(),
            key: encode(&json!(["a", 1])),
            value: encode(&json!({"x": true})),
        })
        .unwrap();
        assert_eq!(row.doc_id.as_deref(), Some("d"));
        assert_eq!(row.key_at(1), Some(&json!(1)));
        assert_eq!(row.key_at(2), None);
        assert!(!row.is_reduced());
    }

    #[test]
    fn reduced_rows_have_no_document() {
        let row = QueryRow::reduced(json!("a"), json!(3));
        assert!(row.is_reduced());
        assert_eq!(row.sequence, 0);
        assert_eq!(row.key_at(0), None);
    }

    #[test]
    fn reduced_rows_serialize_without_doc_id() {
        let row = QueryRow::reduced(json!("a"), json!(3));
        let encoded = serde_json::to_value(&row).unwrap();
        assert_eq!(encoded["doc_id"], Value::Null);
        assert_eq!(encoded["key"], json!("a"));
        assert_eq!(encoded["value"], json!(3));
    }
}
