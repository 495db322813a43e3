//! Map and reduce function bindings.

use docview_codec::Value;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a map or reduce function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FunctionError {
    message: String,
}

impl FunctionError {
    /// Creates a function error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for FunctionError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for FunctionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Collects the rows a map function emits for one document.
///
/// The emitter is created per document and carries that document's ID and
/// sequence, so emitted rows are tagged without shared mutable state.
#[derive(Debug)]
pub struct Emitter {
    doc_id: String,
    sequence: u64,
    rows: Vec<(Value, Value)>,
    ignored: usize,
}

impl Emitter {
    pub(crate) fn new(doc_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            doc_id: doc_id.into(),
            sequence,
            rows: Vec::new(),
            ignored: 0,
        }
    }

    /// Emits a key/value row. Rows with a null key are ignored.
    pub fn emit(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        if key.is_null() {
            tracing::warn!(doc_id = %self.doc_id, "emit() called with null key; ignoring");
            self.ignored += 1;
            return;
        }
        self.rows.push((key, value.into()));
    }

    /// ID of the document being mapped.
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Sequence of the revision being mapped.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Number of rows emitted so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows dropped for having a null key.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    pub(crate) fn into_rows(self) -> Vec<(Value, Value)> {
        self.rows
    }
}

/// A map function: turns a document into zero or more index rows.
pub trait MapFunction: Send + Sync {
    /// Maps one document.
    fn map(&self, doc: &Value, emitter: &mut Emitter) -> Result<(), FunctionError>;
}

impl<F> MapFunction for F
where
    F: Fn(&Value, &mut Emitter) -> Result<(), FunctionError> + Send + Sync,
{
    fn map(&self, doc: &Value, emitter: &mut Emitter) -> Result<(), FunctionError> {
        self(doc, emitter)
    }
}

/// A reduce function: folds keys and values into one value.
///
/// `rereduce` is true when `values` are outputs of earlier reductions.
pub trait ReduceFunction: Send + Sync {
    /// Reduces a group.
    fn reduce(&self, keys: &[Value], values: &[Value], rereduce: bool)
        -> Result<Value, FunctionError>;
}

impl<F> ReduceFunction for F
where
    F: Fn(&[Value], &[Value], bool) -> Result<Value, FunctionError> + Send + Sync,
{
    fn reduce(
        &self,
        keys: &[Value],
        values: &[Value],
        rereduce: bool,
    ) -> Result<Value, FunctionError> {
        self(keys, values, rereduce)
    }
}

/// Wraps a closure as a shared map function.
pub fn map_fn<F>(f: F) -> Arc<dyn MapFunction>
where
    F: Fn(&Value, &mut Emitter) -> Result<(), FunctionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a closure as a shared reduce function.
pub fn reduce_fn<F>(f: F) -> Arc<dyn ReduceFunction>
where
    F: Fn(&[Value], &[Value], bool) -> Result<Value, FunctionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emitter_drops_null_keys() {
        let mut emitter = Emitter::new("doc1", 4);
        emitter.emit("a", 1);
        emitter.emit(Value::Null, 2);
        emitter.emit(json!([1, 2]), Value::Null);

        assert_eq!(emitter.doc_id(), "doc1");
        assert_eq!(emitter.sequence(), 4);
        assert_eq!(emitter.len(), 2);
        assert_eq!(emitter.ignored(), 1);
        assert_eq!(
            emitter.into_rows(),
            vec![(json!("a"), json!(1)), (json!([1, 2]), Value::Null)]
        );
    }

    #[test]
    fn closures_are_functions() {
        let map = map_fn(|doc, emit| {
            emit.emit(doc["k"].clone(), doc["v"].clone());
            Ok(())
        });
        let mut emitter = Emitter::new("d", 1);
        map.map(&json!({"k": "x", "v": 2}), &mut emitter).unwrap();
        assert_eq!(emitter.len(), 1);

        let reduce = reduce_fn(|_keys, values, _rereduce| Ok(json!(values.len())));
        assert_eq!(reduce.reduce(&[], &[json!(1), json!(2)], false).unwrap(), json!(2));
    }

    #[test]
    fn function_error_message() {
        let err: FunctionError = "bad doc".into();
        assert_eq!(err.message(), "bad doc");
        assert_eq!(err.to_string(), "bad doc");
    }
}
