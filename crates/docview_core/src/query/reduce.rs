//! Streaming group-and-reduce over ordered map rows.

use crate::query::QueryRow;
use crate::view::ReduceFunction;
use docview_codec::{Collation, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Folds consecutive rows into reduced rows in one forward pass.
///
/// Rows must arrive in key order. When grouping is on, a group ends as soon
/// as a key is not grouped together with the previous one; otherwise every
/// row lands in a single group keyed by null.
pub(crate) struct Grouper<'a> {
    collation: Collation,
    group: bool,
    group_level: usize,
    reduce: Option<Arc<dyn ReduceFunction>>,
    view_name: &'a str,
    keys: Vec<Value>,
    values: Vec<Value>,
    last_key: Option<Value>,
    output: Vec<QueryRow>,
}

impl<'a> Grouper<'a> {
    pub(crate) fn new(
        collation: Collation,
        group: bool,
        group_level: usize,
        reduce: Option<Arc<dyn ReduceFunction>>,
        view_name: &'a str,
    ) -> Self {
        Self {
            collation,
            group,
            group_level,
            reduce,
            view_name,
            keys: Vec::new(),
            values: Vec::new(),
            last_key: None,
            output: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, key: Value, value: Value) {
        if self.group {
            if let Some(last) = &self.last_key {
                if !grouped_together(self.collation, last, &key, self.group_level) {
                    self.flush();
                }
            }
        }
        self.keys.push(key.clone());
        self.values.push(value);
        self.last_key = Some(key);
    }

    /// Flushes the last group and returns every reduced row.
    pub(crate) fn finish(mut self) -> Vec<QueryRow> {
        self.flush();
        self.output
    }

    fn flush(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let key = match (&self.last_key, self.group) {
            (Some(last), true) => group_key(last, self.group_level),
            _ => Value::Null,
        };
        let value = match &self.reduce {
            Some(reduce) => match reduce.reduce(&self.keys, &self.values, false) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(view = %self.view_name, error = %err, "reduce function failed");
                    Value::Null
                }
            },
            None => Value::Null,
        };
        self.output.push(QueryRow::reduced(key, value));
        self.keys.clear();
        self.values.clear();
    }
}

/// Returns true if two keys fall in the same group at `level`.
///
/// At level 0, or when either key is not an array, keys must collate equal.
/// Otherwise the first `min(level, len(a), len(b))` elements are compared
/// pairwise.
pub(crate) fn grouped_together(collation: Collation, a: &Value, b: &Value, level: usize) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) if level > 0 => {
            let n = level.min(a.len()).min(b.len());
            a.iter()
                .zip(b.iter())
                .take(n)
                .all(|(x, y)| collation.compare_values(x, y) == Ordering::Equal)
        }
        _ => collation.compare_values(a, b) == Ordering::Equal,
    }
}

/// Returns the key a group is reported under.
pub(crate) fn group_key(key: &Value, level: usize) -> Value {
    match key {
        Value::Array(items) if level > 0 && items.len() > level => {
            Value::Array(items[..level].to_vec())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers;
    use crate::view::reduce_fn;
    use crate::FunctionError;
    use serde_json::json;

    fn run(group: bool, level: usize, rows: &[(Value, Value)]) -> Vec<(Value, Value)> {
        let mut grouper = Grouper::new(Collation::Unicode, group, level, Some(reducers::sum()), "v");
        for (k, v) in rows {
            grouper.push(k.clone(), v.clone());
        }
        grouper
            .finish()
            .into_iter()
            .map(|row| (row.key, row.value))
            .collect()
    }

    #[test]
    fn array_prefix_grouping() {
        let a = json!(["a", "b", "c"]);
        let b = json!(["a", "b", "d"]);
        for level in 1..=2 {
            assert!(grouped_together(Collation::Unicode, &a, &b, level));
        }
        for level in 3..=5 {
            assert!(!grouped_together(Collation::Unicode, &a, &b, level));
        }
    }

    #[test]
    fn non_arrays_need_equality() {
        assert!(grouped_together(Collation::Unicode, &json!("x"), &json!("x"), 2));
        assert!(!grouped_together(Collation::Unicode, &json!("x"), &json!(["x"]), 1));
        assert!(!grouped_together(Collation::Unicode, &json!(["x", 1]), &json!(["x", 2]), 0));
        assert!(grouped_together(Collation::Unicode, &json!(["x", 1]), &json!(["x", 1]), 0));
    }

    #[test]
    fn group_key_truncates() {
        assert_eq!(group_key(&json!([1, 2, 3]), 2), json!([1, 2]));
        assert_eq!(group_key(&json!([1, 2]), 2), json!([1, 2]));
        assert_eq!(group_key(&json!([1, 2, 3]), 0), json!([1, 2, 3]));
        assert_eq!(group_key(&json!("s"), 1), json!("s"));
    }

    #[test]
    fn ungrouped_reduces_to_one_row() {
        let rows = [(json!("a"), json!(1)), (json!("b"), json!(2)), (json!("c"), json!(3))];
        assert_eq!(run(false, 0, &rows), vec![(Value::Null, json!(6))]);
    }

    #[test]
    fn grouped_by_level() {
        let rows = [
            (json!(["a", 1]), json!(1)),
            (json!(["a", 2]), json!(2)),
            (json!(["b", 1]), json!(5)),
        ];
        assert_eq!(
            run(true, 1, &rows),
            vec![(json!(["a"]), json!(3)), (json!(["b"]), json!(5))]
        );
        assert_eq!(run(true, 2, &rows).len(), 3);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(run(false, 0, &[]).is_empty());
        assert!(run(true, 1, &[]).is_empty());
    }

    #[test]
    fn failing_reduce_yields_null() {
        let failing = reduce_fn(|_, _, _| Err(FunctionError::new("boom")));
        let mut grouper = Grouper::new(Collation::Unicode, true, 0, Some(failing), "v");
        grouper.push(json!("a"), json!(1));
        let rows = grouper.finish();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Value::Null);
        assert_eq!(rows[0].key, json!("a"));
    }

    #[test]
    fn missing_reduce_yields_null_values() {
        let mut grouper = Grouper::new(Collation::Unicode, true, 0, None, "v");
        grouper.push(json!("a"), json!(1));
        grouper.push(json!("a"), json!(2));
        grouper.push(json!("b"), json!(3));
        let rows = grouper.finish();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.value.is_null() && row.is_reduced()));
    }

    proptest::proptest! {
        #[test]
        fn group_sums_add_up_to_the_total(
            mut rows in proptest::collection::vec(("[a-d]", 0i64..100), 0..30),
        ) {
            rows.sort();
            let rows: Vec<(Value, Value)> =
                rows.into_iter().map(|(k, v)| (json!(k), json!(v))).collect();
            let total: i64 = rows.iter().filter_map(|(_, v)| v.as_i64()).sum();

            let grouped = run(true, 0, &rows);
            let mut keys: Vec<&Value> = rows.iter().map(|(k, _)| k).collect();
            keys.dedup();
            proptest::prop_assert_eq!(grouped.len(), keys.len());
            let grouped_total: i64 = grouped.iter().filter_map(|(_, v)| v.as_i64()).sum();
            proptest::prop_assert_eq!(grouped_total, total);

            let single = run(false, 0, &rows);
            if rows.is_empty() {
                proptest::prop_assert!(single.is_empty());
            } else {
                proptest::prop_assert_eq!(single, vec![(Value::Null, json!(total))]);
            }
        }
    }
}
